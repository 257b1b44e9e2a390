// src/cli.rs

use clap::{Parser, ValueEnum, command, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    about,
    long_about = None,
    arg_required_else_help = true,
    disable_help_flag = true,
    disable_version_flag = true,
)]
#[command(group(
    clap::ArgGroup::new("mode")
        .required(true)
        .args(&["url", "batch_file", "analyze", "show_config", "create_config"]),
))]
pub struct Cli {
    // --- 运行模式 (Mode) ---
    /// 下载一个或多个视频链接
    #[arg(long, num_args = 1.., value_name = "URL", help_heading = "Mode")]
    pub url: Vec<String>,
    /// 从文本文件批量下载 (每行一个链接，忽略空行和 # 注释)
    #[arg(short, long, value_name = "FILE", help_heading = "Mode")]
    pub batch_file: Option<PathBuf>,
    /// 只分析链接的提取策略，不下载
    #[arg(long, num_args = 1.., value_name = "URL", help_heading = "Mode")]
    pub analyze: Vec<String>,
    /// 显示当前生效的配置 (密码已遮蔽) 并退出
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Mode")]
    pub show_config: bool,
    /// 在配置文件路径写出一份示例配置并退出
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Mode")]
    pub create_config: bool,

    // --- 下载选项 (Options) ---
    /// 指定配置文件路径 (默认: ~/.webvid-dl/config.json)
    #[arg(short, long, value_name = "FILE", help_heading = "Options")]
    pub config: Option<PathBuf>,
    /// 设置文件保存目录
    #[arg(short, long, value_name = "DIR", help_heading = "Options")]
    pub output: Option<PathBuf>,
    /// 禁用 VPN 轮换
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub no_vpn: bool,
    /// 以有界面模式运行浏览器会话
    #[arg(long, action = clap::ArgAction::SetTrue, help_heading = "Options")]
    pub headed: bool,
    /// 设置最大并发下载数
    #[arg(short, long, value_parser = clap::value_parser!(usize), help_heading = "Options")]
    pub workers: Option<usize>,
    /// 每个链接失败后的最大重试次数
    #[arg(long, value_parser = clap::value_parser!(u32), help_heading = "Options")]
    pub retries: Option<u32>,
    /// 视频分辨率上限 (像素高度)，例如 720
    #[arg(long, value_parser = clap::value_parser!(u32), help_heading = "Options")]
    pub max_height: Option<u32>,
    /// 将下载历史追加写入此 JSON Lines 文件
    #[arg(long, value_name = "FILE", help_heading = "Options")]
    pub history: Option<PathBuf>,
    /// [分析模式] 以 JSON 格式输出
    #[arg(long, action = clap::ArgAction::SetTrue, requires = "analyze", help_heading = "Options")]
    pub json: bool,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// 设置日志文件的输出级别
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true, help_heading = "General")]
    pub log_level: LogLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_multiple_urls_and_overrides() {
        let cli = Cli::try_parse_from([
            "webvid-dl",
            "--url",
            "https://x.com/a.mp4",
            "https://youtube.com/watch?v=1",
            "--no-vpn",
            "--workers",
            "5",
            "--max-height",
            "720",
        ])
        .unwrap();
        assert_eq!(cli.url.len(), 2);
        assert!(cli.no_vpn);
        assert_eq!(cli.workers, Some(5));
        assert_eq!(cli.max_height, Some(720));
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn test_modes_are_exclusive() {
        let res = Cli::try_parse_from(["webvid-dl", "--url", "https://x.com/a.mp4", "--show-config"]);
        assert!(res.is_err());
        let res = Cli::try_parse_from(["webvid-dl", "--json"]);
        assert!(res.is_err());
    }
}
