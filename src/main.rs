// src/main.rs

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use std::{env, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use webvid_dl::{cli::Cli, error::AppError, logging, run_from_cli, ui};

#[tokio::main]
async fn main() {
    // 为 Windows 终端启用 ANSI 颜色支持。
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| clap::crate_name!().to_string());

    let after_help = format!(
        "示例:\n  # 下载单个或多个链接\n  {bin} --url \"https://example.com/video.mp4\" \"https://www.youtube.com/watch?v=...\"\n\n  # 批量下载，不使用 VPN，4 个并发\n  {bin} -b my_links.txt --no-vpn -w 4\n\n  # 只分析链接的提取策略\n  {bin} --analyze \"https://...\" --json\n\n  # 生成示例配置文件\n  {bin} --create-config",
        bin = bin_name
    );

    let cmd = Cli::command().after_help(after_help);
    let args = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(args) => Arc::new(args),
        Err(e) => e.exit(),
    };
    logging::init_logger(args.log_level);

    // 第一次 Ctrl+C 取消所有任务并等待清理，第二次立即退出
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        println!("\n{} 正在取消任务，再次按 Ctrl+C 强制退出...", "[!]".yellow());
        log::warn!("收到中断信号，取消所有任务");
        signal_token.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{} 用户强制中断程序。", "[!]".yellow());
            tokio::time::sleep(Duration::from_millis(100)).await;
            std::process::exit(130);
        }
    });

    let code = match run_from_cli(args, cancel.clone()).await {
        _ if cancel.is_cancelled() => 130,
        Ok(true) => 0,
        Ok(false) => 1,
        Err(AppError::UserInputError(msg)) => {
            eprintln!("\n{} {}", "[!]".yellow(), msg.yellow());
            1
        }
        Err(e) => {
            log::error!("程序执行出错: {}", e);
            eprintln!();
            ui::error(&format!("程序执行出错: {}", e));
            1
        }
    };
    std::process::exit(code);
}
