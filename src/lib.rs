// src/lib.rs

pub mod automation;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod history;
pub mod logging;
pub mod models;
pub mod recovery;
pub mod symbols;
pub mod timing;
pub mod ui;
pub mod utils;
pub mod vpn;

use crate::{
    automation::{BrowserDriver, SiteAutomation, StaticPageDriver},
    cli::Cli,
    config::{AppConfig, ExternalConfig, loader},
    downloader::{DownloadManager, Scheduler},
    error::{AppError, AppResult},
    extractor::{ExtractionAdapter, ExtractionEngine, YtDlpEngine},
    history::{HistorySink, JsonlHistory},
    recovery::RetryPolicy,
    timing::TimingPolicy,
    vpn::VpnController,
};
use anyhow::Context;
use colored::*;
use log::{debug, info, warn};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;

/// 核心的执行上下文，包含所有任务所需的共享组件
#[derive(Clone)]
pub struct DownloadJobContext {
    pub manager: DownloadManager,
    pub config: Arc<AppConfig>,
    pub vpn: Arc<VpnController>,
    pub adapter: Arc<ExtractionAdapter>,
    pub driver: Arc<dyn BrowserDriver>,
    pub automation: Arc<SiteAutomation>,
    pub timing: Arc<TimingPolicy>,
    pub policy: RetryPolicy,
    pub cancel: CancellationToken,
}

impl DownloadJobContext {
    pub fn new(
        config: Arc<AppConfig>,
        vpn: Arc<VpnController>,
        engine: Arc<dyn ExtractionEngine>,
        driver: Arc<dyn BrowserDriver>,
        timing: Arc<TimingPolicy>,
        cancel: CancellationToken,
    ) -> Self {
        let adapter = Arc::new(ExtractionAdapter::new(engine, &config, cancel.clone()));
        let automation = Arc::new(SiteAutomation::new(timing.clone(), config.timeout, cancel.clone()));
        Self {
            manager: DownloadManager::new(),
            policy: RetryPolicy::new(config.max_retries),
            config,
            vpn,
            adapter,
            driver,
            automation,
            timing,
            cancel,
        }
    }
}

/// 库的公共入口点，由 `main.rs` 调用。返回值表示是否所有链接均已成功 (或被跳过)。
pub async fn run_from_cli(args: Arc<Cli>, cancel: CancellationToken) -> AppResult<bool> {
    debug!("CLI 参数: {:?}", args);

    if args.create_config {
        return create_example_config(args.config.as_deref()).map(|_| true);
    }
    if !args.analyze.is_empty() {
        analyze_urls(&args.analyze, args.json)?;
        return Ok(true);
    }
    if args.show_config {
        let external = loader::load_or_create_external_config(args.config.as_deref())?;
        let json = serde_json::to_string_pretty(&loader::masked(&external))?;
        ui::print_header("当前配置");
        println!("{}", json);
        return Ok(true);
    }

    let urls = if let Some(batch_file) = &args.batch_file {
        read_batch_file(batch_file)?
    } else {
        args.url.clone()
    };
    if urls.is_empty() {
        ui::warn("没有需要处理的链接。");
        return Ok(true);
    }

    let config = Arc::new(AppConfig::new(&args)?);
    debug!("加载的应用配置: {:?}", config);
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("创建输出目录 '{}' 失败", config.output_dir.display()))?;

    let timing = Arc::new(TimingPolicy::new());
    let vpn = Arc::new(VpnController::from_config(&config, timing.clone(), cancel.clone())?);
    let engine: Arc<dyn ExtractionEngine> = Arc::new(YtDlpEngine::new(config.ytdlp_binary.clone()));
    let driver: Arc<dyn BrowserDriver> = Arc::new(StaticPageDriver::new(&config));
    let context = DownloadJobContext::new(config.clone(), vpn.clone(), engine, driver, timing, cancel.clone());

    ui::print_header(&format!("开始下载 (按 {} 可随时取消)", *symbols::CTRL_C));
    if vpn.is_enabled() {
        ui::info(&format!("{} 正在连接 VPN...", *symbols::VPN));
        if vpn.connect(&config.vpn.countries).await {
            let state = vpn.snapshot();
            ui::info(&format!(
                "VPN 已连接: {}",
                state.public_address.or(state.current_identity).unwrap_or_else(|| "未知".into())
            ));
        } else {
            ui::warn("VPN 连接失败，将使用当前网络继续下载。");
        }
    }

    let mut scheduler = Scheduler::new(context.clone());
    if let Some(path) = &config.history_file {
        match JsonlHistory::new(path.clone()) {
            Ok(sink) => {
                info!("下载历史将写入: {}", sink.path().display());
                let sink: Arc<dyn HistorySink> = Arc::new(sink);
                scheduler = scheduler.with_history(sink);
            }
            Err(e) => warn!("无法打开下载历史文件 '{}': {}", path.display(), e),
        }
    }

    let outcomes = scheduler.run_batch(&urls).await;
    debug!("本批共产生 {} 个结果", outcomes.len());

    if vpn.is_enabled() {
        vpn.disconnect().await;
    }

    context.manager.print_report();
    Ok(context.manager.did_all_succeed())
}

fn read_batch_file(batch_file: &Path) -> AppResult<Vec<String>> {
    let content = std::fs::read_to_string(batch_file).map_err(|e| {
        log::error!("读取批量文件 '{}' 失败: {}", batch_file.display(), e);
        AppError::from(e)
    })?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        warn!("批量文件 '{}' 为空或不含有效行。", batch_file.display());
        return Err(AppError::UserInputError(format!(
            "批量文件 '{}' 中没有有效的链接",
            batch_file.display()
        )));
    }
    info!("从批量文件 '{}' 读取了 {} 个链接", batch_file.display(), urls.len());
    Ok(urls)
}

fn analyze_urls(urls: &[String], as_json: bool) -> AppResult<()> {
    let classifications = classifier::classify_batch(urls);
    let report = classifier::analysis_report(&classifications);
    if as_json {
        let json = serde_json::json!({
            "urls": classifications,
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        ui::print_analysis(&classifications, &report);
    }
    Ok(())
}

/// 写出示例配置；已存在的配置文件不会被覆盖。
fn create_example_config(custom: Option<&Path>) -> AppResult<()> {
    let path = loader::resolve_config_path(custom)?;
    if path.exists() {
        ui::warn(&format!("配置文件已存在，未做修改: {}", path.display()));
        return Ok(());
    }
    loader::save_config(&path, &ExternalConfig::example())?;
    let shown = dunce::canonicalize(&path).unwrap_or(path);
    info!("已写出示例配置: {}", shown.display());
    println!("\n{} 示例配置已写入 {}", *symbols::OK, shown.display().to_string().green());
    ui::box_message(
        "下一步",
        &[
            "1. 将 sites 中的 example-video-site.com 换成目标站点的域名",
            "2. 填写 video_button / download_link 选择器，不需要登录时删除凭据字段",
            "3. 未安装 nordvpn 时将 nordvpn_enabled 设为 false 或使用 --no-vpn",
        ],
        |s| s.cyan(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_batch_file_skips_comments_and_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# 注释").unwrap();
        writeln!(file, "https://a.com/1.mp4").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   https://youtube.com/watch?v=2  ").unwrap();
        let urls = read_batch_file(file.path()).unwrap();
        assert_eq!(urls, vec!["https://a.com/1.mp4", "https://youtube.com/watch?v=2"]);

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(read_batch_file(empty.path()), Err(AppError::UserInputError(_))));
    }

    #[test]
    fn test_create_example_config_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        create_example_config(Some(&path)).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("sites"));

        std::fs::write(&path, "{}").unwrap();
        create_example_config(Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
