// src/extractor/ytdlp.rs

use super::{EngineMetadata, ExtractionEngine};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use log::debug;
use std::{path::Path, process::Stdio};
use tokio::process::Command;

/// `best[height<=N]/best`：不超过分辨率上限的最佳格式，否则退回最佳格式
pub fn format_selector(max_height: u32) -> String {
    format!("best[height<={}]/best", max_height)
}

/// 从 yt-dlp 的 stderr 中挑出最有用的一行
fn summarize_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("yt-dlp 未输出错误信息")
        .trim()
        .to_string()
}

pub fn parse_metadata(json: &str) -> AppResult<EngineMetadata> {
    serde_json::from_str(json)
        .map_err(|e| AppError::Extraction(format!("无法解析 yt-dlp 元数据: {}", e)))
}

/// 以子进程方式调用 yt-dlp。调用方负责超时与取消，future 被丢弃时进程会被杀掉。
pub struct YtDlpEngine {
    binary: String,
}

impl YtDlpEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> AppResult<String> {
        debug!("执行: {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::Extraction(format!("无法启动 '{}': {}", self.binary, e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(AppError::Extraction(summarize_stderr(&stderr)))
        }
    }
}

#[async_trait]
impl ExtractionEngine for YtDlpEngine {
    async fn extract_metadata(&self, url: &str, max_height: u32) -> AppResult<EngineMetadata> {
        let selector = format_selector(max_height);
        let stdout = self
            .run(&[
                "--dump-single-json",
                "--skip-download",
                "--no-playlist",
                "--no-warnings",
                "-f",
                selector.as_str(),
                url,
            ])
            .await?;
        parse_metadata(&stdout)
    }

    async fn download_best(&self, url: &str, output_template: &Path, max_height: u32) -> AppResult<()> {
        let selector = format_selector(max_height);
        let template = output_template.to_string_lossy().into_owned();
        self.run(&[
            "--no-playlist",
            "--no-warnings",
            "--no-progress",
            "-f",
            selector.as_str(),
            "-o",
            template.as_str(),
            url,
        ])
        .await
        .map(|_| ())
    }
}
