// src/extractor/mod.rs

pub mod ytdlp;

pub use ytdlp::YtDlpEngine;

use crate::{
    config::AppConfig,
    constants,
    error::*,
    models::{DownloadOutcome, OutcomeStatus, VideoDescriptor},
    recovery::Failure,
    utils,
};
use async_trait::async_trait;
use chrono::Local;
use log::{debug, info, warn};
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 提取引擎返回的原始元数据
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineMetadata {
    pub title: Option<String>,
    #[serde(rename = "duration")]
    pub duration_seconds: Option<f64>,
    pub format_id: Option<String>,
    pub height: Option<u32>,
    #[serde(rename = "url")]
    pub direct_url: Option<String>,
    pub filesize: Option<u64>,
}

impl EngineMetadata {
    pub fn into_descriptor(self, source_url: &str) -> VideoDescriptor {
        VideoDescriptor {
            source_url: source_url.to_string(),
            title: self.title,
            duration_seconds: self.duration_seconds,
            quality_label: self.height.map(|h| format!("{}p", h)),
            resolved_media_url: self.direct_url,
        }
    }
}

/// 外部提取引擎的边界。引擎被视为无状态，可并发调用。
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    async fn extract_metadata(&self, url: &str, max_height: u32) -> AppResult<EngineMetadata>;
    /// `output_template` 形如 `<dir>/<stem>.%(ext)s`
    async fn download_best(&self, url: &str, output_template: &Path, max_height: u32) -> AppResult<()>;
}

/// 在 `dir` 中查找文件名主干为 `stem` 且扩展名为已知媒体格式的文件
pub fn find_media_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    constants::ytdlp::OUTPUT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}

pub struct ExtractionAdapter {
    engine: Arc<dyn ExtractionEngine>,
    output_dir: PathBuf,
    max_height: u32,
    call_timeout: Duration,
    download_timeout: Duration,
    cancel: CancellationToken,
}

impl ExtractionAdapter {
    pub fn new(engine: Arc<dyn ExtractionEngine>, config: &AppConfig, cancel: CancellationToken) -> Self {
        Self {
            engine,
            output_dir: config.output_dir.clone(),
            max_height: config.max_height,
            call_timeout: config.timeout,
            download_timeout: config.download_timeout,
            cancel,
        }
    }

    async fn metadata(&self, url: &str) -> AppResult<EngineMetadata> {
        utils::guarded(
            &self.cancel,
            self.call_timeout,
            "元数据提取",
            self.engine.extract_metadata(url, self.max_height),
        )
        .await
    }

    /// 解析链接得到视频描述。引擎的错误统一转换为 [`Failure`]。
    pub async fn extract(&self, url: &str) -> Result<VideoDescriptor, Failure> {
        match self.metadata(url).await {
            Ok(meta) => {
                let descriptor = meta.into_descriptor(url);
                debug!(
                    "提取成功: {} ({})",
                    descriptor.title.as_deref().unwrap_or("无标题"),
                    descriptor.quality_label.as_deref().unwrap_or("未知清晰度")
                );
                Ok(descriptor)
            }
            Err(e) => Err(Failure::from_error(&e)),
        }
    }

    pub async fn download(&self, url: &str) -> DownloadOutcome {
        self.download_from(url, url).await
    }

    /// 从 `media_url` 下载，结果归属于 `source_url` (文件名中的域名也取自它)。
    pub async fn download_from(&self, source_url: &str, media_url: &str) -> DownloadOutcome {
        let started = Instant::now();
        let result = self.try_download(source_url, media_url).await;
        let elapsed_seconds = started.elapsed().as_secs_f64();
        let outcome = match result {
            Ok((path, descriptor)) => {
                info!("下载完成: {}", path.display());
                DownloadOutcome::success(source_url, path, Some(descriptor))
            }
            Err(AppError::Cancelled) => DownloadOutcome::failed(
                source_url,
                OutcomeStatus::Aborted,
                Failure::from_error(&AppError::Cancelled),
            ),
            Err(e) => {
                warn!("下载 {} 失败: {}", media_url, e);
                DownloadOutcome::failed(source_url, OutcomeStatus::Failed, Failure::from_error(&e))
            }
        };
        DownloadOutcome { elapsed_seconds, ..outcome }
    }

    async fn try_download(&self, source_url: &str, media_url: &str) -> AppResult<(PathBuf, VideoDescriptor)> {
        let meta = self.metadata(media_url).await?;
        let title = meta.title.clone().unwrap_or_default();
        let stem = utils::safe_file_stem(source_url, &title, Local::now().timestamp());

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let template = self.output_dir.join(format!("{}.%(ext)s", stem));

        utils::guarded(
            &self.cancel,
            self.download_timeout,
            "视频下载",
            self.engine.download_best(media_url, &template, self.max_height),
        )
        .await?;

        // 引擎报告成功也要确认文件确实存在
        let path = find_media_file(&self.output_dir, &stem).ok_or_else(|| {
            AppError::Transfer(format!(
                "引擎报告成功，但在 {} 中未找到 '{}' 的媒体文件",
                self.output_dir.display(),
                stem
            ))
        })?;

        let mut descriptor = meta.into_descriptor(source_url);
        if descriptor.resolved_media_url.is_none() && media_url != source_url {
            descriptor.resolved_media_url = Some(media_url.to_string());
        }
        Ok((path, descriptor))
    }
}
