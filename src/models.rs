// src/models.rs

use crate::{classifier::Strategy, recovery::Failure};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 提取引擎对单个视频给出的描述
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoDescriptor {
    pub source_url: String,
    pub title: Option<String>,
    pub duration_seconds: Option<f64>,
    /// 例如 "1080p"
    pub quality_label: Option<String>,
    pub resolved_media_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    Skipped,
    Aborted,
}

/// 每个输入链接对应且仅对应一个结果
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub source_url: String,
    pub status: OutcomeStatus,
    pub succeeded: bool,
    pub file_path: Option<PathBuf>,
    pub elapsed_seconds: f64,
    pub descriptor: Option<VideoDescriptor>,
    pub failure: Option<Failure>,
    pub attempts: u32,
    pub strategy: Option<Strategy>,
}

impl DownloadOutcome {
    pub fn success(source_url: &str, file_path: PathBuf, descriptor: Option<VideoDescriptor>) -> Self {
        Self {
            source_url: source_url.to_string(),
            status: OutcomeStatus::Succeeded,
            succeeded: true,
            file_path: Some(file_path),
            elapsed_seconds: 0.0,
            descriptor,
            failure: None,
            attempts: 1,
            strategy: None,
        }
    }

    pub fn failed(source_url: &str, status: OutcomeStatus, failure: Failure) -> Self {
        Self {
            source_url: source_url.to_string(),
            status,
            succeeded: false,
            file_path: None,
            elapsed_seconds: 0.0,
            descriptor: None,
            failure: Some(failure),
            attempts: 0,
            strategy: None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.descriptor.as_ref().and_then(|d| d.title.as_deref())
    }
}

/// 下载历史中的一行 (JSON Lines)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
    pub file_path: Option<PathBuf>,
    pub file_size: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub elapsed_seconds: f64,
    pub succeeded: bool,
    pub failure_message: Option<String>,
    pub egress_identity: Option<String>,
    pub timestamp: DateTime<Local>,
}
