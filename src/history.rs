// src/history.rs

use crate::{
    error::AppResult,
    models::{DownloadOutcome, HistoryRecord},
    utils,
};
use chrono::Local;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// 每个结果产生一条记录，存储方式由实现决定
pub trait HistorySink: Send + Sync {
    fn record(&self, record: &HistoryRecord) -> AppResult<()>;
}

pub fn build_record(outcome: &DownloadOutcome, egress_identity: Option<String>) -> HistoryRecord {
    let file_size = outcome
        .file_path
        .as_ref()
        .and_then(|p| fs::metadata(p).ok())
        .map(|m| m.len());
    HistoryRecord {
        url: outcome.source_url.clone(),
        domain: utils::domain_of(&outcome.source_url),
        title: outcome.title().map(str::to_string),
        file_path: outcome.file_path.clone(),
        file_size,
        duration_seconds: outcome.descriptor.as_ref().and_then(|d| d.duration_seconds),
        elapsed_seconds: outcome.elapsed_seconds,
        succeeded: outcome.succeeded,
        failure_message: outcome.failure_reason().map(str::to_string),
        egress_identity,
        timestamp: Local::now(),
    }
}

/// 追加写入 JSON Lines 文件
pub struct JsonlHistory {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlHistory {
    pub fn new(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistorySink for JsonlHistory {
    fn record(&self, record: &HistoryRecord) -> AppResult<()> {
        let line = serde_json::to_string(record)?;
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}
