// src/downloader/mod.rs

mod scheduler;
mod task_processor;

pub use scheduler::Scheduler;
pub use task_processor::TaskProcessor;

use crate::{
    models::{DownloadOutcome, OutcomeStatus},
    symbols, ui,
};
use colored::*;
use itertools::Itertools;
use log::info;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
    pub aborted: usize,
}

/// 一批任务的统计与失败原因汇总，可在工作协程间共享
#[derive(Clone)]
pub struct DownloadManager {
    stats: Arc<Mutex<DownloadStats>>,
    failed_downloads: Arc<Mutex<Vec<(String, String)>>>,
    skipped_downloads: Arc<Mutex<Vec<(String, String)>>>,
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadManager {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(Mutex::new(DownloadStats::default())),
            failed_downloads: Arc::new(Mutex::new(Vec::new())),
            skipped_downloads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn start_batch(&self, total_tasks: usize) {
        info!("开始新一批下载任务，总数: {}", total_tasks);
        let mut stats = self.stats.lock().unwrap();
        *stats = DownloadStats {
            total: total_tasks,
            ..Default::default()
        };
        self.failed_downloads.lock().unwrap().clear();
        self.skipped_downloads.lock().unwrap().clear();
    }

    pub fn record_outcome(&self, outcome: &DownloadOutcome) {
        let reason = outcome.failure_reason().unwrap_or("未知原因").to_string();
        match outcome.status {
            OutcomeStatus::Succeeded => self.stats.lock().unwrap().success += 1,
            OutcomeStatus::Skipped => {
                info!("跳过链接 '{}'，原因: {}", outcome.source_url, reason);
                self.stats.lock().unwrap().skipped += 1;
                self.skipped_downloads
                    .lock()
                    .unwrap()
                    .push((outcome.source_url.clone(), reason));
            }
            OutcomeStatus::Failed => {
                log::error!("链接 '{}' 下载失败: {}", outcome.source_url, reason);
                self.stats.lock().unwrap().failed += 1;
                self.failed_downloads
                    .lock()
                    .unwrap()
                    .push((outcome.source_url.clone(), reason));
            }
            OutcomeStatus::Aborted => self.stats.lock().unwrap().aborted += 1,
        }
    }

    pub fn get_stats(&self) -> DownloadStats {
        self.stats.lock().unwrap().clone()
    }

    pub fn did_all_succeed(&self) -> bool {
        let stats = self.stats.lock().unwrap();
        stats.failed == 0 && stats.aborted == 0
    }

    pub fn print_report(&self) {
        let stats = self.get_stats();
        let skipped = self.skipped_downloads.lock().unwrap();
        let failed = self.failed_downloads.lock().unwrap();
        info!(
            "下载报告: Total={}, Success={}, Skipped={}, Failed={}, Aborted={}",
            stats.total, stats.success, stats.skipped, stats.failed, stats.aborted
        );

        if !skipped.is_empty() || !failed.is_empty() {
            ui::print_sub_header("下载详情报告");
            if !skipped.is_empty() {
                println!("\n{} 跳过的链接 ({}个):", *symbols::INFO, stats.skipped);
                print_grouped_report(&skipped, |s| s.cyan());
            }
            if !failed.is_empty() {
                println!("\n{} 失败的链接 ({}个):", *symbols::ERROR, stats.failed);
                print_grouped_report(&failed, |s| s.red());
            }
        }
        ui::print_sub_header("任务总结");
        if stats.total > 0 && stats.success == stats.total {
            println!("{} 所有 {} 个链接均已下载成功。", *symbols::OK, stats.total);
        } else {
            let mut summary = format!(
                "{} | {} | {}",
                format!("成功: {}", stats.success).green(),
                format!("失败: {}", stats.failed).red(),
                format!("跳过: {}", stats.skipped).yellow()
            );
            if stats.aborted > 0 {
                summary.push_str(&format!(" | {}", format!("已取消: {}", stats.aborted).magenta()));
            }
            println!("{}", summary);
        }
    }
}

fn print_grouped_report(items: &[(String, String)], color_fn: fn(ColoredString) -> ColoredString) {
    let mut grouped: HashMap<&String, Vec<&String>> = HashMap::new();
    for (url, reason) in items {
        grouped.entry(reason).or_default().push(url);
    }
    for (reason, urls) in grouped.into_iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        println!("  - {}", color_fn(format!("原因: {}", reason).into()));
        for url in urls.into_iter().sorted() {
            println!("    - {}", url);
        }
    }
}
