// src/downloader/scheduler.rs

//! 批量调度：先分类全部链接，再在有界的并发池中执行，失败时按重试策略重新排队。

use super::task_processor::TaskProcessor;
use crate::{
    DownloadJobContext,
    classifier::{self, UrlClassification},
    history::{self, HistorySink},
    models::{DownloadOutcome, OutcomeStatus},
    recovery::{Failure, FailureCategory, RetryAction},
    symbols, ui, utils,
    vpn::RotationOutcome,
};
use colored::*;
use futures::{StreamExt, stream};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::{sync::Semaphore, time::Instant};

pub struct Scheduler {
    context: DownloadJobContext,
    semaphore: Arc<Semaphore>,
    history: Option<Arc<dyn HistorySink>>,
    show_progress: bool,
}

fn aborted(url: &str) -> DownloadOutcome {
    DownloadOutcome::failed(
        url,
        OutcomeStatus::Aborted,
        Failure::new(FailureCategory::Unknown, "任务已取消"),
    )
}

impl Scheduler {
    pub fn new(context: DownloadJobContext) -> Self {
        let permits = context.config.max_workers.max(1);
        Self {
            context,
            semaphore: Arc::new(Semaphore::new(permits)),
            history: None,
            show_progress: true,
        }
    }

    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// 每个输入链接恰好产生一个结果；结果顺序按完成先后，不保证与输入一致。
    pub async fn run_batch(&self, urls: &[String]) -> Vec<DownloadOutcome> {
        let tasks = classifier::classify_batch(urls);
        self.context.manager.start_batch(tasks.len());
        if tasks.is_empty() {
            return Vec::new();
        }

        let pbar = if self.show_progress {
            ui::plain("");
            ui::info(&format!(
                "开始处理 {} 个链接 (并发数: {})...",
                tasks.len(),
                self.context.config.max_workers
            ));
            ui::new_tasks_progress_bar(tasks.len() as u64, "下载")
        } else {
            ProgressBar::hidden()
        };

        let in_flight = tasks.len();
        let outcomes: Vec<DownloadOutcome> = stream::iter(tasks)
            .map(|task| self.run_task(task, pbar.clone()))
            .buffer_unordered(in_flight)
            .collect()
            .await;

        pbar.finish_and_clear();
        outcomes
    }

    async fn run_task(&self, task: UrlClassification, pbar: ProgressBar) -> DownloadOutcome {
        let started = Instant::now();
        let processor = TaskProcessor::new(self.context.clone());
        let mut attempt = 0u32;

        let outcome = loop {
            if self.context.cancel.is_cancelled() {
                break aborted(&task.url);
            }
            attempt += 1;

            let outcome = {
                let permit = tokio::select! {
                    biased;
                    _ = self.context.cancel.cancelled() => None,
                    permit = self.semaphore.acquire() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    break aborted(&task.url);
                };

                if let RotationOutcome::Rotated(identity) = self.context.vpn.rotate_if_due(false).await {
                    pbar.println(format!("{} 出口已轮换: {}", *symbols::VPN, identity));
                }
                debug!("第 {} 次尝试 [{}]: {}", attempt, task.strategy, task.url);
                processor.attempt(&task).await
            };

            if outcome.succeeded || outcome.status == OutcomeStatus::Aborted {
                break outcome;
            }

            let failure = outcome
                .failure
                .clone()
                .unwrap_or_else(|| Failure::new(FailureCategory::Unknown, "未知错误"));
            let decision = self.context.policy.decide(failure.category, attempt);
            match decision.action {
                RetryAction::RetryWithDelay | RetryAction::RetryWithRotation => {
                    warn!(
                        "'{}' 第 {} 次尝试失败 [{}]: {}，将重试",
                        task.url, attempt, failure.category, failure.message
                    );
                    if decision.escalate_ip || decision.action == RetryAction::RetryWithRotation {
                        let rotation = self.context.vpn.rotate_if_due(true).await;
                        debug!("失败后请求轮换出口: {:?}", rotation);
                    }
                    if let Some(delay) = decision.delay {
                        if utils::cancellable_sleep(&self.context.cancel, delay).await.is_err() {
                            break aborted(&task.url);
                        }
                    }
                }
                RetryAction::Skip => {
                    info!("'{}' 无法下载 [{}]，跳过", task.url, failure.category);
                    break DownloadOutcome { status: OutcomeStatus::Skipped, ..outcome };
                }
                RetryAction::Abort => {
                    error!("'{}' 在 {} 次尝试后仍失败: {}", task.url, attempt, failure.message);
                    break DownloadOutcome { status: OutcomeStatus::Failed, ..outcome };
                }
            }
        };

        let outcome = DownloadOutcome {
            source_url: task.url.clone(),
            succeeded: outcome.status == OutcomeStatus::Succeeded,
            attempts: attempt,
            strategy: Some(task.strategy),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            ..outcome
        };
        self.finalize(&outcome, &pbar);
        outcome
    }

    fn finalize(&self, outcome: &DownloadOutcome, pbar: &ProgressBar) {
        self.context.manager.record_outcome(outcome);

        if let Some(sink) = &self.history {
            let snapshot = self.context.vpn.snapshot();
            let egress = snapshot.public_address.or(snapshot.current_identity);
            if let Err(e) = sink.record(&history::build_record(outcome, egress)) {
                warn!("写入下载历史失败: {}", e);
            }
        }

        let name = utils::truncate_text(&outcome.source_url, 60);
        let line = match outcome.status {
            OutcomeStatus::Succeeded => format!(
                "{} {} {}",
                *symbols::OK,
                name,
                outcome
                    .file_path
                    .as_ref()
                    .map(|p| format!("-> {}", p.display()))
                    .unwrap_or_default()
                    .bright_black()
            ),
            OutcomeStatus::Skipped => format!(
                "{} {} {}",
                *symbols::SKIP,
                name,
                format!("跳过: {}", outcome.failure_reason().unwrap_or_default()).yellow()
            ),
            OutcomeStatus::Failed => format!(
                "{} {} {}",
                *symbols::ERROR,
                name,
                format!("失败: {}", outcome.failure_reason().unwrap_or_default()).red()
            ),
            OutcomeStatus::Aborted => format!("{} {} {}", *symbols::WARN, name, "已取消".magenta()),
        };
        pbar.println(line);
        pbar.inc(1);
    }
}
