// src/downloader/task_processor.rs

use crate::{
    DownloadJobContext,
    classifier::{Strategy, UrlClassification},
    config::SiteProfile,
    constants,
    error::*,
    models::{DownloadOutcome, OutcomeStatus},
    recovery::Failure,
    utils,
};
use log::{debug, info};

/// `TaskProcessor` 负责单个链接的一次尝试：按分类选择提取路径并完成下载。
pub struct TaskProcessor {
    context: DownloadJobContext,
}

fn outcome_from_error(url: &str, error: &AppError) -> DownloadOutcome {
    let status = if error.is_cancelled() { OutcomeStatus::Aborted } else { OutcomeStatus::Failed };
    DownloadOutcome::failed(url, status, Failure::from_error(error))
}

impl TaskProcessor {
    pub fn new(context: DownloadJobContext) -> Self {
        Self { context }
    }

    pub async fn attempt(&self, task: &UrlClassification) -> DownloadOutcome {
        let url = task.url.as_str();
        match task.strategy {
            Strategy::Direct => {
                debug!("直链下载: {}", url);
                self.context.adapter.download(url).await
            }
            Strategy::Extractor => match self.context.config.site_profile(url) {
                Some(profile) => self.automate_then_download(url, profile).await,
                None => {
                    debug!("交给提取引擎: {}", url);
                    self.context.adapter.download(url).await
                }
            },
            Strategy::BrowserAutomation => {
                let default_profile;
                let profile = match self.context.config.site_profile(url) {
                    Some(profile) => profile,
                    None => {
                        debug!("'{}' 没有站点配方，使用默认配方扫描页面", task.domain);
                        default_profile = SiteProfile::default();
                        &default_profile
                    }
                };
                self.automate_then_download(url, profile).await
            }
        }
    }

    async fn automate_then_download(&self, url: &str, profile: &SiteProfile) -> DownloadOutcome {
        let user_agent = self
            .context
            .timing
            .choose(&self.context.config.user_agents)
            .cloned()
            .unwrap_or_else(|| constants::USER_AGENTS[0].to_string());

        let session = utils::guarded(
            &self.context.cancel,
            self.context.config.timeout,
            "创建页面会话",
            self.context.driver.new_session(&user_agent, &profile.custom_headers),
        )
        .await;
        let mut session = match session {
            Ok(session) => session,
            Err(e) => return outcome_from_error(url, &e),
        };

        let result = self.context.automation.run(session.as_mut(), url, profile).await;
        drop(session);

        match result {
            Ok(result) => match result.best_link() {
                Some(link) => {
                    info!("使用页面中找到的链接 ({:?}): {}", link.kind, link.url);
                    self.context.adapter.download_from(url, &link.url).await
                }
                None => outcome_from_error(
                    url,
                    &AppError::automation(crate::recovery::FailureCategory::NotFound, "页面中未找到视频链接"),
                ),
            },
            Err(e) => outcome_from_error(url, &e),
        }
    }
}
