// src/automation/mod.rs

//! 站点自动化状态机：登录 → 定位视频 → 提取下载链接。
//!
//! 每个页面操作都有单独的超时并响应取消信号；操作前后的停顿来自 [`TimingPolicy`]。

pub mod links;
pub mod page;
pub mod static_page;

pub use links::{LinkKind, RankedLink, rank_media_links};
pub use page::{BrowserDriver, MediaOrigin, MediaSource, PageSession};
pub use static_page::StaticPageDriver;

use crate::{
    config::SiteProfile,
    constants::pacing,
    error::{AppError, AppResult},
    recovery::FailureCategory,
    timing::TimingPolicy,
    utils,
};
use log::{debug, info, warn};
use std::{future::Future, sync::Arc, time::Duration};
use strum_macros::Display;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// 单个候选选择器的最长等待时间
const CANDIDATE_WAIT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AutomationState {
    Start,
    LoggedIn,
    VideoLocated,
    LinkExtracted,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AutomationResult {
    /// 按优先级排好序，至少一个
    pub links: Vec<RankedLink>,
    pub trace: Vec<AutomationState>,
}

impl AutomationResult {
    pub fn best_link(&self) -> Option<&RankedLink> {
        self.links.first()
    }
}

pub struct SiteAutomation {
    timing: Arc<TimingPolicy>,
    step_timeout: Duration,
    cancel: CancellationToken,
}

impl SiteAutomation {
    pub fn new(timing: Arc<TimingPolicy>, step_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            timing,
            step_timeout,
            cancel,
        }
    }

    async fn step<T, F>(&self, operation: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        utils::guarded(&self.cancel, self.step_timeout, operation, fut).await
    }

    /// 在 `target_url` 上执行完整的自动化流程。失败时状态轨迹以 `Failed` 结尾并写入日志。
    pub async fn run(
        &self,
        session: &mut dyn PageSession,
        target_url: &str,
        profile: &SiteProfile,
    ) -> AppResult<AutomationResult> {
        let mut trace = vec![AutomationState::Start];
        match self.drive(session, target_url, profile, &mut trace).await {
            Ok(links) => {
                trace.push(AutomationState::LinkExtracted);
                trace.push(AutomationState::Done);
                info!("自动化完成: {} (找到 {} 个候选链接)", target_url, links.len());
                Ok(AutomationResult { links, trace })
            }
            Err(e) => {
                trace.push(AutomationState::Failed);
                let path: Vec<String> = trace.iter().map(ToString::to_string).collect();
                warn!("自动化失败 [{}]: {}", path.join(" -> "), e);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut dyn PageSession,
        target_url: &str,
        profile: &SiteProfile,
        trace: &mut Vec<AutomationState>,
    ) -> AppResult<Vec<RankedLink>> {
        self.step("页面加载", session.goto(target_url)).await?;
        self.simulate_reading(session).await?;

        if let Some((username, password)) = profile.credentials() {
            self.login(session, target_url, profile, username, password).await?;
            trace.push(AutomationState::LoggedIn);
        } else {
            debug!("站点配方未提供凭据，跳过登录");
        }

        if !profile.video_button.is_empty() {
            self.locate_video(session, profile).await?;
            trace.push(AutomationState::VideoLocated);
        }

        self.extract_links(session, target_url, profile).await
    }

    /// 模拟阅读：随机时长内分几次滚动，最后移动一次指针
    async fn simulate_reading(&self, session: &mut dyn PageSession) -> AppResult<()> {
        let reading = self.timing.sample_delay(pacing::READING);
        let steps = self.timing.scroll_steps();
        let slice = reading / (steps + 1);
        debug!("模拟阅读 {:.2}s，滚动 {} 次", reading.as_secs_f64(), steps);
        for _ in 0..steps {
            utils::cancellable_sleep(&self.cancel, slice).await?;
            let distance = self.timing.scroll_distance();
            self.step("页面滚动", session.scroll_by(distance)).await?;
        }
        let (width, height) = pacing::VIEWPORT;
        let (x, y) = self.timing.pointer_target(width, height);
        self.step("指针移动", session.move_pointer(x, y)).await?;
        self.timing.pause(pacing::AFTER_POINTER, &self.cancel).await?;
        Ok(())
    }

    /// 轮询等待元素可交互，最多等待 `limit`
    async fn wait_for_interactable(
        &self,
        session: &mut dyn PageSession,
        selector: &str,
        limit: Duration,
    ) -> AppResult<bool> {
        let deadline = utils::deadline_after(limit);
        loop {
            match self.step("元素检测", session.is_interactable(selector)).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(e) => {
                    warn!("选择器 '{}' 检测失败: {}", selector, e);
                    return Ok(false);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            utils::cancellable_sleep(&self.cancel, POLL_INTERVAL.min(deadline - now)).await?;
        }
    }

    /// 依次尝试候选选择器，返回第一个可交互的。所有候选共享 `step_timeout` 预算，
    /// 剩余预算在尚未尝试的候选之间平分；静态页面每个候选只检测一次。
    async fn first_interactable(
        &self,
        session: &mut dyn PageSession,
        candidates: &[String],
    ) -> AppResult<Option<String>> {
        let deadline = utils::deadline_after(self.step_timeout);
        let single_probe = session.is_static();
        for (i, selector) in candidates.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let limit = if single_probe {
                Duration::ZERO
            } else {
                let untried = u32::try_from(candidates.len() - i).unwrap_or(u32::MAX);
                (remaining / untried).min(CANDIDATE_WAIT)
            };
            if self
                .wait_for_interactable(session, selector, limit)
                .await?
            {
                debug!("选择器命中: {}", selector);
                return Ok(Some(selector.clone()));
            }
        }
        Ok(None)
    }

    /// 拟人点击：滚动到元素 → 悬停 → 停顿 → 点击 → 停顿
    async fn human_click(&self, session: &mut dyn PageSession, selector: &str) -> AppResult<()> {
        self.step("滚动到元素", session.scroll_into_view(selector)).await?;
        self.timing.pause(pacing::AFTER_SCROLL, &self.cancel).await?;
        self.step("悬停", session.hover(selector)).await?;
        self.timing.pause(pacing::AFTER_HOVER, &self.cancel).await?;
        self.step("点击", session.click(selector)).await?;
        self.timing.pause(pacing::AFTER_CLICK, &self.cancel).await?;
        Ok(())
    }

    async fn login(
        &self,
        session: &mut dyn PageSession,
        target_url: &str,
        profile: &SiteProfile,
        username: &str,
        password: &str,
    ) -> AppResult<()> {
        if let Some(login_url) = profile.login_url.as_deref() {
            if session.current_url().as_deref() != Some(login_url) {
                self.step("打开登录页", session.goto(login_url)).await?;
                self.timing.pause(profile.human_delay(), &self.cancel).await?;
            }
        }

        let username_field = self
            .first_interactable(session, &profile.login_username_field)
            .await?
            .ok_or_else(|| AppError::automation(FailureCategory::LoginRequired, "未找到用户名输入框"))?;
        self.step("填写用户名", session.fill(&username_field, username)).await?;
        self.timing.pause(pacing::AFTER_FILL, &self.cancel).await?;

        let password_field = self
            .first_interactable(session, &profile.login_password_field)
            .await?
            .ok_or_else(|| AppError::automation(FailureCategory::LoginRequired, "未找到密码输入框"))?;
        self.step("填写密码", session.fill(&password_field, password)).await?;
        self.timing.pause(pacing::AFTER_FILL, &self.cancel).await?;

        let submit = self
            .first_interactable(session, &profile.login_submit_button)
            .await?
            .ok_or_else(|| AppError::automation(FailureCategory::LoginRequired, "未找到登录按钮"))?;
        self.human_click(session, &submit).await?;
        utils::cancellable_sleep(&self.cancel, profile.wait_after_login()).await?;

        if session.current_url().as_deref() != Some(target_url) {
            self.step("返回目标页", session.goto(target_url)).await?;
            self.timing.pause(profile.human_delay(), &self.cancel).await?;
        }
        info!("登录流程完成");
        Ok(())
    }

    async fn locate_video(&self, session: &mut dyn PageSession, profile: &SiteProfile) -> AppResult<()> {
        let selector = self
            .first_interactable(session, &profile.video_button)
            .await?
            .ok_or_else(|| {
                AppError::automation(FailureCategory::NotFound, "所有视频按钮选择器均不可用")
            })?;
        self.human_click(session, &selector).await
    }

    async fn extract_links(
        &self,
        session: &mut dyn PageSession,
        target_url: &str,
        profile: &SiteProfile,
    ) -> AppResult<Vec<RankedLink>> {
        let mut sources = Vec::new();
        for selector in &profile.download_link {
            for attribute in ["href", "src"] {
                match self
                    .step("读取链接属性", session.attribute_values(selector, attribute))
                    .await
                {
                    Ok(values) => sources.extend(
                        values.into_iter().map(|v| MediaSource::new(v, MediaOrigin::Configured)),
                    ),
                    Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                    Err(e) => warn!("下载链接选择器 '{}' 无效: {}", selector, e),
                }
            }
        }
        sources.extend(self.step("扫描媒体元素", session.media_sources()).await?);

        let page_url = session.current_url().unwrap_or_else(|| target_url.to_string());
        let ranked = rank_media_links(&page_url, sources);
        if ranked.is_empty() {
            return Err(AppError::automation(FailureCategory::NotFound, "页面中未找到视频链接"));
        }
        Ok(ranked)
    }
}
