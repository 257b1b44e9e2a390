// src/recovery.rs

//! 失败分类与重试策略。
//!
//! 所有自动化、提取与传输失败在到达调度器之前都会被归一化为 [`Failure`]，
//! 再由 [`RetryPolicy::decide`] 给出下一步动作。

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureCategory {
    NetworkTimeout,
    NotFound,
    AccessDenied,
    RateLimited,
    LoginRequired,
    Unknown,
}

/// 有序的 分类 → 关键字 表。顺序即优先级：第一个命中的分类胜出。
const PATTERN_TABLE: [(FailureCategory, &[&str]); 5] = [
    (FailureCategory::NetworkTimeout, &["timeout", "timed out", "connection", "network"]),
    (FailureCategory::NotFound, &["not found", "404", "does not exist"]),
    (FailureCategory::AccessDenied, &["403", "forbidden", "access denied"]),
    (FailureCategory::RateLimited, &["rate limit", "429", "too many requests"]),
    (FailureCategory::LoginRequired, &["login", "authentication", "unauthorized"]),
];

/// 根据失败文本进行分类 (大小写不敏感的子串匹配)。总是返回一个分类。
pub fn classify(failure_text: &str) -> FailureCategory {
    let lower = failure_text.to_lowercase();
    PATTERN_TABLE
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(category, _)| *category)
        .unwrap_or(FailureCategory::Unknown)
}

/// 归一化后的失败：分类 + 可读信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub category: FailureCategory,
    pub message: String,
}

impl Failure {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    /// 将内部错误转换为失败分类。
    ///
    /// 自动化错误自带分类；超时在没有更具体的关键字命中时按网络超时处理；
    /// HTTP 错误优先看状态码；其余错误按文本分类。
    pub fn from_error(error: &AppError) -> Self {
        let message = error.to_string();
        let category = match error {
            AppError::Automation { category, .. } => *category,
            AppError::Timeout { .. } => match classify(&message) {
                FailureCategory::Unknown => FailureCategory::NetworkTimeout,
                specific => specific,
            },
            AppError::Network(err)
            | AppError::NetworkMiddleware(reqwest_middleware::Error::Reqwest(err)) => {
                categorize_reqwest_error(err).unwrap_or_else(|| classify(&message))
            }
            AppError::Extraction(text) | AppError::Vpn(text) | AppError::Transfer(text) => {
                classify(text)
            }
            _ => classify(&message),
        };
        Self { category, message }
    }
}

fn categorize_reqwest_error(err: &reqwest::Error) -> Option<FailureCategory> {
    if let Some(status) = err.status() {
        return match status.as_u16() {
            401 => Some(FailureCategory::LoginRequired),
            403 => Some(FailureCategory::AccessDenied),
            404 | 410 => Some(FailureCategory::NotFound),
            429 => Some(FailureCategory::RateLimited),
            _ => None,
        };
    }
    if err.is_timeout() || err.is_connect() {
        return Some(FailureCategory::NetworkTimeout);
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    RetryWithDelay,
    RetryWithRotation,
    Skip,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub action: RetryAction,
    pub delay: Option<Duration>,
    pub escalate_ip: bool,
}

impl RetryDecision {
    fn retry(action: RetryAction, delay_secs: u64, escalate_ip: bool) -> Self {
        Self {
            action,
            delay: Some(Duration::from_secs(delay_secs)),
            escalate_ip,
        }
    }

    fn terminal(action: RetryAction) -> Self {
        Self {
            action,
            delay: None,
            escalate_ip: false,
        }
    }
}

const NETWORK_TIMEOUT_STEP_SECS: u64 = 30;
const NETWORK_TIMEOUT_CAP_SECS: u64 = 300;
const RATE_LIMIT_DELAY_SECS: u64 = 120;
const ACCESS_DENIED_DELAY_SECS: u64 = 60;
const UNKNOWN_DELAY_SECS: u64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// `attempt` 是刚刚失败的那次尝试的序号 (从 1 开始)。
    pub fn decide(&self, category: FailureCategory, attempt: u32) -> RetryDecision {
        if attempt > self.max_retries {
            return RetryDecision::terminal(RetryAction::Abort);
        }
        match category {
            FailureCategory::NetworkTimeout => RetryDecision::retry(
                RetryAction::RetryWithDelay,
                (NETWORK_TIMEOUT_STEP_SECS * u64::from(attempt)).min(NETWORK_TIMEOUT_CAP_SECS),
                false,
            ),
            FailureCategory::RateLimited => {
                RetryDecision::retry(RetryAction::RetryWithDelay, RATE_LIMIT_DELAY_SECS, true)
            }
            FailureCategory::AccessDenied => {
                RetryDecision::retry(RetryAction::RetryWithRotation, ACCESS_DENIED_DELAY_SECS, true)
            }
            FailureCategory::LoginRequired | FailureCategory::NotFound => {
                RetryDecision::terminal(RetryAction::Skip)
            }
            FailureCategory::Unknown => {
                RetryDecision::retry(RetryAction::RetryWithDelay, UNKNOWN_DELAY_SECS, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_classify_scenarios() {
        assert_eq!(classify("Connection timeout after 30 seconds"), FailureCategory::NetworkTimeout);
        assert_eq!(classify("429 Too Many Requests"), FailureCategory::RateLimited);
        assert_eq!(classify("HTTP Error 404: Not Found"), FailureCategory::NotFound);
        assert_eq!(classify("HTTP Error 403: Forbidden"), FailureCategory::AccessDenied);
        assert_eq!(classify("Sign in / login to confirm your age"), FailureCategory::LoginRequired);
        assert_eq!(classify("something odd happened"), FailureCategory::Unknown);
        assert_eq!(classify(""), FailureCategory::Unknown);
    }

    #[test]
    fn test_classify_table_order_breaks_ties() {
        // 同时命中 network 与 403 时，表中靠前的分类胜出
        assert_eq!(classify("network error: 403 forbidden"), FailureCategory::NetworkTimeout);
        // 同时命中 404 与 login 时，not found 优先
        assert_eq!(classify("login page not found"), FailureCategory::NotFound);
    }

    #[test]
    fn test_decide_table() {
        let policy = RetryPolicy::new(3);

        let d = policy.decide(classify("Connection timeout after 30 seconds"), 1);
        assert_eq!(d.action, RetryAction::RetryWithDelay);
        assert_eq!(d.delay, Some(Duration::from_secs(30)));
        assert!(!d.escalate_ip);
        assert_eq!(policy.decide(FailureCategory::NetworkTimeout, 3).delay, Some(Duration::from_secs(90)));

        let d = policy.decide(classify("429 Too Many Requests"), 1);
        assert_eq!(d.action, RetryAction::RetryWithDelay);
        assert_eq!(d.delay, Some(Duration::from_secs(120)));
        assert!(d.escalate_ip);

        let d = policy.decide(FailureCategory::AccessDenied, 2);
        assert_eq!(d.action, RetryAction::RetryWithRotation);
        assert_eq!(d.delay, Some(Duration::from_secs(60)));
        assert!(d.escalate_ip);

        assert_eq!(policy.decide(FailureCategory::LoginRequired, 1).action, RetryAction::Skip);
        assert_eq!(policy.decide(FailureCategory::NotFound, 1).action, RetryAction::Skip);

        let d = policy.decide(FailureCategory::Unknown, 1);
        assert_eq!(d.action, RetryAction::RetryWithDelay);
        assert_eq!(d.delay, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_network_timeout_delay_is_capped() {
        let policy = RetryPolicy::new(100);
        assert_eq!(
            policy.decide(FailureCategory::NetworkTimeout, 50).delay,
            Some(Duration::from_secs(NETWORK_TIMEOUT_CAP_SECS))
        );
    }

    #[test]
    fn test_beyond_ceiling_always_aborts() {
        for ceiling in [0u32, 1, 3] {
            let policy = RetryPolicy::new(ceiling);
            for category in FailureCategory::iter() {
                for attempt in (ceiling + 1)..(ceiling + 4) {
                    assert_eq!(policy.decide(category, attempt).action, RetryAction::Abort);
                }
            }
        }
    }

    #[test]
    fn test_failure_from_error() {
        let timeout = AppError::timeout("点击", Duration::from_secs(10));
        assert_eq!(Failure::from_error(&timeout).category, FailureCategory::NetworkTimeout);

        let login = AppError::automation(FailureCategory::LoginRequired, "未找到用户名输入框");
        assert_eq!(Failure::from_error(&login).category, FailureCategory::LoginRequired);

        let engine = AppError::Extraction("ERROR: [generic] Unable to download webpage: HTTP Error 429: Too Many Requests".into());
        assert_eq!(Failure::from_error(&engine).category, FailureCategory::RateLimited);

        let missing = AppError::Transfer("下载完成但未找到媒体文件".into());
        assert_eq!(Failure::from_error(&missing).category, FailureCategory::Unknown);
    }
}
