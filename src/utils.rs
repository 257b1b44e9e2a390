// src/utils.rs

use crate::{constants, error::*};
use regex::Regex;
use std::{future::Future, sync::LazyLock, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());
static DASH_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[-\s]+").unwrap());

/// 去掉协议和 `www.` 前缀后的小写主机名；无法解析时返回空串。
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .map(|host| host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
        .unwrap_or_default()
}

/// 生成 `<域名>_<标题>` 形式的安全文件名 (不含扩展名)。
pub fn safe_file_stem(url: &str, title: &str, fallback_stamp: i64) -> String {
    let domain = domain_of(url);
    let domain = if domain.is_empty() { "unknown".to_string() } else { domain };
    let slug = NON_WORD_RE.replace_all(title, "");
    let slug = DASH_SPACE_RE.replace_all(slug.trim(), "-");
    let slug = slug.trim_matches('-');
    let stem = if slug.is_empty() {
        format!("{}_{}", domain, fallback_stamp)
    } else {
        format!("{}_{}", domain, slug)
    };
    stem.chars().take(constants::MAX_FILENAME_CHARS).collect()
}

pub fn truncate_text(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut end_pos = 0;
    for (i, c) in text.char_indices() {
        width += if c.is_ascii() { 1 } else { 2 };
        if width > max_width.saturating_sub(3) {
            end_pos = i;
            break;
        }
    }
    if end_pos == 0 { text.to_string() } else { format!("{}...", &text[..end_pos]) }
}

/// 在取消信号与单次调用超时的约束下执行一个外部调用。
pub async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Duration,
    operation: &str,
    fut: F,
) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        res = tokio::time::timeout(limit, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(AppError::timeout(operation, limit)),
        },
    }
}

/// 秒数转换为 `Duration`，负数与 NaN 视为零，结果不超过 `cap`。
pub fn clamped_secs(secs: f64, cap: Duration) -> Duration {
    if !(secs > 0.0) {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).map_or(cap, |d| d.min(cap))
}

/// `limit` 之后的时刻；溢出时退回到最长超时之后
pub fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit)
        .unwrap_or_else(|| now + Duration::from_secs(constants::MAX_TIMEOUT_SECS))
}

/// 可被取消的等待。
pub async fn cancellable_sleep(cancel: &CancellationToken, duration: Duration) -> AppResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
