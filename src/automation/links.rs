// src/automation/links.rs

//! 媒体链接的筛选与排序。

use super::page::{MediaOrigin, MediaSource};
use regex::Regex;
use serde::Serialize;
use std::{collections::HashMap, sync::LazyLock};
use url::Url;

static DIRECT_VIDEO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(mp4|mkv|webm|avi|mov|m4v|flv|wmv)$").unwrap()
});
static MANIFEST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(m3u8|mpd)$").unwrap());
static EMBED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(/embed/|/player/|player\.|/video/embed|dailymotion\.com/embed|youtube(-nocookie)?\.com/embed)").unwrap()
});

/// 排序靠前者优先
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    DirectSameHost,
    DirectOtherHost,
    Configured,
    Manifest,
    Embed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedLink {
    pub url: String,
    pub kind: LinkKind,
}

fn resolve(page_url: Option<&Url>, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if ["data:", "blob:", "javascript:", "mailto:", "#"].iter().any(|p| lower.starts_with(p)) {
        return None;
    }
    let parsed = match page_url {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

fn kind_of(page_url: Option<&Url>, url: &Url, origin: MediaOrigin) -> Option<LinkKind> {
    let path = url.path();
    if DIRECT_VIDEO_RE.is_match(path) {
        let same_host = page_url.is_some_and(|p| p.host_str() == url.host_str());
        return Some(if same_host { LinkKind::DirectSameHost } else { LinkKind::DirectOtherHost });
    }
    if origin == MediaOrigin::Configured {
        return Some(LinkKind::Configured);
    }
    if MANIFEST_RE.is_match(path) {
        return Some(LinkKind::Manifest);
    }
    match origin {
        MediaOrigin::Iframe | MediaOrigin::Embed => Some(LinkKind::Embed),
        MediaOrigin::VideoElement | MediaOrigin::SourceElement | MediaOrigin::MetaTag => {
            Some(LinkKind::DirectOtherHost)
        }
        MediaOrigin::Anchor if EMBED_RE.is_match(url.as_str()) => Some(LinkKind::Embed),
        _ => None,
    }
}

/// 解析相对地址、过滤非媒体链接并排序：同站直链 > 其他直链 > 配方链接 > 清单 > 嵌入播放器。
/// 同类链接保持页面中的出现顺序，重复链接只保留最优的一次。
pub fn rank_media_links(page_url: &str, sources: impl IntoIterator<Item = MediaSource>) -> Vec<RankedLink> {
    let base = Url::parse(page_url).ok();
    let mut best: HashMap<String, (LinkKind, usize)> = HashMap::new();

    for (index, source) in sources.into_iter().enumerate() {
        let Some(url) = resolve(base.as_ref(), &source.url) else {
            continue;
        };
        let Some(kind) = kind_of(base.as_ref(), &url, source.origin) else {
            continue;
        };
        best.entry(url.to_string())
            .and_modify(|entry| {
                if kind < entry.0 {
                    entry.0 = kind;
                }
            })
            .or_insert((kind, index));
    }

    let mut ranked: Vec<(String, LinkKind, usize)> =
        best.into_iter().map(|(url, (kind, index))| (url, kind, index)).collect();
    ranked.sort_by_key(|(_, kind, index)| (*kind, *index));
    ranked
        .into_iter()
        .map(|(url, kind, _)| RankedLink { url, kind })
        .collect()
}
