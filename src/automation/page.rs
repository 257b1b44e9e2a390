// src/automation/page.rs

use crate::error::AppResult;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use strum_macros::Display;

/// 页面中媒体链接的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MediaOrigin {
    /// 站点配方中 `download_link` 选择器命中的链接
    Configured,
    VideoElement,
    SourceElement,
    Iframe,
    Embed,
    Anchor,
    MetaTag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub url: String,
    pub origin: MediaOrigin,
}

impl MediaSource {
    pub fn new(url: impl Into<String>, origin: MediaOrigin) -> Self {
        Self {
            url: url.into(),
            origin,
        }
    }
}

/// 单个工作协程独占的页面会话。所有方法都可能挂起，由调用方施加超时。
#[async_trait]
pub trait PageSession: Send {
    async fn goto(&mut self, url: &str) -> AppResult<()>;
    fn current_url(&self) -> Option<String>;
    /// DOM 在两次检测之间不会变化 (例如静态 HTML)
    fn is_static(&self) -> bool {
        false
    }
    /// 元素存在且可交互时返回 `true`；选择器非法时返回错误
    async fn is_interactable(&mut self, selector: &str) -> AppResult<bool>;
    async fn scroll_into_view(&mut self, selector: &str) -> AppResult<()>;
    async fn hover(&mut self, selector: &str) -> AppResult<()>;
    async fn click(&mut self, selector: &str) -> AppResult<()>;
    async fn fill(&mut self, selector: &str, value: &str) -> AppResult<()>;
    async fn scroll_by(&mut self, delta_y: i64) -> AppResult<()>;
    async fn move_pointer(&mut self, x: u32, y: u32) -> AppResult<()>;
    async fn attribute_values(&mut self, selector: &str, attribute: &str) -> AppResult<Vec<String>>;
    /// 页面中内联媒体、iframe 播放器、链接与元数据里出现的所有候选 URL
    async fn media_sources(&mut self) -> AppResult<Vec<MediaSource>>;
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn new_session(
        &self,
        user_agent: &str,
        headers: &HashMap<String, String>,
    ) -> AppResult<Box<dyn PageSession>>;
}
