// src/automation/static_page.rs

//! 基于 HTTP 的页面驱动：用 `reqwest` 抓取页面、`scraper` 执行 CSS 选择器。
//! 不执行脚本，滚动、悬停和指针移动只做记录。

use super::page::{BrowserDriver, MediaOrigin, MediaSource, PageSession};
use crate::{
    client::{ClientOptions, RobustClient},
    config::AppConfig,
    error::{AppError, AppResult},
    recovery::FailureCategory,
};
use async_trait::async_trait;
use log::{debug, warn};
use scraper::{ElementRef, Html, Selector};
use std::{collections::HashMap, time::Duration};
use url::{Url, form_urlencoded};

pub struct StaticPageDriver {
    timeout: Duration,
}

impl StaticPageDriver {
    pub fn new(config: &AppConfig) -> Self {
        if !config.headless {
            warn!("当前页面驱动不支持有界面模式，忽略 headless=false");
        }
        Self {
            timeout: config.timeout,
        }
    }
}

#[async_trait]
impl BrowserDriver for StaticPageDriver {
    async fn new_session(
        &self,
        user_agent: &str,
        headers: &HashMap<String, String>,
    ) -> AppResult<Box<dyn PageSession>> {
        let options = ClientOptions {
            user_agent: user_agent.to_string(),
            timeout: self.timeout,
            max_retries: 1,
            headers: headers.clone(),
            cookie_store: true,
        };
        Ok(Box::new(StaticPageSession::new(RobustClient::new(&options)?)))
    }
}

fn parse_selector(selector: &str) -> AppResult<Selector> {
    Selector::parse(selector).map_err(|e| AppError::Selector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

fn element_missing(selector: &str) -> AppError {
    AppError::automation(FailureCategory::NotFound, format!("页面中不存在元素 '{}'", selector))
}

fn is_visible_and_enabled(element: &ElementRef<'_>) -> bool {
    let el = element.value();
    if el.attr("disabled").is_some() || el.attr("hidden").is_some() {
        return false;
    }
    if el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return false;
    }
    let style: String = el
        .attr("style")
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    !(style.contains("display:none") || style.contains("visibility:hidden"))
}

/// 点击的效果，在解析阶段同步计算，避免跨 await 持有 DOM
#[derive(Debug, PartialEq)]
enum ClickAction {
    Navigate(Url),
    Submit {
        method: String,
        action: Url,
        fields: Vec<(String, String)>,
    },
    Nothing,
}

pub struct StaticPageSession {
    client: RobustClient,
    current_url: Option<Url>,
    html: String,
    /// 表单字段名 -> 已填写的值
    form_values: HashMap<String, String>,
    scroll_y: i64,
    pointer: (u32, u32),
}

impl StaticPageSession {
    pub fn new(client: RobustClient) -> Self {
        Self {
            client,
            current_url: None,
            html: String::new(),
            form_values: HashMap::new(),
            scroll_y: 0,
            pointer: (0, 0),
        }
    }

    fn resolve(&self, raw: &str) -> AppResult<Url> {
        match &self.current_url {
            Some(base) => Ok(base.join(raw)?),
            None => Ok(Url::parse(raw)?),
        }
    }

    async fn load(&mut self, request: reqwest_middleware::RequestBuilder) -> AppResult<()> {
        let res = request.send().await?.error_for_status()?;
        let final_url = res.url().clone();
        self.html = res.text().await?;
        debug!("已加载页面: {}", final_url);
        self.current_url = Some(final_url);
        self.form_values.clear();
        self.scroll_y = 0;
        Ok(())
    }

    fn require_element(&self, selector: &str) -> AppResult<()> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        if doc.select(&sel).next().is_some() {
            Ok(())
        } else {
            Err(element_missing(selector))
        }
    }

    fn plan_click(&self, selector: &str) -> AppResult<ClickAction> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        let element = doc.select(&sel).next().ok_or_else(|| element_missing(selector))?;

        if element.value().name() == "a" {
            if let Some(href) = element.value().attr("href") {
                return Ok(ClickAction::Navigate(self.resolve(href)?));
            }
        }

        let form = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "form");
        let Some(form) = form else {
            return Ok(ClickAction::Nothing);
        };

        let action = match form.value().attr("action") {
            Some(a) if !a.trim().is_empty() => self.resolve(a)?,
            _ => self.resolve("")?,
        };
        let method = form.value().attr("method").unwrap_or("get").to_ascii_lowercase();

        let fields_sel = parse_selector("input[name], textarea[name], select[name]")?;
        let mut fields = Vec::new();
        for input in form.select(&fields_sel) {
            let el = input.value();
            let Some(name) = el.attr("name") else { continue };
            let input_type = el.attr("type").unwrap_or("text").to_ascii_lowercase();
            if matches!(input_type.as_str(), "submit" | "button" | "image" | "reset") {
                continue;
            }
            let value = self
                .form_values
                .get(name)
                .cloned()
                .or_else(|| el.attr("value").map(str::to_string))
                .unwrap_or_default();
            fields.push((name.to_string(), value));
        }
        if let Some(name) = element.value().attr("name") {
            let value = element.value().attr("value").unwrap_or_default();
            fields.push((name.to_string(), value.to_string()));
        }

        Ok(ClickAction::Submit { method, action, fields })
    }

    fn field_key(&self, selector: &str) -> AppResult<String> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        let element = doc.select(&sel).next().ok_or_else(|| element_missing(selector))?;
        let el = element.value();
        Ok(el.attr("name").or_else(|| el.attr("id")).unwrap_or(selector).to_string())
    }

    fn collect_media(&self) -> AppResult<Vec<MediaSource>> {
        let doc = Html::parse_document(&self.html);
        let queries: [(&str, &str, MediaOrigin); 9] = [
            ("video[src]", "src", MediaOrigin::VideoElement),
            ("source[src]", "src", MediaOrigin::SourceElement),
            ("iframe[src]", "src", MediaOrigin::Iframe),
            ("embed[src]", "src", MediaOrigin::Embed),
            ("object[data]", "data", MediaOrigin::Embed),
            ("a[href]", "href", MediaOrigin::Anchor),
            ("meta[property='og:video']", "content", MediaOrigin::MetaTag),
            ("meta[property='og:video:url']", "content", MediaOrigin::MetaTag),
            ("meta[property='og:video:secure_url']", "content", MediaOrigin::MetaTag),
        ];
        let mut found = Vec::new();
        for (query, attr, origin) in queries {
            let sel = parse_selector(query)?;
            for element in doc.select(&sel) {
                if let Some(value) = element.value().attr(attr) {
                    found.push(MediaSource::new(value, origin));
                }
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl PageSession for StaticPageSession {
    async fn goto(&mut self, url: &str) -> AppResult<()> {
        let target = self.resolve(url)?;
        let request = self.client.client.get(target);
        self.load(request).await
    }

    fn current_url(&self) -> Option<String> {
        self.current_url.as_ref().map(Url::to_string)
    }

    fn is_static(&self) -> bool {
        true
    }

    async fn is_interactable(&mut self, selector: &str) -> AppResult<bool> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        let interactable = doc.select(&sel).next().is_some_and(|e| is_visible_and_enabled(&e));
        Ok(interactable)
    }

    async fn scroll_into_view(&mut self, selector: &str) -> AppResult<()> {
        self.require_element(selector)
    }

    async fn hover(&mut self, selector: &str) -> AppResult<()> {
        self.require_element(selector)
    }

    async fn click(&mut self, selector: &str) -> AppResult<()> {
        match self.plan_click(selector)? {
            ClickAction::Navigate(url) => {
                let request = self.client.client.get(url);
                self.load(request).await
            }
            ClickAction::Submit { method, action, fields } => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                let request = if method == "post" {
                    self.client
                        .client
                        .post(action)
                        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(encoded)
                } else {
                    let mut url = action;
                    url.set_query(Some(&encoded));
                    self.client.client.get(url)
                };
                self.load(request).await
            }
            ClickAction::Nothing => {
                debug!("点击 '{}' 无页面跳转", selector);
                Ok(())
            }
        }
    }

    async fn fill(&mut self, selector: &str, value: &str) -> AppResult<()> {
        let key = self.field_key(selector)?;
        self.form_values.insert(key, value.to_string());
        Ok(())
    }

    async fn scroll_by(&mut self, delta_y: i64) -> AppResult<()> {
        self.scroll_y += delta_y;
        debug!("页面滚动位置: {}", self.scroll_y);
        Ok(())
    }

    async fn move_pointer(&mut self, x: u32, y: u32) -> AppResult<()> {
        self.pointer = (x, y);
        debug!("指针位置: {:?}", self.pointer);
        Ok(())
    }

    async fn attribute_values(&mut self, selector: &str, attribute: &str) -> AppResult<Vec<String>> {
        let sel = parse_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        let values = doc
            .select(&sel)
            .filter_map(|e| e.value().attr(attribute))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        Ok(values)
    }

    async fn media_sources(&mut self) -> AppResult<Vec<MediaSource>> {
        self.collect_media()
    }
}
