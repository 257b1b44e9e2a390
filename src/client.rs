// src/client.rs

use crate::error::*;
use reqwest::{
    IntoUrl, Response,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde_json::Value;
use std::{collections::HashMap, time::Duration};

/// 构建 HTTP 客户端所需的参数
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub headers: HashMap<String, String>,
    pub cookie_store: bool,
}

#[derive(Clone)]
pub struct RobustClient {
    pub client: ClientWithMiddleware,
}

impl RobustClient {
    pub fn new(options: &ClientOptions) -> AppResult<Self> {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);

        let mut default_headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| AppError::Config(format!("无效的请求头名称 '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| AppError::Config(format!("无效的请求头值 '{}': {}", value, e)))?;
            default_headers.insert(name, value);
        }

        let inner = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .default_headers(default_headers)
            .connect_timeout(options.timeout)
            .timeout(options.timeout)
            .cookie_store(options.cookie_store)
            .build()?;

        let client = ClientBuilder::new(inner)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client })
    }

    pub async fn get<T: IntoUrl>(&self, url: T) -> AppResult<Response> {
        let res = self.client.get(url).send().await?;
        Ok(res.error_for_status()?)
    }

    pub async fn fetch_json<T: IntoUrl>(&self, url: T) -> AppResult<Value> {
        Ok(self.get(url).await?.json().await?)
    }
}
