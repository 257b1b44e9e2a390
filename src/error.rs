// src/error.rs

use crate::recovery::FailureCategory;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("网络中间件错误: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),
    #[error("配置无效: {0}")]
    Config(String),
    #[error("{operation} 超时 (timeout {seconds}s)")]
    Timeout { operation: String, seconds: u64 },
    #[error("VPN 客户端错误: {0}")]
    Vpn(String),
    #[error("提取引擎错误: {0}")]
    Extraction(String),
    #[error("文件校验失败: {0}")]
    Transfer(String),
    #[error("页面自动化失败: {message}")]
    Automation {
        category: FailureCategory,
        message: String,
    },
    #[error("无效的 CSS 选择器 '{selector}': {reason}")]
    Selector { selector: String, reason: String },
    #[error("任务已取消")]
    Cancelled,
    #[error("{0}")] // 只打印内部信息，不加任何前缀
    UserInputError(String),
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn automation(category: FailureCategory, message: impl Into<String>) -> Self {
        AppError::Automation {
            category,
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, limit: std::time::Duration) -> Self {
        AppError::Timeout {
            operation: operation.into(),
            seconds: limit.as_secs(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

pub type AppResult<T> = Result<T, AppError>;
