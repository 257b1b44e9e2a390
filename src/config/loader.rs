// src/config/loader.rs

use crate::{
    config::ExternalConfig,
    constants,
    error::{AppError, AppResult},
};
use anyhow::{Context, anyhow};
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub fn default_config_path() -> AppResult<PathBuf> {
    let path = dirs::home_dir()
        .ok_or_else(|| AppError::Other(anyhow!("无法获取用户主目录")))?
        .join(constants::CONFIG_DIR_NAME)
        .join(constants::CONFIG_FILE_NAME);
    Ok(path)
}

pub fn resolve_config_path(custom: Option<&Path>) -> AppResult<PathBuf> {
    match custom {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_path(),
    }
}

/// 读取配置文件；不存在时写出默认配置。
pub fn load_or_create_external_config(custom: Option<&Path>) -> AppResult<ExternalConfig> {
    let config_path = resolve_config_path(custom)?;
    if config_path.is_file() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("读取配置文件 '{}' 失败", config_path.display()))?;
        let config: ExternalConfig = serde_json::from_str(&content)
            .with_context(|| format!("解析配置文件 '{}' 失败", config_path.display()))?;
        info!("已加载配置文件: {}", config_path.display());
        Ok(config)
    } else {
        info!("配置文件 {:?} 不存在，将创建默认配置。", config_path);
        let config = ExternalConfig::default();
        save_config(&config_path, &config)?;
        Ok(config)
    }
}

pub fn save_config(path: &Path, config: &ExternalConfig) -> AppResult<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let json_content = serde_json::to_string_pretty(config)?;
    fs::write(path, json_content)
        .with_context(|| format!("写入配置文件 '{}' 失败", path.display()))?;
    Ok(())
}

/// 用于展示的配置副本：密码被遮蔽
pub fn masked(config: &ExternalConfig) -> ExternalConfig {
    let mut copy = config.clone();
    for site in copy.sites.values_mut() {
        if site.login_password.is_some() {
            site.login_password = Some("********".into());
        }
    }
    copy
}
