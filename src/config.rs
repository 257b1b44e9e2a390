// src/config.rs

pub mod loader;

use self::loader::load_or_create_external_config;
use crate::{
    cli::Cli,
    constants,
    error::{AppError, AppResult},
    timing::DelayRange,
    utils,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    time::Duration,
};

/// 允许配置文件中以单个字符串或字符串数组书写选择器
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// 单个站点的自动化配方。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteProfile {
    #[serde(deserialize_with = "one_or_many")]
    pub video_button: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub download_link: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub login_username_field: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub login_password_field: Vec<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub login_submit_button: Vec<String>,
    /// 登录提交后的等待时间 (秒)
    pub wait_after_login: f64,
    pub custom_headers: HashMap<String, String>,
    pub human_delay_min: f64,
    pub human_delay_max: f64,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            video_button: Vec::new(),
            download_link: Vec::new(),
            login_username: None,
            login_password: None,
            login_url: None,
            login_username_field: strings(&["input[name='username']", "input[type='email']"]),
            login_password_field: strings(&["input[name='password']", "input[type='password']"]),
            login_submit_button: strings(&["button[type='submit']", "input[type='submit']"]),
            wait_after_login: 3.0,
            custom_headers: HashMap::new(),
            human_delay_min: 1.0,
            human_delay_max: 3.0,
        }
    }
}

impl SiteProfile {
    /// 仅当用户名与密码同时存在时返回凭据
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.login_username, &self.login_password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user.as_str(), pass.as_str()))
            }
            _ => None,
        }
    }

    pub fn human_delay(&self) -> DelayRange {
        DelayRange::new(self.human_delay_min, self.human_delay_max)
    }

    pub fn wait_after_login(&self) -> Duration {
        utils::clamped_secs(self.wait_after_login, constants::pacing::MAX_DELAY)
    }

    pub fn validate(&self, domain: &str) -> AppResult<()> {
        let has_user = self.login_username.as_deref().is_some_and(|s| !s.is_empty());
        let has_pass = self.login_password.as_deref().is_some_and(|s| !s.is_empty());
        if has_user != has_pass {
            return Err(AppError::Config(format!(
                "站点 '{}' 的登录用户名与密码必须同时提供或同时省略",
                domain
            )));
        }
        if self.human_delay_min < 0.0 || self.human_delay_min > self.human_delay_max {
            return Err(AppError::Config(format!(
                "站点 '{}' 的 human_delay_min ({}) 必须非负且不大于 human_delay_max ({})",
                domain, self.human_delay_min, self.human_delay_max
            )));
        }
        let max_delay = constants::pacing::MAX_DELAY_SECS as f64;
        for (name, value) in [
            ("human_delay_min", self.human_delay_min),
            ("human_delay_max", self.human_delay_max),
            ("wait_after_login", self.wait_after_login),
        ] {
            if !value.is_finite() || value > max_delay {
                return Err(AppError::Config(format!(
                    "站点 '{}' 的 {} ({}) 不能超过 {} 秒",
                    domain, name, value, max_delay
                )));
            }
        }
        if has_user
            && (self.login_username_field.is_empty()
                || self.login_password_field.is_empty()
                || self.login_submit_button.is_empty())
        {
            return Err(AppError::Config(format!(
                "站点 '{}' 配置了凭据，但缺少登录表单选择器",
                domain
            )));
        }
        Ok(())
    }
}

/// 配置文件的原始结构，所有字段都有默认值。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub sites: BTreeMap<String, SiteProfile>,
    pub output_directory: PathBuf,
    pub nordvpn_enabled: bool,
    /// 秒
    pub ip_rotation_interval_min: u64,
    /// 秒
    pub ip_rotation_interval_max: u64,
    pub user_agents: Vec<String>,
    pub headless: bool,
    /// 单次外部调用超时 (秒)
    pub timeout: u64,
    /// 实际下载传输的超时 (秒)
    pub download_timeout: u64,
    pub concurrent_downloads: usize,
    pub retry_attempts: u32,
    pub max_height: u32,
    pub vpn_countries: Vec<String>,
    pub vpn_binary: String,
    pub ytdlp_binary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            sites: BTreeMap::new(),
            output_directory: PathBuf::from(constants::DEFAULT_SAVE_DIR),
            nordvpn_enabled: true,
            ip_rotation_interval_min: constants::vpn::DEFAULT_INTERVAL_MIN_SECS,
            ip_rotation_interval_max: constants::vpn::DEFAULT_INTERVAL_MAX_SECS,
            user_agents: strings(&constants::USER_AGENTS),
            headless: true,
            timeout: 30,
            download_timeout: constants::ytdlp::DOWNLOAD_TIMEOUT_SECS,
            concurrent_downloads: 3,
            retry_attempts: 3,
            max_height: constants::DEFAULT_MAX_HEIGHT,
            vpn_countries: strings(&constants::vpn::DEFAULT_COUNTRIES),
            vpn_binary: constants::vpn::DEFAULT_BINARY.into(),
            ytdlp_binary: constants::ytdlp::DEFAULT_BINARY.into(),
            identity_endpoint: Some(constants::vpn::DEFAULT_IDENTITY_ENDPOINT.into()),
            history_file: None,
        }
    }
}

impl ExternalConfig {
    /// `--create-config` 写出的示例配置，带一个站点配方
    pub fn example() -> Self {
        let site = SiteProfile {
            video_button: strings(&[".play-button", "button[data-action='play']", ".video-thumbnail"]),
            download_link: strings(&["a[href*='.mp4']", "a[download]", "video source"]),
            login_username: Some("user@example.com".into()),
            login_password: Some("change-me".into()),
            login_url: Some("https://example-video-site.com/login".into()),
            ..SiteProfile::default()
        };
        Self {
            sites: BTreeMap::from([("example-video-site.com".to_string(), site)]),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.ip_rotation_interval_min > self.ip_rotation_interval_max {
            return Err(AppError::Config(format!(
                "ip_rotation_interval_min ({}) 不能大于 ip_rotation_interval_max ({})",
                self.ip_rotation_interval_min, self.ip_rotation_interval_max
            )));
        }
        if self.concurrent_downloads == 0 {
            return Err(AppError::Config("concurrent_downloads 必须至少为 1".into()));
        }
        if self.timeout == 0 || self.download_timeout == 0 {
            return Err(AppError::Config("timeout 与 download_timeout 必须大于 0".into()));
        }
        let max_timeout = constants::MAX_TIMEOUT_SECS;
        if self.timeout > max_timeout || self.download_timeout > max_timeout {
            return Err(AppError::Config(format!(
                "timeout 与 download_timeout 不能超过 {} 秒",
                max_timeout
            )));
        }
        if self.ip_rotation_interval_max > constants::vpn::MAX_INTERVAL_SECS {
            return Err(AppError::Config(format!(
                "ip_rotation_interval_max 不能超过 {} 秒",
                constants::vpn::MAX_INTERVAL_SECS
            )));
        }
        if self.nordvpn_enabled && self.vpn_countries.is_empty() {
            return Err(AppError::Config("启用 VPN 时 vpn_countries 不能为空".into()));
        }
        for (domain, site) in &self.sites {
            site.validate(domain)?;
        }
        Ok(())
    }
}

/// VPN 轮换相关的设置
#[derive(Debug, Clone)]
pub struct VpnSettings {
    pub enabled: bool,
    pub binary: String,
    pub countries: Vec<String>,
    pub interval_min: Duration,
    pub interval_max: Duration,
    pub identity_endpoint: Option<String>,
}

/// 运行期间只读共享的全局策略。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sites: HashMap<String, SiteProfile>,
    pub output_dir: PathBuf,
    pub vpn: VpnSettings,
    pub user_agents: Vec<String>,
    pub headless: bool,
    pub timeout: Duration,
    pub download_timeout: Duration,
    pub max_workers: usize,
    pub max_retries: u32,
    pub max_height: u32,
    pub ytdlp_binary: String,
    pub history_file: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let mut external_config = load_or_create_external_config(args.config.as_deref())?;

        if let Some(output) = &args.output {
            external_config.output_directory = output.clone();
        }
        if args.no_vpn {
            external_config.nordvpn_enabled = false;
        }
        if args.headed {
            external_config.headless = false;
        }
        if let Some(workers) = args.workers {
            external_config.concurrent_downloads = workers;
        }
        if let Some(retries) = args.retries {
            external_config.retry_attempts = retries;
        }
        if let Some(height) = args.max_height {
            external_config.max_height = height;
        }
        if let Some(history) = &args.history {
            external_config.history_file = Some(history.clone());
        }

        Self::from_external(external_config)
    }

    pub fn from_external(external_config: ExternalConfig) -> AppResult<Self> {
        external_config.validate()?;

        let sites = external_config
            .sites
            .into_iter()
            .map(|(domain, profile)| {
                let key = domain.trim().to_lowercase();
                let key = key.strip_prefix("www.").map(str::to_string).unwrap_or(key);
                (key, profile)
            })
            .collect();

        let user_agents = if external_config.user_agents.is_empty() {
            strings(&constants::USER_AGENTS)
        } else {
            external_config.user_agents
        };

        Ok(Self {
            sites,
            output_dir: external_config.output_directory,
            vpn: VpnSettings {
                enabled: external_config.nordvpn_enabled,
                binary: external_config.vpn_binary,
                countries: external_config.vpn_countries,
                interval_min: Duration::from_secs(external_config.ip_rotation_interval_min),
                interval_max: Duration::from_secs(external_config.ip_rotation_interval_max),
                identity_endpoint: external_config.identity_endpoint,
            },
            user_agents,
            headless: external_config.headless,
            timeout: Duration::from_secs(external_config.timeout),
            download_timeout: Duration::from_secs(external_config.download_timeout),
            max_workers: external_config.concurrent_downloads,
            max_retries: external_config.retry_attempts,
            max_height: external_config.max_height,
            ytdlp_binary: external_config.ytdlp_binary,
            history_file: external_config.history_file,
        })
    }

    /// 按链接的域名查找站点配方
    pub fn site_profile(&self, url: &str) -> Option<&SiteProfile> {
        self.sites.get(&utils::domain_of(url))
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for AppConfig {
    fn default() -> Self {
        let external = ExternalConfig {
            nordvpn_enabled: false,
            identity_endpoint: None,
            ..ExternalConfig::default()
        };
        // 默认配置总是合法的
        Self::from_external(external).unwrap_or_else(|e| panic!("default config invalid: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_profile_accepts_string_or_list() {
        let json = r#"{
            "video_button": ".single-button",
            "download_link": ["a[href*='.mp4']", "a[download]"],
            "human_delay_min": 0.1,
            "human_delay_max": 0.2
        }"#;
        let profile: SiteProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.video_button, vec![".single-button".to_string()]);
        assert_eq!(profile.download_link.len(), 2);
        assert_eq!(profile.login_submit_button.len(), 2);
        assert!(profile.credentials().is_none());
    }

    #[test]
    fn test_external_defaults_and_unknown_keys() {
        let json = r#"{ "output_directory": "./test_downloads", "log_level": "DEBUG" }"#;
        let config: ExternalConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.output_directory, PathBuf::from("./test_downloads"));
        assert!(config.nordvpn_enabled);
        assert!(config.headless);
        assert_eq!(config.concurrent_downloads, 3);
        assert_eq!(config.retry_attempts, 3);
        assert!(!config.user_agents.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_policies() {
        let bad_interval = ExternalConfig {
            ip_rotation_interval_min: 900,
            ip_rotation_interval_max: 300,
            ..ExternalConfig::default()
        };
        assert!(matches!(bad_interval.validate(), Err(AppError::Config(_))));

        let zero_workers = ExternalConfig {
            concurrent_downloads: 0,
            ..ExternalConfig::default()
        };
        assert!(zero_workers.validate().is_err());

        let mut half_credentials = ExternalConfig::default();
        half_credentials.sites.insert(
            "site.com".into(),
            SiteProfile {
                login_username: Some("me".into()),
                ..SiteProfile::default()
            },
        );
        assert!(half_credentials.validate().is_err());

        assert!(ExternalConfig::example().validate().is_ok());
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let huge_wait = SiteProfile {
            wait_after_login: 1e20,
            ..SiteProfile::default()
        };
        assert!(matches!(huge_wait.validate("site.com"), Err(AppError::Config(_))));
        // 即使绕过校验，换算也不会 panic
        assert_eq!(huge_wait.wait_after_login(), constants::pacing::MAX_DELAY);

        let huge_delay = SiteProfile {
            human_delay_max: 1e300,
            ..SiteProfile::default()
        };
        assert!(huge_delay.validate("site.com").is_err());

        let huge_timeout = ExternalConfig {
            timeout: u64::MAX,
            ..ExternalConfig::default()
        };
        assert!(huge_timeout.validate().is_err());

        let huge_interval = ExternalConfig {
            ip_rotation_interval_max: u64::MAX,
            ..ExternalConfig::default()
        };
        assert!(huge_interval.validate().is_err());

        assert!(SiteProfile::default().validate("site.com").is_ok());
    }

    #[test]
    fn test_site_lookup_strips_www() {
        let mut external = ExternalConfig::default();
        external.sites.insert("www.Test-Site.com".into(), SiteProfile::default());
        let config = AppConfig::from_external(external).unwrap();
        assert!(config.site_profile("https://test-site.com/video/1").is_some());
        assert!(config.site_profile("https://www.test-site.com/video/1").is_some());
        assert!(config.site_profile("https://other.com/").is_none());
    }
}
