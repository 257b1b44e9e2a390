// src/vpn/mod.rs

//! VPN 出口轮换控制器。
//!
//! 所有工作协程共享同一个 [`VpnController`]。轮换是单飞的：并发的轮换请求
//! 只会触发一次 断开 → 停顿 → 重连，其余请求得到 [`RotationOutcome::Coalesced`]。

pub mod client;

pub use client::{NordVpnCli, VpnClient};

use crate::{
    client::{ClientOptions, RobustClient},
    config::{AppConfig, VpnSettings},
    constants::{self, pacing, vpn},
    error::{AppError, AppResult},
    timing::TimingPolicy,
    utils,
};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct VpnState {
    pub enabled: bool,
    pub connected: bool,
    /// 当前连接的国家代码
    pub current_identity: Option<String>,
    pub last_rotation: Option<Instant>,
    pub public_address: Option<String>,
    pub rotations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    Disabled,
    NotDue,
    /// 已有其他请求完成了轮换
    Coalesced,
    Rotated(String),
    Failed(String),
}

pub struct VpnController {
    settings: VpnSettings,
    client: Arc<dyn VpnClient>,
    timing: Arc<TimingPolicy>,
    cancel: CancellationToken,
    identity_probe: Option<(RobustClient, String)>,
    debounce: Duration,
    state: RwLock<VpnState>,
    rotation_lock: Mutex<()>,
    last_attempt: StdMutex<Option<Instant>>,
    created_at: Instant,
}

impl VpnController {
    pub fn new(
        settings: VpnSettings,
        client: Arc<dyn VpnClient>,
        timing: Arc<TimingPolicy>,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        let identity_probe = match &settings.identity_endpoint {
            Some(endpoint) => {
                let options = ClientOptions {
                    user_agent: constants::USER_AGENTS[0].to_string(),
                    timeout: vpn::IDENTITY_PROBE_TIMEOUT,
                    max_retries: 0,
                    headers: HashMap::new(),
                    cookie_store: false,
                };
                Some((RobustClient::new(&options)?, endpoint.clone()))
            }
            None => None,
        };
        let state = VpnState {
            enabled: settings.enabled,
            ..VpnState::default()
        };
        Ok(Self {
            settings,
            client,
            timing,
            cancel,
            identity_probe,
            debounce: vpn::ROTATION_DEBOUNCE,
            state: RwLock::new(state),
            rotation_lock: Mutex::new(()),
            last_attempt: StdMutex::new(None),
            created_at: Instant::now(),
        })
    }

    /// 使用 `nordvpn` 命令行客户端构建
    pub fn from_config(
        config: &AppConfig,
        timing: Arc<TimingPolicy>,
        cancel: CancellationToken,
    ) -> AppResult<Self> {
        let client = Arc::new(NordVpnCli::new(config.vpn.binary.clone()));
        Self::new(config.vpn.clone(), client, timing, cancel)
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn read_state(&self) -> RwLockReadGuard<'_, VpnState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, VpnState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }

    fn last_attempt(&self) -> Option<Instant> {
        *self.last_attempt.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn mark_attempt(&self) {
        *self.last_attempt.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
    }

    pub fn snapshot(&self) -> VpnState {
        self.read_state().clone()
    }

    /// 连接到列表中随机一个国家，最多尝试 3 次。失败不会中断批处理。
    pub async fn connect(&self, countries: &[String]) -> bool {
        if !self.settings.enabled {
            info!("VPN 已禁用，跳过连接");
            return true;
        }
        let candidates = if countries.is_empty() { &self.settings.countries[..] } else { countries };
        for attempt in 1..=vpn::CONNECT_ATTEMPTS {
            let Some(country) = self.timing.choose(candidates) else {
                warn!("没有可用的 VPN 国家");
                return false;
            };
            match self.try_connect(country).await {
                Ok(()) => {
                    info!("VPN 已连接: {}", country);
                    return true;
                }
                Err(e) if e.is_cancelled() => return false,
                Err(e) => warn!(
                    "VPN 连接 {} 失败 (第 {}/{} 次): {}",
                    country,
                    attempt,
                    vpn::CONNECT_ATTEMPTS,
                    e
                ),
            }
        }
        error!("VPN 连接在 {} 次尝试后仍失败", vpn::CONNECT_ATTEMPTS);
        false
    }

    async fn try_connect(&self, country: &str) -> AppResult<()> {
        utils::guarded(
            &self.cancel,
            vpn::CONNECT_TIMEOUT,
            "VPN 连接",
            self.client.connect(country),
        )
        .await?;
        {
            let mut state = self.write_state();
            state.connected = true;
            state.current_identity = Some(country.to_string());
            state.public_address = None;
            state.last_rotation = Some(Instant::now());
        }
        self.timing.pause(pacing::SETTLE_AFTER_CONNECT, &self.cancel).await?;
        if let Some(address) = self.current_public_identity().await {
            info!("当前出口 IP: {}", address);
        }
        Ok(())
    }

    /// 断开连接。可重复调用；关闭阶段同样可用，不受取消信号影响。
    pub async fn disconnect(&self) {
        if !self.settings.enabled || !self.read_state().connected {
            return;
        }
        let never = CancellationToken::new();
        match utils::guarded(
            &never,
            vpn::DISCONNECT_TIMEOUT,
            "VPN 断开",
            self.client.disconnect(),
        )
        .await
        {
            Ok(()) => info!("VPN 已断开"),
            Err(e) => warn!("断开 VPN 失败: {}", e),
        }
        self.mark_down(true);
    }

    /// 连接断开后出口地址不再可信，一并清除
    fn mark_down(&self, forget_identity: bool) {
        let mut state = self.write_state();
        state.connected = false;
        state.public_address = None;
        if forget_identity {
            state.current_identity = None;
        }
    }

    fn is_due(&self) -> bool {
        let anchor = {
            let last_rotation = self.read_state().last_rotation;
            match (last_rotation, self.last_attempt()) {
                (Some(a), Some(b)) => a.max(b),
                (a, b) => a.or(b).unwrap_or(self.created_at),
            }
        };
        let interval = self
            .timing
            .sample_interval(self.settings.interval_min, self.settings.interval_max);
        anchor.elapsed() >= interval
    }

    /// 在到期 (或 `force`) 时轮换出口。并发调用只会执行一次轮换。
    pub async fn rotate_if_due(&self, force: bool) -> RotationOutcome {
        if !self.settings.enabled {
            return RotationOutcome::Disabled;
        }
        if !force && !self.is_due() {
            return RotationOutcome::NotDue;
        }

        let requested_at = Instant::now();
        let _guard = self.rotation_lock.lock().await;

        if let Some(last) = self.last_attempt() {
            if last >= requested_at || last.elapsed() < self.debounce {
                debug!("已有轮换刚刚完成，合并本次请求");
                return RotationOutcome::Coalesced;
            }
        }
        if !force && !self.is_due() {
            return RotationOutcome::NotDue;
        }

        let outcome = self.perform_rotation().await;
        self.mark_attempt();
        outcome
    }

    fn pick_country(&self, previous: Option<&str>) -> Option<String> {
        let others: Vec<String> = self
            .settings
            .countries
            .iter()
            .filter(|c| Some(c.as_str()) != previous)
            .cloned()
            .collect();
        let pool = if others.is_empty() { &self.settings.countries } else { &others };
        self.timing.choose(pool).cloned()
    }

    async fn perform_rotation(&self) -> RotationOutcome {
        let previous = self.read_state().current_identity.clone();
        info!("开始轮换 IP (当前: {})", previous.as_deref().unwrap_or("无"));

        let mut last_error = String::from("没有可用的 VPN 国家");
        for attempt in 1..=vpn::CONNECT_ATTEMPTS {
            if let Err(e) = utils::guarded(
                &self.cancel,
                vpn::DISCONNECT_TIMEOUT,
                "VPN 断开",
                self.client.disconnect(),
            )
            .await
            {
                if e.is_cancelled() {
                    return RotationOutcome::Failed(e.to_string());
                }
                warn!("轮换前断开 VPN 失败: {}", e);
            }
            self.mark_down(false);

            if let Err(e) = self.timing.pause(pacing::PAUSE_BEFORE_RECONNECT, &self.cancel).await {
                return RotationOutcome::Failed(e.to_string());
            }

            let Some(country) = self.pick_country(previous.as_deref()) else {
                break;
            };
            match self.try_connect(&country).await {
                Ok(()) => {
                    self.write_state().rotations += 1;
                    info!("IP 轮换完成: {} -> {}", previous.as_deref().unwrap_or("无"), country);
                    return RotationOutcome::Rotated(country);
                }
                Err(AppError::Cancelled) => {
                    return RotationOutcome::Failed(AppError::Cancelled.to_string());
                }
                Err(e) => {
                    warn!(
                        "轮换连接 {} 失败 (第 {}/{} 次): {}",
                        country,
                        attempt,
                        vpn::CONNECT_ATTEMPTS,
                        e
                    );
                    last_error = e.to_string();
                }
            }
        }

        self.mark_down(true);
        error!("IP 轮换失败，将使用当前网络继续: {}", last_error);
        RotationOutcome::Failed(last_error)
    }

    /// 通过探测接口查询当前公网出口地址
    pub async fn current_public_identity(&self) -> Option<String> {
        let (client, endpoint) = self.identity_probe.as_ref()?;
        match utils::guarded(
            &self.cancel,
            vpn::IDENTITY_PROBE_TIMEOUT,
            "出口 IP 查询",
            client.fetch_json(endpoint.as_str()),
        )
        .await
        {
            Ok(value) => {
                let address = value.get("origin").and_then(Value::as_str).map(str::to_string);
                if let Some(addr) = &address {
                    self.write_state().public_address = Some(addr.clone());
                }
                address
            }
            Err(e) => {
                debug!("查询出口 IP 失败: {}", e);
                None
            }
        }
    }
}
