// src/vpn/client.rs

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use tokio::process::Command;

/// VPN 命令行客户端的抽象，便于在测试中替换。
#[async_trait]
pub trait VpnClient: Send + Sync {
    async fn connect(&self, country: &str) -> AppResult<()>;
    async fn disconnect(&self) -> AppResult<()>;
}

/// 调用 `nordvpn` 命令行。超时由调用方控制，future 被丢弃时子进程会被杀掉。
pub struct NordVpnCli {
    binary: String,
}

impl NordVpnCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> AppResult<String> {
        debug!("执行 VPN 命令: {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::Vpn(format!("无法启动 '{}': {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() { stdout } else { stderr };
            Err(AppError::Vpn(format!(
                "'{} {}' 退出码 {}: {}",
                self.binary,
                args.join(" "),
                output.status.code().unwrap_or(-1),
                detail
            )))
        }
    }
}

#[async_trait]
impl VpnClient for NordVpnCli {
    async fn connect(&self, country: &str) -> AppResult<()> {
        self.run(&["connect", country]).await.map(|_| ())
    }

    async fn disconnect(&self) -> AppResult<()> {
        self.run(&["disconnect"]).await.map(|_| ())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_vpn_error() {
        let cli = NordVpnCli::new("/nonexistent/nordvpn-binary");
        assert!(matches!(cli.connect("US").await, Err(AppError::Vpn(_))));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_vpn_error() {
        // `false` 忽略参数并以非零码退出
        let cli = NordVpnCli::new("false");
        let err = cli.disconnect().await.unwrap_err();
        assert!(err.to_string().contains("退出码"));
    }

    #[tokio::test]
    async fn test_zero_exit_is_ok() {
        let cli = NordVpnCli::new("true");
        assert!(cli.connect("DE").await.is_ok());
    }
}
