//! Telegram-side collaborator: handshake tokens and channel joins.
//!
//! The scheduler only sees the [`TelegramSession`] trait. [`CommandTelegram`]
//! is the adapter the binary uses: init data comes from the account config or
//! from an external command, and joins are delegated to another command.

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Telegram bot the game runs under.
pub const APP_ID: &str = "giftopia_gamebot";
/// Web-app entry path.
pub const ENTRY_PATH: &str = "start";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("User is unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

#[async_trait]
pub trait TelegramSession: Send + Sync {
    /// Web-app init data for `app_id`/`entry_path`. `Ok(None)` means nothing
    /// could be obtained this time.
    async fn handshake_token(
        &self,
        app_id: &str,
        entry_path: &str,
    ) -> Result<Option<String>, HandshakeError>;

    /// Join (and mute) the channel or chat behind `locator`.
    async fn join_channel(&self, locator: &str) -> anyhow::Result<()>;
}

/// Adapter backed by static init data and external commands.
///
/// `handshake_command` runs under `sh -c` with `TG_APP` and `TG_PATH` set; its
/// stdout is either raw init data or a web-view URL carrying `tgWebAppData`.
/// `join_command` runs under `sh -c` with the target passed as `$1`.
#[derive(Debug, Clone, Default)]
pub struct CommandTelegram {
    pub init_data: Option<String>,
    pub handshake_command: Option<String>,
    pub join_command: Option<String>,
}

#[async_trait]
impl TelegramSession for CommandTelegram {
    async fn handshake_token(
        &self,
        app_id: &str,
        entry_path: &str,
    ) -> Result<Option<String>, HandshakeError> {
        if let Some(data) = self.init_data.as_deref().filter(|d| !d.trim().is_empty()) {
            return Ok(Some(extract_init_data(data)));
        }
        let Some(cmd) = &self.handshake_command else {
            return Ok(None);
        };

        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .env("TG_APP", app_id)
            .env("TG_PATH", entry_path)
            .output()
            .await
            .map_err(|e| HandshakeError::InvalidSession(format!("failed to run handshake command: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let detail = format!("{} {}", stdout.trim(), stderr.trim());
            if detail.to_lowercase().contains("unauthorized") {
                return Err(HandshakeError::Unauthorized(detail.trim().to_string()));
            }
            return Err(HandshakeError::InvalidSession(format!(
                "handshake command exited with {}: {}",
                output.status,
                detail.trim()
            )));
        }

        let raw = stdout.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(extract_init_data(raw)))
    }

    async fn join_channel(&self, locator: &str) -> anyhow::Result<()> {
        let cmd = self
            .join_command
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no join command configured"))?;

        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .arg("giftopia-join")
            .arg(locator)
            .output()
            .await?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "join command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// Pull `tgWebAppData` out of a web-view URL and percent-decode it. Anything
/// without that marker is returned unchanged.
pub fn extract_init_data(raw: &str) -> String {
    let Some((_, rest)) = raw.split_once("tgWebAppData=") else {
        return raw.to_string();
    };
    let encoded = rest
        .split_once("&tgWebAppVersion")
        .map(|(data, _)| data)
        .unwrap_or(rest);
    match urlencoding::decode(encoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => encoded.to_string(),
    }
}
