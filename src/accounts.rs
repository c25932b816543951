//! Per-account settings storage.
//!
//! Persists account settings as a JSON object keyed by session name:
//!
//! ```json
//! { "alice": { "user_agent": "...", "proxy": "socks5://...", "handshake_command": "..." } }
//! ```
//!
//! Generated user agents and rotated proxies are written back so they stay
//! stable across restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::api::headers::generate_user_agent;
use crate::telegram::CommandTelegram;

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("Failed to access accounts file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed accounts file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),
}

/// Settings for one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Proxy URL the account is routed through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Static web-app init data (or a web-view URL carrying it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_data: Option<String>,
    /// Shell command printing fresh init data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handshake_command: Option<String>,
    /// Shell command joining the channel passed as `$1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_command: Option<String>,
}

impl AccountConfig {
    /// Telegram adapter configured from this account.
    pub fn telegram(&self) -> CommandTelegram {
        CommandTelegram {
            init_data: self.init_data.clone(),
            handshake_command: self.handshake_command.clone(),
            join_command: self.join_command.clone(),
        }
    }
}

/// In-memory account store with disk persistence.
#[derive(Debug)]
pub struct AccountsStore {
    accounts: RwLock<BTreeMap<String, AccountConfig>>,
    storage_path: PathBuf,
}

impl AccountsStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub async fn load(path: &Path) -> Result<Self, AccountsError> {
        let accounts = if path.exists() {
            let accounts = Self::load_from_path(path)?;
            tracing::info!("Loaded {} account(s) from {}", accounts.len(), path.display());
            accounts
        } else {
            tracing::warn!("No accounts file found at {}", path.display());
            BTreeMap::new()
        };
        Ok(Self {
            accounts: RwLock::new(accounts),
            storage_path: path.to_path_buf(),
        })
    }

    fn load_from_path(path: &Path) -> Result<BTreeMap<String, AccountConfig>, AccountsError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn save_to_disk(&self) -> Result<(), AccountsError> {
        let accounts = self.accounts.read().await;

        if let Some(parent) = self.storage_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_string_pretty(&*accounts)?;
        std::fs::write(&self.storage_path, contents)?;
        tracing::debug!("Saved accounts to {}", self.storage_path.display());
        Ok(())
    }

    /// Session names, sorted.
    pub async fn names(&self) -> Vec<String> {
        self.accounts.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<AccountConfig> {
        self.accounts.read().await.get(name).cloned()
    }

    /// Return the account's user agent, generating and persisting one if
    /// the account has none yet.
    pub async fn ensure_user_agent(&self, name: &str) -> Result<String, AccountsError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(name)
            .ok_or_else(|| AccountsError::UnknownAccount(name.to_string()))?;
        if let Some(ua) = account.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
            return Ok(ua.to_string());
        }
        let ua = generate_user_agent();
        account.user_agent = Some(ua.clone());
        drop(accounts);
        self.save_to_disk().await?;
        tracing::info!(account = %name, "Generated user agent");
        Ok(ua)
    }

    /// Record the account's proxy and persist it.
    pub async fn set_proxy(&self, name: &str, proxy: Option<String>) -> Result<(), AccountsError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(name)
            .ok_or_else(|| AccountsError::UnknownAccount(name.to_string()))?;
        if account.proxy == proxy {
            return Ok(());
        }
        account.proxy = proxy;
        drop(accounts); // Release lock before saving
        self.save_to_disk().await
    }
}

pub type SharedAccountsStore = Arc<AccountsStore>;

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("accounts_config.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_accounts_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"zoe": {}, "alice": {"proxy": "http://p:1"}}"#);
        let store = AccountsStore::load(&path).await.unwrap();
        assert_eq!(store.names().await, vec!["alice".to_string(), "zoe".to_string()]);
        assert_eq!(store.get("alice").await.unwrap().proxy.as_deref(), Some("http://p:1"));
    }

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountsStore::load(&dir.path().join("none.json")).await.unwrap();
        assert!(store.names().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "[1, 2");
        assert!(matches!(AccountsStore::load(&path).await, Err(AccountsError::Parse(_))));
    }

    #[tokio::test]
    async fn generated_user_agent_is_persisted_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"alice": {}}"#);
        let store = AccountsStore::load(&path).await.unwrap();
        let ua = store.ensure_user_agent("alice").await.unwrap();
        assert_eq!(store.ensure_user_agent("alice").await.unwrap(), ua);

        let reloaded = AccountsStore::load(&path).await.unwrap();
        assert_eq!(reloaded.get("alice").await.unwrap().user_agent, Some(ua));
    }

    #[tokio::test]
    async fn existing_user_agent_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"alice": {"user_agent": "UA/1"}}"#);
        let store = AccountsStore::load(&path).await.unwrap();
        assert_eq!(store.ensure_user_agent("alice").await.unwrap(), "UA/1");
        assert!(matches!(
            store.ensure_user_agent("bob").await,
            Err(AccountsError::UnknownAccount(_))
        ));
    }

    #[tokio::test]
    async fn rotated_proxy_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, r#"{"alice": {"proxy": "http://old:1", "join_command": "true"}}"#);
        let store = AccountsStore::load(&path).await.unwrap();
        store.set_proxy("alice", Some("http://new:2".to_string())).await.unwrap();

        let reloaded = AccountsStore::load(&path).await.unwrap();
        let alice = reloaded.get("alice").await.unwrap();
        assert_eq!(alice.proxy.as_deref(), Some("http://new:2"));
        assert_eq!(alice.telegram().join_command.as_deref(), Some("true"));
    }
}
