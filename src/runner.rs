//! Per-account run loop.
//!
//! Sets up the account's session and client, waits out a random start
//! delay, then drives [`MissionScheduler::run_cycle`] forever. Only a
//! session-fatal error ends the loop.

use std::sync::Arc;

use crate::accounts::{AccountsError, SharedAccountsStore};
use crate::api::GameClient;
use crate::config::Config;
use crate::error::BotResult;
use crate::events::{format_hms, AccountLog, Category, EventSink};
use crate::proxy::ProxyPool;
use crate::scheduler::MissionScheduler;
use crate::session::Session;

/// Locale fetched once before the first cycle.
const WARMUP_LOCALE: &str = "ru";

/// Run one account until its session becomes unusable.
pub async fn run_account(
    name: String,
    store: SharedAccountsStore,
    config: Arc<Config>,
    proxies: Option<Arc<dyn ProxyPool>>,
    sink: Arc<dyn EventSink>,
) -> BotResult<()> {
    let log = AccountLog::new(name.as_str(), sink, config.debug_logging);

    let mut scheduler = build_scheduler(&name, &store, &config, log.clone()).await?;

    let delay = config.session_start_delay.sample(&mut rand::thread_rng());
    if !delay.is_zero() {
        log.info(
            Category::General,
            format!("Starting in {}", format_hms(delay.as_secs())),
        );
        tokio::time::sleep(delay).await;
    }

    if scheduler
        .client()
        .translation(scheduler.session(), WARMUP_LOCALE)
        .await
        .is_some()
    {
        log.debug(Category::General, "Loaded translations");
    }

    loop {
        if let Some(pool) = proxies.as_deref() {
            if !ensure_proxy(&mut scheduler, pool, &store).await {
                let wait = config.schedule.no_proxy_backoff;
                log.warn(
                    Category::Proxy,
                    format!("No working proxy, retrying in {}", format_hms(wait.as_secs())),
                );
                tokio::time::sleep(wait).await;
                continue;
            }
        }

        match scheduler.run_cycle().await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                log.error(Category::General, format!("Stopping account: {}", e));
                return Err(e);
            }
            Err(e) => {
                let wait = config.schedule.error_backoff.sample(&mut rand::thread_rng());
                log.error(
                    Category::General,
                    format!("Unexpected error: {}, retrying in {}", e, format_hms(wait.as_secs())),
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

/// Build the account's scheduler from its stored settings.
///
/// The account's proxy is always used for game traffic; `USE_PROXY` only
/// turns on health checks and rotation.
pub async fn build_scheduler(
    name: &str,
    store: &SharedAccountsStore,
    config: &Config,
    log: AccountLog,
) -> BotResult<MissionScheduler> {
    let user_agent = store.ensure_user_agent(name).await?;
    let account = store
        .get(name)
        .await
        .ok_or_else(|| AccountsError::UnknownAccount(name.to_string()))?;

    let client = GameClient::new(
        &config.base_url,
        account.proxy.as_deref(),
        config.schedule.request_jitter,
        log.clone(),
    )?;
    let session = Session::new(name, user_agent, account.proxy.clone());
    Ok(MissionScheduler::new(
        session,
        client,
        Arc::new(account.telegram()),
        config.schedule.clone(),
        log,
    ))
}

/// Keep the current proxy if it works, otherwise switch to the next usable
/// one and persist it. Returns whether the account has a working proxy.
pub async fn ensure_proxy(
    scheduler: &mut MissionScheduler,
    pool: &dyn ProxyPool,
    store: &SharedAccountsStore,
) -> bool {
    let log = scheduler.log().clone();
    let current = scheduler.session().proxy.clone();
    if let Some(proxy) = current.as_deref() {
        if pool.is_usable(proxy).await {
            log.debug(Category::Proxy, format!("Proxy {} is working", proxy));
            return true;
        }
        log.warn(Category::Proxy, format!("Proxy {} is not working", proxy));
    }

    let Some(next) = pool.find_usable(current.as_deref()).await else {
        return false;
    };
    if let Err(e) = scheduler.switch_proxy(Some(next.clone())) {
        log.error(Category::Proxy, format!("Cannot use proxy {}: {}", next, e));
        return false;
    }
    if let Err(e) = store.set_proxy(log.account(), Some(next.clone())).await {
        log.warn(Category::Proxy, format!("Failed to persist proxy: {}", e));
    }
    log.info(Category::Proxy, format!("Switched to proxy {}", next));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountsStore;
    use crate::config::{ScheduleConfig, SecondsWindow};
    use crate::events::{LogLevel, RecordingSink};
    use crate::telegram::CommandTelegram;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FakePool {
        working: Vec<&'static str>,
    }

    #[async_trait]
    impl ProxyPool for FakePool {
        async fn is_usable(&self, proxy: &str) -> bool {
            self.working.contains(&proxy)
        }

        async fn find_usable(&self, current: Option<&str>) -> Option<String> {
            self.working
                .iter()
                .find(|p| Some(**p) != current)
                .map(|p| p.to_string())
        }
    }

    async fn store_with(dir: &tempfile::TempDir, json: &str) -> SharedAccountsStore {
        let path = dir.path().join("accounts.json");
        std::fs::write(&path, json).unwrap();
        Arc::new(AccountsStore::load(&path).await.unwrap())
    }

    fn scheduler(proxy: Option<&str>, sink: Arc<RecordingSink>) -> MissionScheduler {
        let log = AccountLog::new("alice", sink, true);
        let client = GameClient::new("http://127.0.0.1:1", proxy, SecondsWindow::ZERO, log.clone()).unwrap();
        let session = Session::new("alice", "UA", proxy.map(str::to_string));
        MissionScheduler::new(
            session,
            client,
            Arc::new(CommandTelegram::default()),
            ScheduleConfig::instant(),
            log,
        )
    }

    #[tokio::test]
    async fn configured_proxy_is_used_without_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, r#"{"alice": {"proxy": "socks5://p:1"}}"#).await;
        let config = Config::new("http://127.0.0.1:1".to_string(), PathBuf::from("unused.json"));
        assert!(!config.use_proxy);

        let log = AccountLog::new("alice", Arc::new(RecordingSink::new()), true);
        let sched = build_scheduler("alice", &store, &config, log).await.unwrap();
        assert_eq!(sched.client().proxy(), Some("socks5://p:1"));
        assert_eq!(sched.session().proxy.as_deref(), Some("socks5://p:1"));
        assert!(sched.session().user_agent.len() > 10);
    }

    #[tokio::test]
    async fn account_without_proxy_goes_direct() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, r#"{"alice": {"user_agent": "UA/2"}}"#).await;
        let mut config = Config::new("http://127.0.0.1:1".to_string(), PathBuf::from("unused.json"));
        config.use_proxy = true;

        let log = AccountLog::new("alice", Arc::new(RecordingSink::new()), true);
        let sched = build_scheduler("alice", &store, &config, log).await.unwrap();
        assert_eq!(sched.client().proxy(), None);
        assert_eq!(sched.session().user_agent, "UA/2");
    }

    #[tokio::test]
    async fn working_proxy_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, r#"{"alice": {"proxy": "http://good:1"}}"#).await;
        let mut sched = scheduler(Some("http://good:1"), Arc::new(RecordingSink::new()));
        let pool = FakePool { working: vec!["http://good:1"] };
        assert!(ensure_proxy(&mut sched, &pool, &store).await);
        assert_eq!(sched.client().proxy(), Some("http://good:1"));
    }

    #[tokio::test]
    async fn dead_proxy_is_rotated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, r#"{"alice": {"proxy": "http://dead:1"}}"#).await;
        let sink = Arc::new(RecordingSink::new());
        let mut sched = scheduler(Some("http://dead:1"), sink.clone());
        let pool = FakePool { working: vec!["http://fresh:2"] };
        assert!(ensure_proxy(&mut sched, &pool, &store).await);
        assert_eq!(sched.client().proxy(), Some("http://fresh:2"));
        assert_eq!(sched.session().proxy.as_deref(), Some("http://fresh:2"));
        assert_eq!(
            store.get("alice").await.unwrap().proxy.as_deref(),
            Some("http://fresh:2")
        );
        assert!(sink.contains(LogLevel::Info, "Switched to proxy"));
    }

    #[tokio::test]
    async fn no_usable_proxy_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, r#"{"alice": {}}"#).await;
        let mut sched = scheduler(None, Arc::new(RecordingSink::new()));
        let pool = FakePool { working: vec![] };
        assert!(!ensure_proxy(&mut sched, &pool, &store).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unauthorized_session_stops_the_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            r#"{"alice": {"handshake_command": "echo 'User is unauthorized' >&2; exit 1"}}"#,
        )
        .await;
        let config = Arc::new(Config::new(
            "http://127.0.0.1:1".to_string(),
            PathBuf::from("unused.json"),
        ));
        let sink = Arc::new(RecordingSink::new());
        let err = run_account("alice".to_string(), store.clone(), config, None, sink.clone())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(sink.contains(LogLevel::Error, "Stopping account"));
        assert!(store.get("alice").await.unwrap().user_agent.is_some());
    }
}
