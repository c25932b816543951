//! Proxy health checks and rotation.
//!
//! Each proxy is probed by fetching a check URL through it. Failed proxies
//! go into a cooldown that grows exponentially with consecutive failures, so
//! a dead proxy is not re-probed on every cycle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ProxyPool: Send + Sync {
    /// Whether `proxy` currently works.
    async fn is_usable(&self, proxy: &str) -> bool;

    /// First working proxy other than `current`.
    async fn find_usable(&self, current: Option<&str>) -> Option<String>;
}

/// Health state for one proxy.
#[derive(Debug, Clone, Default)]
pub struct ProxyHealth {
    /// When the cooldown expires (None = healthy).
    pub cooldown_until: Option<Instant>,
    /// Number of consecutive failed probes.
    pub consecutive_failures: u32,
}

impl ProxyHealth {
    pub fn is_in_cooldown(&self) -> bool {
        self.cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Cooldown after the first failure.
    pub base_delay: Duration,
    /// Maximum cooldown.
    pub max_delay: Duration,
    /// Multiplier per consecutive failure.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(1800),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Cooldown for the given number of previous consecutive failures.
    pub fn cooldown_for(&self, consecutive_failures: u32) -> Duration {
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(consecutive_failures as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Proxy pool that probes proxies over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProxyPool {
    check_url: String,
    proxies: Vec<String>,
    health: Arc<RwLock<HashMap<String, ProxyHealth>>>,
    backoff: BackoffConfig,
}

impl HttpProxyPool {
    pub fn new(check_url: impl Into<String>, proxies: Vec<String>) -> Self {
        Self::with_backoff(check_url, proxies, BackoffConfig::default())
    }

    pub fn with_backoff(check_url: impl Into<String>, proxies: Vec<String>, backoff: BackoffConfig) -> Self {
        Self {
            check_url: check_url.into(),
            proxies,
            health: Arc::new(RwLock::new(HashMap::new())),
            backoff,
        }
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }

    /// Whether `proxy` is cooling down after failed probes.
    pub async fn in_cooldown(&self, proxy: &str) -> bool {
        self.health
            .read()
            .await
            .get(proxy)
            .map(ProxyHealth::is_in_cooldown)
            .unwrap_or(false)
    }

    async fn record_success(&self, proxy: &str) {
        let mut health = self.health.write().await;
        let entry = health.entry(proxy.to_string()).or_default();
        entry.consecutive_failures = 0;
        entry.cooldown_until = None;
    }

    async fn record_failure(&self, proxy: &str, reason: &str) {
        let mut health = self.health.write().await;
        let entry = health.entry(proxy.to_string()).or_default();
        let cooldown = self.backoff.cooldown_for(entry.consecutive_failures);
        entry.consecutive_failures += 1;
        entry.cooldown_until = Some(Instant::now() + cooldown);

        tracing::info!(
            proxy = %proxy,
            consecutive_failures = entry.consecutive_failures,
            cooldown_secs = cooldown.as_secs_f64(),
            "Proxy placed in cooldown: {}",
            reason
        );
    }

    async fn probe(&self, proxy: &str) -> Result<(), String> {
        let proxy_cfg = reqwest::Proxy::all(proxy).map_err(|e| e.to_string())?;
        let client = reqwest::Client::builder()
            .proxy(proxy_cfg)
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;
        let response = client
            .get(&self.check_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("check returned status {}", response.status()))
        }
    }
}

#[async_trait]
impl ProxyPool for HttpProxyPool {
    async fn is_usable(&self, proxy: &str) -> bool {
        if self.in_cooldown(proxy).await {
            tracing::debug!(proxy = %proxy, "Proxy still in cooldown");
            return false;
        }
        match self.probe(proxy).await {
            Ok(()) => {
                self.record_success(proxy).await;
                true
            }
            Err(reason) => {
                self.record_failure(proxy, &reason).await;
                false
            }
        }
    }

    async fn find_usable(&self, current: Option<&str>) -> Option<String> {
        for proxy in &self.proxies {
            if Some(proxy.as_str()) == current {
                continue;
            }
            if self.is_usable(proxy).await {
                return Some(proxy.clone());
            }
        }
        None
    }
}

/// Read a proxy list: one URL per line, blank lines and `#` comments skipped.
pub fn load_proxies(path: &Path) -> Result<Vec<String>, std::io::Error> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DEAD: &str = "http://127.0.0.1:1";
    const CHECK_URL: &str = "http://proxy-check.test/ip";

    #[test]
    fn cooldown_grows_and_caps() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.cooldown_for(0), Duration::from_secs(60));
        assert_eq!(backoff.cooldown_for(1), Duration::from_secs(120));
        assert_eq!(backoff.cooldown_for(10), Duration::from_secs(1800));
    }

    #[test]
    fn proxy_list_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.txt");
        std::fs::write(&path, "# pool\nhttp://a:1\n\n  socks5://b:2  \n").unwrap();
        assert_eq!(
            load_proxies(&path).unwrap(),
            vec!["http://a:1".to_string(), "socks5://b:2".to_string()]
        );
    }

    #[tokio::test]
    async fn dead_proxy_enters_cooldown() {
        let pool = HttpProxyPool::new(CHECK_URL, vec![DEAD.to_string()]);
        assert!(!pool.is_usable(DEAD).await);
        assert!(pool.in_cooldown(DEAD).await);
        assert!(!pool.is_usable(DEAD).await);
    }

    #[tokio::test]
    async fn find_usable_skips_current_and_dead() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"origin\":\"1.2.3.4\"}"))
            .mount(&server)
            .await;

        let current = "http://127.0.0.1:2".to_string();
        let pool = HttpProxyPool::new(
            CHECK_URL,
            vec![DEAD.to_string(), current.clone(), server.uri()],
        );
        assert_eq!(pool.find_usable(Some(&current)).await, Some(server.uri()));
        assert!(pool.in_cooldown(DEAD).await);
        assert!(!pool.in_cooldown(&current).await);
    }

    #[tokio::test]
    async fn empty_pool_has_nothing_usable() {
        let pool = HttpProxyPool::new(CHECK_URL, Vec::new());
        assert_eq!(pool.find_usable(None).await, None);
    }
}
