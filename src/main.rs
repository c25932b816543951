//! Giftopia Bot - Entry Point
//!
//! Loads accounts and runs one mission loop per account until Ctrl-C.

use std::sync::Arc;

use giftopia_bot::accounts::AccountsStore;
use giftopia_bot::events::{EventSink, TracingSink};
use giftopia_bot::proxy::{load_proxies, HttpProxyPool, ProxyPool};
use giftopia_bot::{config::Config, runner};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let default_filter = if config.debug_logging {
        "giftopia_bot=debug"
    } else {
        "giftopia_bot=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Loaded configuration: base_url={}, accounts={}",
        config.base_url,
        config.accounts_path.display()
    );

    let store = Arc::new(AccountsStore::load(&config.accounts_path).await?);
    let names = store.names().await;
    if names.is_empty() {
        anyhow::bail!("No accounts configured in {}", config.accounts_path.display());
    }

    let proxies: Option<Arc<dyn ProxyPool>> = if config.use_proxy {
        let list = match &config.proxies_path {
            Some(path) => load_proxies(path)?,
            None => Vec::new(),
        };
        info!("Proxy rotation enabled with {} proxies", list.len());
        let pool: Arc<dyn ProxyPool> = Arc::new(HttpProxyPool::new(config.proxy_check_url.clone(), list));
        Some(pool)
    } else {
        None
    };

    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let config = Arc::new(config);

    let mut tasks = JoinSet::new();
    for name in names {
        info!("Starting account {}", name);
        tasks.spawn(runner::run_account(
            name,
            store.clone(),
            config.clone(),
            proxies.clone(),
            sink.clone(),
        ));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                tasks.abort_all();
                break;
            }
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => warn!("Account stopped: {}", e),
                Some(Err(e)) => error!("Account task failed: {}", e),
                None => {
                    info!("All accounts stopped");
                    break;
                }
            },
        }
    }

    Ok(())
}
