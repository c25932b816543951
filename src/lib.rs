//! # Giftopia Bot
//!
//! Polls the Giftopia mini-app mission API for a set of Telegram accounts
//! and completes the daily mission for each.
//!
//! This library provides:
//! - A typed client for the game API with per-account cookies, headers and proxy
//! - Login via a Telegram web-app handshake token
//! - A mission scheduler that confirms, subscribes and sleeps until the next
//!   mission opens
//! - Proxy health checks and rotation
//!
//! ## Architecture
//!
//! Each account runs its own loop of scheduler cycles:
//! 1. Log in (reusing the cached handshake token)
//! 2. Try to confirm the mission, joining a channel first when required
//! 3. Re-read the mission and compute when it opens next
//! 4. Sleep until then (plus a random extra delay), or a short idle pause
//!
//! ## Example
//!
//! ```rust,ignore
//! use giftopia_bot::{accounts::AccountsStore, config::Config, events::TracingSink, runner};
//!
//! let config = Arc::new(Config::from_env()?);
//! let store = Arc::new(AccountsStore::load(&config.accounts_path).await?);
//! runner::run_account("alice".into(), store, config, None, Arc::new(TracingSink)).await?;
//! ```

pub mod accounts;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod mission;
pub mod proxy;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod subscription;
pub mod telegram;

pub use config::Config;
pub use error::{BotError, BotResult};
pub use scheduler::MissionScheduler;
