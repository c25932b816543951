//! Configuration management for giftopia-bot.
//!
//! Configuration can be set via environment variables:
//! - `GAME_BASE_URL` - Optional. Origin of the game API. Defaults to `https://giftopia.games`.
//! - `ACCOUNTS_PATH` - Optional. Accounts JSON file. Defaults to `accounts_config.json`.
//! - `PROXIES_PATH` - Optional. Text file with one proxy URL per line.
//! - `USE_PROXY` - Optional. Check and rotate proxies before every cycle. Defaults to `false`.
//! - `DEBUG_LOGGING` - Optional. Emit debug account events. Defaults to `false`.
//! - `SESSION_START_DELAY` - Optional. Upper bound (seconds) of the random start delay. Defaults to `360`.
//! - `SLEEP_MIN` / `SLEEP_MAX` - Optional. Idle sleep window and extra delay added to
//!   schedule-based sleeps, in seconds. Defaults to `300` / `600`.
//! - `LOGIN_BACKOFF` - Optional. Seconds to wait after a failed login. Defaults to `60`.
//! - `TYPE2_WAIT_MIN` / `TYPE2_WAIT_MAX` - Optional. Wait after an unfinished type-2 mission. Defaults to `10` / `30`.
//! - `REQUEST_JITTER_MIN` / `REQUEST_JITTER_MAX` - Optional. Delay after every request. Defaults to `1` / `3`.
//! - `PROXY_CHECK_URL` - Optional. URL fetched through a proxy to probe it. Defaults to `https://httpbin.org/ip`.

use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://giftopia.games";

/// Upper bound for any configured delay: one week.
pub const MAX_DELAY_SECS: f64 = 7.0 * 24.0 * 3600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// A closed window of seconds that random delays are drawn from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondsWindow {
    pub min: f64,
    pub max: f64,
}

impl SecondsWindow {
    pub const ZERO: SecondsWindow = SecondsWindow { min: 0.0, max: 0.0 };

    /// Create a window, rejecting negative bounds, bounds above
    /// [`MAX_DELAY_SECS`] and `min > max`.
    pub fn new(min: f64, max: f64) -> Result<Self, String> {
        if !(min.is_finite() && max.is_finite()) || min < 0.0 {
            return Err(format!("window bounds must be finite and non-negative, got {}..{}", min, max));
        }
        if max > MAX_DELAY_SECS {
            return Err(format!("window maximum {} exceeds {} seconds", max, MAX_DELAY_SECS));
        }
        if min > max {
            return Err(format!("window minimum {} exceeds maximum {}", min, max));
        }
        Ok(Self { min, max })
    }

    /// Draw a delay uniformly from the window.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return Duration::from_secs_f64(self.min);
        }
        Duration::from_secs_f64(rng.gen_range(self.min..=self.max))
    }
}

/// Timing knobs for one account's scheduler and run loop.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Delay after every handled request.
    pub request_jitter: SecondsWindow,
    /// Sleep used when no schedule can be derived from the mission.
    pub idle_sleep: SecondsWindow,
    /// Added on top of a schedule-based sleep to desynchronize accounts.
    pub extra_delay: SecondsWindow,
    /// Wait after a type-2 mission that did not complete on confirmation.
    pub type2_wait: SecondsWindow,
    /// Fixed wait after a failed login.
    pub login_backoff: Duration,
    /// Schedule-based sleeps are only used above this many seconds.
    pub min_schedule_secs: i64,
    /// Backoff after an unexpected error escapes a cycle.
    pub error_backoff: SecondsWindow,
    /// Wait when proxies are enabled and none is usable.
    pub no_proxy_backoff: Duration,
    /// Mission sequence whose active missions require a subscription.
    pub subscription_sequence: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            request_jitter: SecondsWindow { min: 1.0, max: 3.0 },
            idle_sleep: SecondsWindow { min: 300.0, max: 600.0 },
            extra_delay: SecondsWindow { min: 300.0, max: 600.0 },
            type2_wait: SecondsWindow { min: 10.0, max: 30.0 },
            login_backoff: Duration::from_secs(60),
            min_schedule_secs: 60,
            error_backoff: SecondsWindow { min: 60.0, max: 120.0 },
            no_proxy_backoff: Duration::from_secs(300),
            subscription_sequence: 1,
        }
    }
}

impl ScheduleConfig {
    /// Defaults with every random window collapsed to zero and no fixed
    /// backoffs. Useful for driving cycles in tests.
    pub fn instant() -> Self {
        Self {
            request_jitter: SecondsWindow::ZERO,
            idle_sleep: SecondsWindow::ZERO,
            extra_delay: SecondsWindow::ZERO,
            type2_wait: SecondsWindow::ZERO,
            login_backoff: Duration::ZERO,
            error_backoff: SecondsWindow::ZERO,
            no_proxy_backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the game API
    pub base_url: String,

    /// Accounts JSON file
    pub accounts_path: PathBuf,

    /// Optional proxy list, one URL per line
    pub proxies_path: Option<PathBuf>,

    /// Whether proxies are checked and rotated before each cycle
    pub use_proxy: bool,

    /// Whether debug account events are emitted
    pub debug_logging: bool,

    /// Upper bound of the random per-account start delay
    pub session_start_delay: SecondsWindow,

    /// URL fetched through a proxy to decide if it is usable
    pub proxy_check_url: String,

    /// Scheduler timing
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a variable cannot be parsed,
    /// a URL is malformed, or a window has `min > max`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("GAME_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidValue("GAME_BASE_URL".to_string(), e.to_string()))?;

        let accounts_path = std::env::var("ACCOUNTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("accounts_config.json"));

        let proxies_path = std::env::var("PROXIES_PATH").ok().map(PathBuf::from);

        let use_proxy = env_bool("USE_PROXY")?.unwrap_or(false);
        let debug_logging = env_bool("DEBUG_LOGGING")?.unwrap_or(false);

        let start_delay_max = env_f64("SESSION_START_DELAY", 360.0)?;
        let session_start_delay = window("SESSION_START_DELAY", start_delay_max.min(1.0), start_delay_max)?;

        let proxy_check_url = std::env::var("PROXY_CHECK_URL")
            .unwrap_or_else(|_| "https://httpbin.org/ip".to_string());

        let defaults = ScheduleConfig::default();
        let sleep = window(
            "SLEEP_MIN/SLEEP_MAX",
            env_f64("SLEEP_MIN", defaults.idle_sleep.min)?,
            env_f64("SLEEP_MAX", defaults.idle_sleep.max)?,
        )?;
        let schedule = ScheduleConfig {
            request_jitter: window(
                "REQUEST_JITTER_MIN/REQUEST_JITTER_MAX",
                env_f64("REQUEST_JITTER_MIN", defaults.request_jitter.min)?,
                env_f64("REQUEST_JITTER_MAX", defaults.request_jitter.max)?,
            )?,
            idle_sleep: sleep,
            extra_delay: sleep,
            type2_wait: window(
                "TYPE2_WAIT_MIN/TYPE2_WAIT_MAX",
                env_f64("TYPE2_WAIT_MIN", defaults.type2_wait.min)?,
                env_f64("TYPE2_WAIT_MAX", defaults.type2_wait.max)?,
            )?,
            login_backoff: env_secs("LOGIN_BACKOFF", defaults.login_backoff)?,
            ..defaults
        };

        Ok(Self {
            base_url,
            accounts_path,
            proxies_path,
            use_proxy,
            debug_logging,
            session_start_delay,
            proxy_check_url,
            schedule,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(base_url: String, accounts_path: PathBuf) -> Self {
        Self {
            base_url,
            accounts_path,
            proxies_path: None,
            use_proxy: false,
            debug_logging: true,
            session_start_delay: SecondsWindow::ZERO,
            proxy_check_url: "https://httpbin.org/ip".to_string(),
            schedule: ScheduleConfig::instant(),
        }
    }
}

fn window(name: &str, min: f64, max: f64) -> Result<SecondsWindow, ConfigError> {
    SecondsWindow::new(min, max).map_err(|e| ConfigError::InvalidValue(name.to_string(), e))
}

fn env_f64(name: &str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse::<f64>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = env_f64(name, default.as_secs_f64())?;
    if !secs.is_finite() || !(0.0..=MAX_DELAY_SECS).contains(&secs) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("expected 0..={} seconds, got {}", MAX_DELAY_SECS, secs),
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn env_bool(name: &str) -> Result<Option<bool>, ConfigError> {
    std::env::var(name)
        .ok()
        .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue(name.to_string(), e)))
        .transpose()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
