//! Account log events.
//!
//! Core components never format presentation themselves. They emit a
//! [`LogEvent`] (level × category × message) through an [`EventSink`]; the
//! sink decides how the event is rendered. [`TracingSink`] is the production
//! sink and maps events onto `tracing` macros with an emoji prefix per
//! category.

use std::sync::{Arc, Mutex};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    /// An operation finished the way we wanted it to.
    Success,
    Warning,
    Error,
}

/// What part of the account lifecycle an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    General,
    Login,
    Balance,
    Mission,
    Sleep,
    Proxy,
    Http,
}

impl Category {
    /// Emoji shown in front of the message by the tracing sink.
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::General => "ℹ️",
            Self::Login => "🔑",
            Self::Balance => "💎",
            Self::Mission => "🎯",
            Self::Sleep => "😴",
            Self::Proxy => "🌐",
            Self::Http => "🔍",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::General => write!(f, "general"),
            Self::Login => write!(f, "login"),
            Self::Balance => write!(f, "balance"),
            Self::Mission => write!(f, "mission"),
            Self::Sleep => write!(f, "sleep"),
            Self::Proxy => write!(f, "proxy"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// A single event emitted on behalf of one account.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub account: String,
    pub level: LogLevel,
    pub category: Category,
    pub message: String,
}

/// Destination for account log events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LogEvent);
}

/// Renders events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &LogEvent) {
        let account = event.account.as_str();
        let category = event.category;
        let emoji = category.emoji();
        let message = event.message.as_str();
        match event.level {
            LogLevel::Debug => {
                tracing::debug!(account, %category, "{} | {} {}", account, emoji, message)
            }
            LogLevel::Info => {
                tracing::info!(account, %category, "{} | {} {}", account, emoji, message)
            }
            LogLevel::Success => {
                tracing::info!(account, %category, success = true, "{} | ✅ {}", account, message)
            }
            LogLevel::Warning => {
                tracing::warn!(account, %category, "{} | ⚠️ {}", account, message)
            }
            LogLevel::Error => {
                tracing::error!(account, %category, "{} | ❌ {}", account, message)
            }
        }
    }
}

/// Collects events in memory. Used by tests to assert on what was logged.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Whether any recorded event at `level` contains `needle`.
    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Per-account logging handle: account name, sink and debug switch.
#[derive(Clone)]
pub struct AccountLog {
    account: Arc<str>,
    sink: Arc<dyn EventSink>,
    debug_enabled: bool,
}

impl AccountLog {
    pub fn new(account: impl Into<Arc<str>>, sink: Arc<dyn EventSink>, debug_enabled: bool) -> Self {
        Self {
            account: account.into(),
            sink,
            debug_enabled,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn emit(&self, level: LogLevel, category: Category, message: impl Into<String>) {
        if level == LogLevel::Debug && !self.debug_enabled {
            return;
        }
        self.sink.emit(&LogEvent {
            account: self.account.to_string(),
            level,
            category,
            message: message.into(),
        });
    }

    pub fn debug(&self, category: Category, message: impl Into<String>) {
        self.emit(LogLevel::Debug, category, message);
    }

    pub fn info(&self, category: Category, message: impl Into<String>) {
        self.emit(LogLevel::Info, category, message);
    }

    pub fn success(&self, category: Category, message: impl Into<String>) {
        self.emit(LogLevel::Success, category, message);
    }

    pub fn warn(&self, category: Category, message: impl Into<String>) {
        self.emit(LogLevel::Warning, category, message);
    }

    pub fn error(&self, category: Category, message: impl Into<String>) {
        self.emit(LogLevel::Error, category, message);
    }
}

impl std::fmt::Debug for AccountLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountLog")
            .field("account", &self.account)
            .field("debug_enabled", &self.debug_enabled)
            .finish()
    }
}

/// Format a duration in seconds as `1h 2m 3s`.
pub fn format_hms(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}h {}m {}s", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_events_are_dropped_unless_enabled() {
        let sink = Arc::new(RecordingSink::new());
        let log = AccountLog::new("acc", sink.clone(), false);
        log.debug(Category::Http, "hidden");
        log.info(Category::Mission, "shown");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "shown");
        assert_eq!(events[0].account, "acc");
    }

    #[test]
    fn debug_events_pass_when_enabled() {
        let sink = Arc::new(RecordingSink::new());
        let log = AccountLog::new("acc", sink.clone(), true);
        log.debug(Category::Http, "visible");
        assert!(sink.contains(LogLevel::Debug, "visible"));
    }

    #[test]
    fn format_hms_splits_components() {
        assert_eq!(format_hms(0), "0h 0m 0s");
        assert_eq!(format_hms(3_725), "1h 2m 5s");
        assert_eq!(format_hms(86_399), "23h 59m 59s");
    }
}
