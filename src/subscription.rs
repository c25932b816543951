//! Subscription missions: resolve the target channel, join it, confirm.

use crate::api::types::{envelope_succeeded, Mission};
use crate::api::GameClient;
use crate::events::{AccountLog, Category};
use crate::session::Session;
use crate::telegram::TelegramSession;

/// Targets used when a mission of a known sequence carries no locator.
const SEQUENCE_FALLBACKS: &[(i64, &str)] = &[
    (0, "https://t.me/GifTopiaGame"),
    (1, "https://t.me/GifTopiaChat"),
    (12, "https://t.me/giftopia_giftbot"),
];

/// Where a subscription target came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Locator carried by the mission itself.
    Explicit(String),
    /// Fixed target for the mission's sequence.
    Fallback(&'static str),
}

impl Target {
    pub fn locator(&self) -> &str {
        match self {
            Self::Explicit(url) => url,
            Self::Fallback(url) => url,
        }
    }
}

/// Resolve the channel a mission wants the account to join.
pub fn resolve_target(mission: &Mission) -> Option<Target> {
    if let Some(locator) = mission.locator() {
        return Some(Target::Explicit(locator.to_string()));
    }
    let sequence = mission.sequence?;
    SEQUENCE_FALLBACKS
        .iter()
        .find(|(seq, _)| *seq == sequence)
        .map(|&(_, url)| Target::Fallback(url))
}

/// Perform the join for `mission` and confirm completion.
///
/// Returns whether the mission was confirmed. Unresolvable targets and
/// failed joins are logged and return `false`; an already completed mission
/// returns `true` without touching Telegram.
pub async fn resolve_and_execute(
    client: &GameClient,
    session: &Session,
    telegram: &dyn TelegramSession,
    mission: &Mission,
    log: &AccountLog,
) -> bool {
    if let Ok(raw) = serde_json::to_string(mission) {
        log.debug(Category::Mission, format!("Mission data: {}", raw));
    }

    let Some(target) = resolve_target(mission) else {
        log.warn(
            Category::Mission,
            format!(
                "Could not determine a link for mission {} (sequence={})",
                mission.label(),
                mission
                    .sequence
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string())
            ),
        );
        return false;
    };

    if mission.status.is_completed() {
        log.info(Category::Mission, format!("Mission already completed: {}", mission.label()));
        return true;
    }

    let locator = target.locator();
    log.info(Category::Mission, format!("Joining {}", locator));
    if let Err(e) = telegram.join_channel(locator).await {
        log.error(Category::Mission, format!("Join failed for {}: {}", locator, e));
        return false;
    }
    log.success(Category::Mission, format!("Joined {}", locator));

    match client.check_mission(session, true).await {
        Some(body) if envelope_succeeded(&body) => {
            let reward = mission
                .reward
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            log.success(Category::Mission, format!("Mission confirmed. Reward: {}", reward));
            true
        }
        Some(body) => {
            log.error(Category::Mission, format!("Mission confirmation rejected: {}", body));
            false
        }
        None => {
            log.error(Category::Mission, "Mission confirmation request failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::MISSION_CHECK_PATH;
    use crate::api::MissionStatus;
    use crate::config::SecondsWindow;
    use crate::events::{LogLevel, RecordingSink};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingTelegram {
        joins: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TelegramSession for RecordingTelegram {
        async fn handshake_token(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<String>, crate::telegram::HandshakeError> {
            Ok(Some("init".to_string()))
        }

        async fn join_channel(&self, locator: &str) -> anyhow::Result<()> {
            self.joins.lock().unwrap().push(locator.to_string());
            if self.fail {
                anyhow::bail!("FLOOD_WAIT");
            }
            Ok(())
        }
    }

    fn mission(status: &str, sequence: Option<i64>, link: Option<&str>) -> Mission {
        Mission {
            status: MissionStatus::new(status),
            sequence,
            mission_type: None,
            start_at: None,
            expires_at: None,
            streak: None,
            title: Some("Join".to_string()),
            reward: Some(json!(50)),
            channel_url: None,
            link: link.map(str::to_string),
            url: None,
        }
    }

    fn setup(base: &str) -> (GameClient, Session, AccountLog, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let log = AccountLog::new("acc", sink.clone(), true);
        let client = GameClient::new(base, None, SecondsWindow::ZERO, log.clone()).unwrap();
        let mut session = Session::new("acc", "UA", None);
        session.auth_token = Some("tok".to_string());
        (client, session, log, sink)
    }

    #[test]
    fn explicit_locator_beats_fallback_for_every_sequence() {
        for seq in [Some(0), Some(1), Some(2), Some(12), Some(99), None] {
            let m = mission("ACTIVE", seq, Some("https://t.me/explicit"));
            assert_eq!(
                resolve_target(&m),
                Some(Target::Explicit("https://t.me/explicit".to_string()))
            );
        }
    }

    #[test]
    fn known_sequences_fall_back() {
        assert_eq!(
            resolve_target(&mission("ACTIVE", Some(0), None)),
            Some(Target::Fallback("https://t.me/GifTopiaGame"))
        );
        assert_eq!(
            resolve_target(&mission("ACTIVE", Some(1), None)),
            Some(Target::Fallback("https://t.me/GifTopiaChat"))
        );
        assert_eq!(
            resolve_target(&mission("ACTIVE", Some(12), None)),
            Some(Target::Fallback("https://t.me/giftopia_giftbot"))
        );
    }

    #[test]
    fn other_sequences_are_unresolvable() {
        for seq in [Some(2), Some(3), Some(11), Some(-1), None] {
            assert_eq!(resolve_target(&mission("ACTIVE", seq, Some("  "))), None);
        }
    }

    #[tokio::test]
    async fn joins_then_confirms() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MISSION_CHECK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"status": true, "data": {"mission": {"status": "COMPLETED"}}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let (client, session, log, sink) = setup(&server.uri());
        let tg = RecordingTelegram::default();
        let ok = resolve_and_execute(&client, &session, &tg, &mission("ACTIVE", Some(1), None), &log).await;
        assert!(ok);
        assert_eq!(*tg.joins.lock().unwrap(), vec!["https://t.me/GifTopiaChat".to_string()]);
        assert!(sink.contains(LogLevel::Success, "Reward: 50"));
    }

    #[tokio::test]
    async fn completed_mission_is_not_joined_again() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MISSION_CHECK_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, session, log, _) = setup(&server.uri());
        let tg = RecordingTelegram::default();
        let m = mission("COMPLETED", Some(1), None);
        assert!(resolve_and_execute(&client, &session, &tg, &m, &log).await);
        assert!(resolve_and_execute(&client, &session, &tg, &m, &log).await);
        assert!(tg.joins.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_join_skips_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MISSION_CHECK_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (client, session, log, sink) = setup(&server.uri());
        let tg = RecordingTelegram {
            fail: true,
            ..Default::default()
        };
        let ok = resolve_and_execute(&client, &session, &tg, &mission("ACTIVE", Some(0), None), &log).await;
        assert!(!ok);
        assert!(sink.contains(LogLevel::Error, "FLOOD_WAIT"));
    }

    #[tokio::test]
    async fn unresolvable_mission_has_no_side_effect() {
        let (client, session, log, sink) = setup("http://127.0.0.1:1");
        let tg = RecordingTelegram::default();
        let ok = resolve_and_execute(&client, &session, &tg, &mission("ACTIVE", Some(5), None), &log).await;
        assert!(!ok);
        assert!(tg.joins.lock().unwrap().is_empty());
        assert!(sink.contains(LogLevel::Warning, "sequence=5"));
    }
}
