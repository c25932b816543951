//! Mission state reader and wake-time computation.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::api::types::{decode_mission, Mission};
use crate::api::GameClient;
use crate::events::{format_hms, AccountLog, Category};
use crate::session::Session;

/// Outcome of deriving the next wake time from a mission.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleDecision {
    /// Mission completed; the next one opens in this many seconds.
    NextMissionIn(i64),
    /// Mission not completed and not startable yet.
    StartsIn(i64),
    /// The chosen timestamp is already in the past.
    Elapsed { field: &'static str },
    /// The chosen timestamp could not be parsed.
    Unparsable {
        field: &'static str,
        value: String,
        error: String,
    },
    /// No timestamp applies to this status.
    Undetermined,
}

impl ScheduleDecision {
    /// Seconds until the next eligible action, when known.
    pub fn seconds(&self) -> Option<i64> {
        match self {
            Self::NextMissionIn(secs) | Self::StartsIn(secs) => Some(*secs),
            _ => None,
        }
    }
}

/// Decide how long until the mission can be acted on again.
///
/// A completed mission is scheduled from `expiresAt`, anything else from
/// `startAt`. Only that one timestamp is consulted; if it is missing,
/// unparsable or not in the future the decision is undeterminable.
pub fn compute_next_wake(mission: &Mission, now: DateTime<Utc>) -> ScheduleDecision {
    let (field, value) = if mission.status.is_completed() {
        match mission.expires_at.as_deref() {
            Some(v) => ("expiresAt", v),
            None => return ScheduleDecision::Undetermined,
        }
    } else {
        match mission.start_at.as_deref() {
            Some(v) => ("startAt", v),
            None => return ScheduleDecision::Undetermined,
        }
    };

    let at = match parse_timestamp(value) {
        Ok(at) => at,
        Err(error) => {
            return ScheduleDecision::Unparsable {
                field,
                value: value.to_string(),
                error,
            }
        }
    };

    let remaining = at - now;
    if remaining.num_milliseconds() <= 0 {
        return ScheduleDecision::Elapsed { field };
    }
    let secs = remaining.num_seconds();
    if mission.status.is_completed() {
        ScheduleDecision::NextMissionIn(secs)
    } else {
        ScheduleDecision::StartsIn(secs)
    }
}

/// Parse an ISO-8601 timestamp into UTC. A trailing `Z` is read as `+00:00`;
/// explicit offsets are honoured; a timestamp without offset is taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = value.trim();
    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(base) => format!("{}+00:00", base),
        None => trimmed.to_string(),
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("{}: {}", value, e))
}

/// Fetch the current mission. Without an auth token no request is made.
pub async fn fetch_mission(client: &GameClient, session: &Session, log: &AccountLog) -> Option<Mission> {
    if !session.is_authenticated() {
        log.warn(Category::Mission, "No auth token, skipping mission status check");
        return None;
    }
    log.info(Category::Mission, "Checking mission status...");
    let body = client.mission_status(session).await?;
    match decode_mission(&body) {
        Ok(mission) => {
            log.info(
                Category::Mission,
                format!(
                    "Mission status: {}, streak: {}",
                    mission.status,
                    mission.streak.map(|s| s.to_string()).unwrap_or_else(|| "n/a".to_string())
                ),
            );
            Some(mission)
        }
        Err(e) => {
            log.warn(Category::Mission, format!("No mission data in response ({}): {}", e, body));
            None
        }
    }
}

/// Re-read the mission and turn it into a wake delay, logging the decision.
pub async fn recheck(
    client: &GameClient,
    session: &Session,
    log: &AccountLog,
) -> Option<i64> {
    let mission = fetch_mission(client, session, log).await?;
    let decision = compute_next_wake(&mission, Utc::now());
    match &decision {
        ScheduleDecision::NextMissionIn(secs) => log.info(
            Category::Mission,
            format!("Next mission available in {}", format_hms(*secs as u64)),
        ),
        ScheduleDecision::StartsIn(secs) => log.info(
            Category::Mission,
            format!("Mission becomes available in {}", format_hms(*secs as u64)),
        ),
        ScheduleDecision::Elapsed { field } => log.info(
            Category::Mission,
            format!("{} has already passed", field),
        ),
        ScheduleDecision::Unparsable { field, value, error } => log.error(
            Category::Mission,
            format!("Failed to parse {} '{}': {}", field, value, error),
        ),
        ScheduleDecision::Undetermined => log.info(
            Category::Mission,
            format!("No schedule for mission status {}", mission.status),
        ),
    }
    decision.seconds()
}
