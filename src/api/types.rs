//! Game API request and response types.
//!
//! Every response is decoded once here into a typed value (or a
//! [`DecodeError`]); nothing past this module walks raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a response could not be turned into the expected payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope's `status` flag was not `true`.
    #[error("response status flag is not true")]
    Unsuccessful,

    /// The envelope was fine but the expected object was absent.
    #[error("response has no {0}")]
    Missing(&'static str),

    /// The payload did not match the expected shape.
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Body of `POST /api/auth/authenticate`.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateRequest<'a> {
    #[serde(rename = "telegramData")]
    pub telegram_data: &'a str,
}

/// Body of `POST /api/missions/check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckMissionRequest {
    pub completed: bool,
}

/// Mission status tag as reported by the game.
///
/// The tag set belongs to the upstream API, so this stays an opaque string
/// compared by value. Only the two tags the scheduler reacts to are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MissionStatus(String);

impl MissionStatus {
    pub const COMPLETED: &'static str = "COMPLETED";
    pub const ACTIVE: &'static str = "ACTIVE";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_completed(&self) -> bool {
        self.0 == Self::COMPLETED
    }

    pub fn is_active(&self) -> bool {
        self.0 == Self::ACTIVE
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The account's current mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub status: MissionStatus,
    #[serde(default)]
    pub sequence: Option<i64>,
    #[serde(default)]
    pub mission_type: Option<i64>,
    #[serde(default)]
    pub start_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub streak: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub reward: Option<Value>,
    #[serde(default, rename = "channel_url")]
    pub channel_url: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Mission {
    /// Explicit target locator, whichever of `channel_url`, `link`, `url`
    /// is first non-empty.
    pub fn locator(&self) -> Option<&str> {
        [&self.channel_url, &self.link, &self.url]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or("untitled")
    }
}

/// User record returned by the authenticate endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, rename = "firstName")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub balance: Option<Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.first_name.as_deref())
            .unwrap_or("unknown")
    }

    pub fn balance_text(&self) -> String {
        match &self.balance {
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => "n/a".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    status: Value,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn succeeded(&self) -> bool {
        self.status == Value::Bool(true)
    }
}

#[derive(Debug, Deserialize)]
struct MissionData {
    mission: Option<Mission>,
}

#[derive(Debug, Deserialize)]
struct AuthData {
    user: Option<UserProfile>,
}

/// Decode `{status: true, data: {mission: {...}}}`.
pub fn decode_mission(body: &Value) -> Result<Mission, DecodeError> {
    let envelope = Envelope::<MissionData>::deserialize(body)?;
    if !envelope.succeeded() {
        return Err(DecodeError::Unsuccessful);
    }
    envelope
        .data
        .and_then(|d| d.mission)
        .ok_or(DecodeError::Missing("data.mission"))
}

/// Decode `{status: true, data: {user: {...}}}`.
pub fn decode_user(body: &Value) -> Result<UserProfile, DecodeError> {
    let envelope = Envelope::<AuthData>::deserialize(body)?;
    if !envelope.succeeded() {
        return Err(DecodeError::Unsuccessful);
    }
    envelope
        .data
        .and_then(|d| d.user)
        .ok_or(DecodeError::Missing("data.user"))
}

/// Whether an envelope reports `status: true`, regardless of its payload.
pub fn envelope_succeeded(body: &Value) -> bool {
    body.get("status") == Some(&Value::Bool(true))
}

/// `data.auth_token` from an authenticate body, when non-empty.
pub fn body_auth_token(body: &Value) -> Option<String> {
    body.pointer("/data/auth_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
