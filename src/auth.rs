//! Login: exchange the Telegram handshake token for a game auth token.

use reqwest::StatusCode;

use crate::api::types::{body_auth_token, decode_user, DecodeError, UserProfile};
use crate::api::GameClient;
use crate::error::{BotError, BotResult};
use crate::events::{AccountLog, Category};
use crate::session::Session;
use crate::telegram::{TelegramSession, APP_ID, ENTRY_PATH};

/// Result of one login attempt that did not hit a session-fatal condition.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(UserProfile),
    Failed,
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Log in, acquiring the handshake token first if the session has none.
///
/// Safe to call every cycle. Only an unobtainable session (Telegram reports
/// the user unauthorized or the session invalid) is returned as an error;
/// every other failure is logged and reported as [`LoginOutcome::Failed`].
pub async fn login(
    client: &GameClient,
    session: &mut Session,
    telegram: &dyn TelegramSession,
    log: &AccountLog,
) -> BotResult<LoginOutcome> {
    if session.init_data.is_none() {
        match telegram.handshake_token(APP_ID, ENTRY_PATH).await {
            Ok(Some(token)) if !token.trim().is_empty() => {
                log.debug(Category::Login, format!("Received init data for {}", APP_ID));
                session.init_data = Some(token);
            }
            Ok(_) => {}
            Err(e) => {
                log.error(Category::Login, format!("Session is invalid: {}", e));
                return Err(BotError::InvalidSession(e.to_string()));
            }
        }
    }
    let Some(init_data) = session.init_data.clone() else {
        log.warn(Category::Login, "Could not obtain init data for login");
        return Ok(LoginOutcome::Failed);
    };
    log.debug(Category::Login, format!("Init data for login: {}", init_data));

    let Some(response) = client.authenticate(session, &init_data).await else {
        log.error(Category::Login, "Login request did not complete");
        return Ok(LoginOutcome::Failed);
    };

    if response.status != StatusCode::OK && response.status != StatusCode::CREATED {
        log.error(
            Category::Login,
            format!("Login failed with status {}", response.status),
        );
        if response.status == StatusCode::UNAUTHORIZED || response.status == StatusCode::FORBIDDEN {
            // Init data was rejected; fetch a fresh one next cycle.
            session.init_data = None;
        }
        return Ok(LoginOutcome::Failed);
    }

    let Some(body) = response.json() else {
        log.error(Category::Login, "Login response is not JSON");
        return Ok(LoginOutcome::Failed);
    };

    if let Some(token) = response.auth_cookie.clone() {
        log.debug(Category::Login, "auth_token received from Set-Cookie");
        session.auth_token = Some(token);
    } else if let Some(token) = body_auth_token(body) {
        log.debug(Category::Login, "auth_token received from response body");
        session.auth_token = Some(token);
    } else {
        log.warn(Category::Login, "No auth_token in login response");
    }

    match decode_user(body) {
        Ok(user) => {
            log.debug(Category::Login, "Login succeeded, user received");
            Ok(LoginOutcome::Authenticated(user))
        }
        Err(DecodeError::Missing(what)) => {
            log.error(Category::Login, format!("Login response has no {}", what));
            Ok(LoginOutcome::Failed)
        }
        Err(e) => {
            log.error(Category::Login, format!("Login unsuccessful: {}", e));
            Ok(LoginOutcome::Failed)
        }
    }
}
