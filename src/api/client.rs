//! HTTP session wrapper for the game API.
//!
//! One [`GameClient`] per account. Every call goes through [`GameClient::execute`],
//! which never returns an error: transport failures are logged and surface as
//! `None`, and every handled call is followed by a randomized jitter delay so
//! requests keep a human cadence.

use std::time::Duration;

use reqwest::header::COOKIE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::headers::default_headers;
use super::types::{AuthenticateRequest, CheckMissionRequest};
use crate::config::SecondsWindow;
use crate::error::{BotError, BotResult};
use crate::events::{AccountLog, Category};
use crate::session::Session;

pub const AUTHENTICATE_PATH: &str = "/api/auth/authenticate";
pub const MISSION_STATUS_PATH: &str = "/api/missions/user";
pub const MISSION_CHECK_PATH: &str = "/api/missions/check";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const AUTH_COOKIE: &str = "auth_token";

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    /// Body that was not valid JSON, kept for logging.
    Text(String),
}

/// A response the transport delivered, whatever its status code.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: ResponseBody,
    /// Value of an `auth_token` cookie set by this response, if any.
    pub auth_cookie: Option<String>,
}

impl RawResponse {
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(_) => None,
        }
    }

    fn body_for_log(&self) -> String {
        let text = match &self.body {
            ResponseBody::Json(v) => v.to_string(),
            ResponseBody::Text(t) => t.clone(),
        };
        truncate_for_log(&text, 500)
    }
}

/// Authenticated connection to the game for one account.
#[derive(Debug)]
pub struct GameClient {
    http: reqwest::Client,
    base_url: String,
    proxy: Option<String>,
    jitter: SecondsWindow,
    log: AccountLog,
}

impl GameClient {
    /// Create a client, optionally routed through `proxy`.
    pub fn new(
        base_url: &str,
        proxy: Option<&str>,
        jitter: SecondsWindow,
        log: AccountLog,
    ) -> BotResult<Self> {
        Ok(Self {
            http: build_http(proxy)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            proxy: proxy.map(str::to_string),
            jitter,
            log,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    /// Rebuild the transport to route through a different proxy.
    pub fn set_proxy(&mut self, proxy: Option<&str>) -> BotResult<()> {
        self.http = build_http(proxy)?;
        self.proxy = proxy.map(str::to_string);
        Ok(())
    }

    /// Send a request without a body.
    pub async fn send(&self, method: Method, path: &str, session: &Session) -> Option<RawResponse> {
        let builder = self.request(method.clone(), path, session);
        self.execute(&method, path, builder).await
    }

    /// Send a request with a JSON body.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        session: &Session,
        body: &B,
    ) -> Option<RawResponse> {
        let builder = self.request(method.clone(), path, session).json(body);
        self.execute(&method, path, builder).await
    }

    /// `POST /api/auth/authenticate`. Returns the raw response because the
    /// authenticator needs the status code and cookies.
    pub async fn authenticate(&self, session: &Session, init_data: &str) -> Option<RawResponse> {
        let body = AuthenticateRequest {
            telegram_data: init_data,
        };
        self.send_json(Method::POST, AUTHENTICATE_PATH, session, &body)
            .await
    }

    /// `GET /api/missions/user`.
    pub async fn mission_status(&self, session: &Session) -> Option<Value> {
        let response = self.send(Method::GET, MISSION_STATUS_PATH, session).await;
        self.expect_json(&Method::GET, MISSION_STATUS_PATH, response)
    }

    /// `POST /api/missions/check`.
    pub async fn check_mission(&self, session: &Session, completed: bool) -> Option<Value> {
        let body = CheckMissionRequest { completed };
        let response = self
            .send_json(Method::POST, MISSION_CHECK_PATH, session, &body)
            .await;
        self.expect_json(&Method::POST, MISSION_CHECK_PATH, response)
    }

    /// `GET /locales/{lang}/translation.json`.
    pub async fn translation(&self, session: &Session, lang: &str) -> Option<Value> {
        let path = format!("/locales/{}/translation.json", urlencoding::encode(lang));
        let response = self.send(Method::GET, &path, session).await;
        self.expect_json(&Method::GET, &path, response)
    }

    fn request(&self, method: Method, path: &str, session: &Session) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http
            .request(method, url)
            .headers(default_headers(&session.user_agent))
            .header(COOKIE, session.cookie_header())
    }

    async fn execute(&self, method: &Method, path: &str, builder: RequestBuilder) -> Option<RawResponse> {
        let result = match builder.send().await {
            Ok(response) => {
                let status = response.status();
                let auth_cookie = response
                    .cookies()
                    .find(|c| c.name() == AUTH_COOKIE && !c.value().is_empty())
                    .map(|c| c.value().to_string());
                match response.text().await {
                    Ok(text) => {
                        let body = match serde_json::from_str::<Value>(&text) {
                            Ok(v) => ResponseBody::Json(v),
                            Err(_) => ResponseBody::Text(text),
                        };
                        Some(RawResponse {
                            status,
                            body,
                            auth_cookie,
                        })
                    }
                    Err(e) => {
                        self.log.error(
                            Category::Http,
                            format!("Failed to read response body of {} {}: {}", method, path, e),
                        );
                        None
                    }
                }
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "failed"
                };
                self.log.error(
                    Category::Http,
                    format!("Request {} {} {}: {}", method, path, kind, e),
                );
                None
            }
        };
        self.jitter().await;
        result
    }

    /// Reduce a response to its JSON body, treating non-2xx and non-JSON as
    /// no result.
    fn expect_json(&self, method: &Method, path: &str, response: Option<RawResponse>) -> Option<Value> {
        let response = response?;
        if !response.status.is_success() {
            self.log.error(
                Category::Http,
                format!("Request {} {} returned status {}", method, path, response.status),
            );
            self.log
                .debug(Category::Http, format!("Response: {}", response.body_for_log()));
            return None;
        }
        match response.body {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(t) => {
                self.log.error(
                    Category::Http,
                    format!(
                        "Request {} {} returned a non-JSON body: {}",
                        method,
                        path,
                        truncate_for_log(&t, 200)
                    ),
                );
                None
            }
        }
    }

    async fn jitter(&self) {
        let delay = self.jitter.sample(&mut rand::thread_rng());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn build_http(proxy: Option<&str>) -> BotResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
    if let Some(proxy) = proxy {
        url::Url::parse(proxy).map_err(|e| BotError::InvalidProxy(proxy.to_string(), e.to_string()))?;
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| BotError::InvalidProxy(proxy.to_string(), e.to_string()))?;
        builder = builder.proxy(proxy);
    }
    Ok(builder.build()?)
}

/// Truncate a string for logging purposes.
pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}
