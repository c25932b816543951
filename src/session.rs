//! Per-account session state.

/// Mutable state of one account. Owned by that account's task only.
#[derive(Debug, Clone)]
pub struct Session {
    /// Account (Telegram session) name, used in logs.
    pub name: String,
    /// Auth token issued by the game; absent until the first login succeeds.
    pub auth_token: Option<String>,
    /// Handshake token (Telegram web-app init data) exchanged at login.
    pub init_data: Option<String>,
    /// Proxy the HTTP client currently routes through.
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Session {
    pub fn new(name: impl Into<String>, user_agent: impl Into<String>, proxy: Option<String>) -> Self {
        Self {
            name: name.into(),
            auth_token: None,
            init_data: None,
            proxy,
            user_agent: user_agent.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Cookie header sent with every game request. The auth token cookie is
    /// always present, empty before the first login.
    pub fn cookie_header(&self) -> String {
        format!("auth_token={}; i18next=ru", self.auth_token.as_deref().unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_has_empty_token_before_login() {
        let session = Session::new("acc", "ua", None);
        assert_eq!(session.cookie_header(), "auth_token=; i18next=ru");
        assert!(!session.is_authenticated());
    }

    #[test]
    fn cookie_header_carries_token_after_login() {
        let mut session = Session::new("acc", "ua", None);
        session.auth_token = Some("tok".to_string());
        assert_eq!(session.cookie_header(), "auth_token=tok; i18next=ru");
        assert!(session.is_authenticated());
    }
}
