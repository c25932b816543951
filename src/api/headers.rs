//! Fixed request headers and user-agent generation.

use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Headers a browser inside the Telegram web view sends with every call.
const FIXED_HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json, text/plain, */*"),
    ("accept-language", "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"),
    ("origin", "https://giftopia.games"),
    ("referer", "https://giftopia.games/"),
    ("priority", "u=1, i"),
    ("sec-fetch-dest", "empty"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("x-requested-with", "org.telegram.messenger"),
];

const ANDROID_DEVICES: &[&str] = &[
    "SM-S918B",
    "SM-A546B",
    "Pixel 7",
    "Pixel 8 Pro",
    "2201116SG",
    "CPH2451",
    "V2227A",
];

/// Build the fixed header map plus the account's user agent.
pub fn default_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in FIXED_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    match HeaderValue::from_str(user_agent) {
        Ok(value) => {
            headers.insert(reqwest::header::USER_AGENT, value);
        }
        Err(e) => {
            tracing::warn!("User agent is not a valid header value ({}), using a generated one", e);
            if let Ok(value) = HeaderValue::from_str(&generate_user_agent()) {
                headers.insert(reqwest::header::USER_AGENT, value);
            }
        }
    }
    headers
}

/// Random Android Chrome user agent of the kind the Telegram web view reports.
pub fn generate_user_agent() -> String {
    let mut rng = rand::thread_rng();
    let device = ANDROID_DEVICES.choose(&mut rng).copied().unwrap_or("Pixel 7");
    let android = rng.gen_range(11..=14);
    let chrome_major = rng.gen_range(118..=126);
    let chrome_build = rng.gen_range(5000..=6500);
    let chrome_patch = rng.gen_range(50..=200);
    format!(
        "Mozilla/5.0 (Linux; Android {}; {}) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/{}.0.{}.{} Mobile Safari/537.36 Telegram-Android/11.2.3",
        android, device, chrome_major, chrome_build, chrome_patch
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_user_agent_is_a_valid_header() {
        for _ in 0..20 {
            let ua = generate_user_agent();
            assert!(ua.starts_with("Mozilla/5.0 (Linux; Android "));
            assert!(ua.contains("Mobile Safari"));
            assert!(HeaderValue::from_str(&ua).is_ok());
        }
    }

    #[test]
    fn default_headers_include_user_agent_and_fixed_set() {
        let headers = default_headers("TestAgent/1.0");
        assert_eq!(headers.get("user-agent").unwrap(), "TestAgent/1.0");
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "cors");
        assert_eq!(headers.len(), FIXED_HEADERS.len() + 1);
    }

    #[test]
    fn invalid_user_agent_is_replaced() {
        let headers = default_headers("bad\nagent");
        let ua = headers.get("user-agent").unwrap().to_str().unwrap();
        assert!(ua.starts_with("Mozilla/5.0"));
    }
}
