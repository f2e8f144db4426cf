//! services/site/src/web/cookies.rs
//!
//! A per-request `CookieJar`: reads the `Cookie` header and collects the
//! `Set-Cookie` lines handlers produce, for the visitor middleware to attach.
//!
//! The same jar doubles as the visitor's `KeyValueStore`, so per-visitor
//! state such as the browsing session lives in the visitor's own cookies.

use chrono::Duration;
use dealer_analytics_core::ports::{CookieJar, KeyValueStore, PortResult};
use axum::http::{header, HeaderMap};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Lifetime of cookies written through the `KeyValueStore` view.
pub fn stored_item_ttl() -> Duration {
    Duration::days(30)
}

#[derive(Debug)]
pub struct RequestCookies {
    values: Mutex<HashMap<String, String>>,
    outgoing: Mutex<Vec<String>>,
    /// Whether written cookies carry the `Secure` attribute.
    secure: bool,
}

impl Default for RequestCookies {
    fn default() -> Self {
        Self::from_headers(&HeaderMap::new(), true)
    }
}

impl RequestCookies {
    pub fn from_headers(headers: &HeaderMap, secure: bool) -> Self {
        let values = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, raw) = pair.trim().split_once('=')?;
                let value = urlencoding::decode(raw)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                Some((name.to_string(), value))
            })
            .collect();
        Self {
            values: Mutex::new(values),
            outgoing: Mutex::new(Vec::new()),
            secure,
        }
    }

    /// Drains the `Set-Cookie` header values produced so far.
    pub fn take_set_cookies(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.outgoing))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CookieJar for RequestCookies {
    fn get_cookie(&self, name: &str) -> Option<String> {
        lock(&self.values).get(name).cloned()
    }

    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> PortResult<()> {
        let cookie = format!(
            "{}={}; Max-Age={}; Path=/;{} SameSite=Strict",
            name,
            urlencoding::encode(value),
            max_age.num_seconds(),
            if self.secure { " Secure;" } else { "" }
        );
        lock(&self.outgoing).push(cookie);
        lock(&self.values).insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_cookie(&self, name: &str) -> PortResult<()> {
        lock(&self.outgoing).push(format!("{}=; Max-Age=0; Path=/", name));
        lock(&self.values).remove(name);
        Ok(())
    }
}

impl KeyValueStore for RequestCookies {
    fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.get_cookie(key))
    }

    fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        self.set_cookie(key, value, stored_item_ttl())
    }

    fn remove_item(&self, key: &str) -> PortResult<()> {
        self.remove_cookie(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_and_decodes_request_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; epic_consent_v2=%7B%22essential%22%3Atrue%7D"),
        );
        let jar = RequestCookies::from_headers(&headers, true);
        assert_eq!(jar.get_cookie("theme").as_deref(), Some("dark"));
        assert_eq!(jar.get_cookie("epic_consent_v2").as_deref(), Some(r#"{"essential":true}"#));
        assert!(jar.get_cookie("missing").is_none());
    }

    #[test]
    fn writes_encoded_set_cookie_lines() {
        let jar = RequestCookies::default();
        jar.set_cookie("epic_consent_v2", r#"{"analytics":true}"#, Duration::days(365))
            .unwrap();
        assert_eq!(jar.get_cookie("epic_consent_v2").as_deref(), Some(r#"{"analytics":true}"#));

        let lines = jar.take_set_cookies();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("epic_consent_v2=%7B%22analytics%22%3Atrue%7D;"));
        assert!(lines[0].contains("Max-Age=31536000"));
        assert!(lines[0].contains("; Secure;"));
        assert!(jar.take_set_cookies().is_empty());
    }

    #[test]
    fn plain_http_cookies_leave_out_secure() {
        let jar = RequestCookies::from_headers(&HeaderMap::new(), false);
        jar.set_cookie("epic_client_id_v2", "abc", Duration::days(730)).unwrap();

        let lines = jar.take_set_cookies();
        assert_eq!(lines, vec!["epic_client_id_v2=abc; Max-Age=63072000; Path=/; SameSite=Strict"]);
    }

    #[test]
    fn stored_items_are_cookies_for_thirty_days() {
        let jar = RequestCookies::default();
        jar.set_item("epic_session_v2", r#"{"page_views":1}"#).unwrap();
        assert_eq!(jar.get_item("epic_session_v2").unwrap().as_deref(), Some(r#"{"page_views":1}"#));
        assert!(jar.take_set_cookies()[0].contains("Max-Age=2592000"));

        jar.remove_item("epic_session_v2").unwrap();
        assert!(jar.get_item("epic_session_v2").unwrap().is_none());
    }
}
