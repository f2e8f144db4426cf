//! crates/dealer_analytics_core/src/memory.rs
//!
//! In-memory implementations of the storage ports. Used when nothing durable
//! is wanted, and throughout the tests.

use crate::ports::{CookieJar, KeyValueStore, PortResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// A `KeyValueStore` backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> PortResult<()> {
        self.items().remove(key);
        Ok(())
    }
}

/// A `CookieJar` that honours max-age against the wall clock.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the named cookie expires, if it is set.
    pub fn expires_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.cookies().get(name).map(|(_, expires_at)| *expires_at)
    }

    fn cookies(&self) -> MutexGuard<'_, HashMap<String, (String, DateTime<Utc>)>> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CookieJar for MemoryCookieJar {
    fn get_cookie(&self, name: &str) -> Option<String> {
        let mut cookies = self.cookies();
        match cookies.get(name) {
            Some((_, expires_at)) if *expires_at <= Utc::now() => {
                cookies.remove(name);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> PortResult<()> {
        self.cookies()
            .insert(name.to_string(), (value.to_string(), Utc::now() + max_age));
        Ok(())
    }

    fn remove_cookie(&self, name: &str) -> PortResult<()> {
        self.cookies().remove(name);
        Ok(())
    }
}
