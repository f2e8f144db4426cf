//! crates/dealer_analytics_core/src/session.rs
//!
//! Session lifecycle on top of the local-storage port.

use crate::domain::{SessionData, UtmParams};
use crate::ports::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SESSION_STORAGE_KEY: &str = "epic_session_v2";

/// Inactivity after which a session is replaced.
pub fn session_timeout() -> Duration {
    Duration::minutes(30)
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            timeout: session_timeout(),
        }
    }

    /// Counts a page view: resumes the stored session if it is still live,
    /// otherwise starts a fresh one attributed to `utm`. Always persists the result.
    pub fn resume_or_start(&self, now: DateTime<Utc>, utm: UtmParams) -> SessionData {
        self.advance(now, utm, true)
    }

    /// Keeps the session alive for an interaction that is not a page view.
    /// An expired or missing session is replaced just like on a page view.
    pub fn touch(&self, now: DateTime<Utc>, utm: UtmParams) -> SessionData {
        self.advance(now, utm, false)
    }

    fn advance(&self, now: DateTime<Utc>, utm: UtmParams, page_view: bool) -> SessionData {
        let session = match self.load() {
            Some(mut session) if !session.is_expired(now, self.timeout) => {
                if page_view {
                    session.page_views += 1;
                }
                session.last_activity = now;
                session
            }
            Some(expired) => {
                debug!("Session {} expired, starting a new one.", expired.id);
                SessionData::start(now, utm)
            }
            None => SessionData::start(now, utm),
        };
        self.save(&session);
        session
    }

    /// Raises the stored scroll-depth high-water mark. Lower readings are ignored.
    pub fn record_scroll_depth(&self, depth: u8) -> Option<SessionData> {
        let mut session = self.load()?;
        if depth > session.scroll_depth {
            session.scroll_depth = depth.min(100);
            self.save(&session);
        }
        Some(session)
    }

    pub fn current(&self) -> Option<SessionData> {
        self.load()
    }

    fn load(&self) -> Option<SessionData> {
        let raw = match self.store.get_item(SESSION_STORAGE_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read session from storage: {}", e);
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| debug!("Discarding malformed session data: {}", e))
            .ok()
    }

    fn save(&self, session: &SessionData) {
        let result = serde_json::to_string(session)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                self.store
                    .set_item(SESSION_STORAGE_KEY, &json)
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = result {
            warn!("Failed to save session to storage: {}", e);
        }
    }
}
