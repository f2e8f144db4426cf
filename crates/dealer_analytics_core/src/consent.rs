//! crates/dealer_analytics_core/src/consent.rs
//!
//! The consent state machine and the cookies that back it.
//!
//! A visitor starts in `NoDecision` (banner shown) unless a readable consent
//! cookie exists, in which case they are `Decided`. Any later decision just
//! rewrites the cookie. There is no explicit expiry transition: once the
//! cookie's max-age lapses the visitor is simply undecided again.

use crate::domain::ConsentSettings;
use crate::ports::{CookieJar, PortError, PortResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const CONSENT_COOKIE: &str = "epic_consent_v2";
pub const CLIENT_ID_COOKIE: &str = "epic_client_id_v2";

pub fn consent_ttl() -> Duration {
    Duration::days(365)
}

pub fn client_id_ttl() -> Duration {
    Duration::days(365 * 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentState {
    NoDecision,
    Decided(ConsentSettings),
}

impl ConsentState {
    /// Evaluates the state from the consent cookie. Unreadable cookies count as no decision.
    pub fn load(jar: &dyn CookieJar) -> Self {
        let Some(raw) = jar.get_cookie(CONSENT_COOKIE) else {
            return ConsentState::NoDecision;
        };
        match serde_json::from_str::<ConsentSettings>(&raw) {
            Ok(settings) => ConsentState::Decided(settings.normalized()),
            Err(e) => {
                debug!("Ignoring malformed consent cookie: {}", e);
                ConsentState::NoDecision
            }
        }
    }

    pub fn banner_visible(&self) -> bool {
        matches!(self, ConsentState::NoDecision)
    }

    /// The effective settings. Undecided visitors get essential-only.
    pub fn settings(&self) -> ConsentSettings {
        match self {
            ConsentState::NoDecision => ConsentSettings::deny_all(),
            ConsentState::Decided(settings) => *settings,
        }
    }

    pub fn analytics_allowed(&self) -> bool {
        self.settings().analytics
    }
}

/// The three things a visitor can do with the banner or the preferences editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConsentDecision {
    AcceptAll,
    DenyAll,
    SavePreferences {
        #[serde(default)]
        analytics: bool,
        #[serde(default)]
        marketing: bool,
        #[serde(default)]
        preferences: bool,
    },
}

impl ConsentDecision {
    pub fn settings(&self) -> ConsentSettings {
        match *self {
            ConsentDecision::AcceptAll => ConsentSettings::accept_all(),
            ConsentDecision::DenyAll => ConsentSettings::deny_all(),
            ConsentDecision::SavePreferences {
                analytics,
                marketing,
                preferences,
            } => ConsentSettings::custom(analytics, marketing, preferences),
        }
    }
}

/// Applies a decision: writes the consent cookie and returns the new state.
pub fn record_decision(jar: &dyn CookieJar, decision: ConsentDecision) -> PortResult<ConsentState> {
    let settings = decision.settings();
    let value = serde_json::to_string(&settings).map_err(|e| PortError::Unexpected(e.to_string()))?;
    jar.set_cookie(CONSENT_COOKIE, &value, consent_ttl())?;
    Ok(ConsentState::Decided(settings))
}

/// Returns the visitor's client id, minting and storing a new one when the cookie
/// is missing or unreadable. A failed write still yields a usable id.
pub fn client_id(jar: &dyn CookieJar) -> Uuid {
    if let Some(id) = jar
        .get_cookie(CLIENT_ID_COOKIE)
        .and_then(|raw| Uuid::parse_str(&raw).ok())
    {
        return id;
    }
    let id = Uuid::new_v4();
    if let Err(e) = jar.set_cookie(CLIENT_ID_COOKIE, &id.to_string(), client_id_ttl()) {
        debug!("Could not persist client id cookie: {}", e);
    }
    id
}

//=========================================================================================
// Third-party script gating
//=========================================================================================

/// A third-party tag the page is allowed to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThirdPartyScript {
    GoogleAnalytics {
        measurement_id: String,
        src: String,
        ad_storage_granted: bool,
        anonymize_ip: bool,
    },
    MetaPixel {
        pixel_id: String,
        src: String,
    },
}

/// Which tags a visitor's consent permits, given the ids the site is configured with.
pub fn allowed_scripts(
    settings: &ConsentSettings,
    ga_measurement_id: Option<&str>,
    meta_pixel_id: Option<&str>,
) -> Vec<ThirdPartyScript> {
    let mut scripts = Vec::new();
    if let (true, Some(id)) = (settings.analytics, ga_measurement_id) {
        scripts.push(ThirdPartyScript::GoogleAnalytics {
            measurement_id: id.to_string(),
            src: format!("https://www.googletagmanager.com/gtag/js?id={}", id),
            ad_storage_granted: settings.marketing,
            anonymize_ip: true,
        });
    }
    if let (true, Some(id)) = (settings.marketing, meta_pixel_id) {
        scripts.push(ThirdPartyScript::MetaPixel {
            pixel_id: id.to_string(),
            src: "https://connect.facebook.net/en_US/fbevents.js".to_string(),
        });
    }
    scripts
}
