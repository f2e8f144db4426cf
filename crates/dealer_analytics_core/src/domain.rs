//! crates/dealer_analytics_core/src/domain.rs
//!
//! Defines the pure, core data structures for the site.
//! These structs carry their storage/wire shape through serde but know nothing
//! about cookies, files or HTTP clients.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Free-form event payload, as sent to the collector.
pub type EventPayload = serde_json::Map<String, serde_json::Value>;

//=========================================================================================
// Consent
//=========================================================================================

/// The visitor's consent flags. `essential` cannot be switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentSettings {
    pub essential: bool,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default)]
    pub preferences: bool,
}

impl ConsentSettings {
    pub fn accept_all() -> Self {
        Self {
            essential: true,
            analytics: true,
            marketing: true,
            preferences: true,
        }
    }

    pub fn deny_all() -> Self {
        Self {
            essential: true,
            analytics: false,
            marketing: false,
            preferences: false,
        }
    }

    pub fn custom(analytics: bool, marketing: bool, preferences: bool) -> Self {
        Self {
            essential: true,
            analytics,
            marketing,
            preferences,
        }
    }

    /// Forces `essential` back on, whatever a stored cookie claimed.
    pub fn normalized(self) -> Self {
        Self {
            essential: true,
            ..self
        }
    }
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self::deny_all()
    }
}

//=========================================================================================
// Events
//=========================================================================================

/// The kind of interaction an event records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    PageView,
    Click,
    CtaClick,
    FormSubmit,
    LeadConversion,
    ScrollDepth,
    Error,
    ConsentUpdated,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::PageView => "page_view",
            EventType::Click => "click",
            EventType::CtaClick => "cta_click",
            EventType::FormSubmit => "form_submit",
            EventType::LeadConversion => "lead_conversion",
            EventType::ScrollDepth => "scroll_depth",
            EventType::Error => "error",
            EventType::ConsentUpdated => "consent_updated",
            EventType::Custom(name) => name,
        }
    }

    /// High-priority events are flushed the moment they are recorded.
    pub fn is_high_priority(&self) -> bool {
        matches!(
            self,
            EventType::FormSubmit | EventType::CtaClick | EventType::LeadConversion | EventType::Error
        )
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "page_view" => EventType::PageView,
            "click" => EventType::Click,
            "cta_click" => EventType::CtaClick,
            "form_submit" => EventType::FormSubmit,
            "lead_conversion" => EventType::LeadConversion,
            "scroll_depth" => EventType::ScrollDepth,
            "error" => EventType::Error,
            "consent_updated" => EventType::ConsentUpdated,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::from(value.as_str())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tracked interaction. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub client_id: Uuid,
    pub session_id: Uuid,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default)]
    pub payload: EventPayload,
    pub consent_given: bool,
    pub timestamp: DateTime<Utc>,
    pub page_url: String,
    #[serde(default)]
    pub referrer: String,
}

/// Identifies an event for retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    event_type: EventType,
    timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            event_type: self.event_type.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// The body POSTed to the collector: one event goes bare, several are wrapped.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CollectorPayload<'a> {
    Single(&'a AnalyticsEvent),
    Batch { events: &'a [AnalyticsEvent] },
}

impl<'a> CollectorPayload<'a> {
    pub fn for_batch(events: &'a [AnalyticsEvent]) -> Self {
        match events {
            [single] => CollectorPayload::Single(single),
            _ => CollectorPayload::Batch { events },
        }
    }
}

/// Where the tracked interaction happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub referrer: String,
}

//=========================================================================================
// Sessions
//=========================================================================================

/// UTM attribution parsed from a landing URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UtmParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
}

impl UtmParams {
    /// Parses `utm_source`, `utm_medium` and `utm_campaign` out of a query string.
    /// A leading `?` is accepted; empty values count as absent.
    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for pair in query.trim_start_matches('?').split('&') {
            let (name, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(&raw.replace('+', " "))
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            if value.is_empty() {
                continue;
            }
            match name {
                "utm_source" => params.source = Some(value),
                "utm_medium" => params.medium = Some(value),
                "utm_campaign" => params.campaign = Some(value),
                _ => {}
            }
        }
        params
    }

    /// Reads the UTM tags of a full page URL, ignoring any fragment.
    pub fn from_url(url: &str) -> Self {
        let without_fragment = url.split('#').next().unwrap_or_default();
        match without_fragment.split_once('?') {
            Some((_, query)) => Self::from_query(query),
            None => Self::default(),
        }
    }
}

/// A bounded window of visitor activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: Uuid,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    pub page_views: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub scroll_depth: u8,
    #[serde(default)]
    pub time_on_page: u64,
}

impl SessionData {
    pub fn start(now: DateTime<Utc>, utm: UtmParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_time: now,
            page_views: 1,
            last_activity: now,
            utm_source: utm.source,
            utm_medium: utm.medium,
            utm_campaign: utm.campaign,
            scroll_depth: 0,
            time_on_page: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_activity > timeout
    }
}

//=========================================================================================
// Leads
//=========================================================================================

/// The quick lead form: who wants which model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub customer_name: String,
    pub customer_mobile_number: String,
    pub model_interested: String,
}

/// The general contact form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub phone: String,
    pub service: String,
}

/// What the lead backends answer with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadReceipt {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

//=========================================================================================
// Campaign banners
//=========================================================================================

/// A campaign banner as configured in the admin backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignBanner {
    #[serde(default)]
    pub desktop_banner_url: Option<String>,
    #[serde(default)]
    pub mobile_banner_url: Option<String>,
    #[serde(default)]
    pub banner_url: Option<String>,
    pub cta_text: String,
    pub cta_link: String,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub status: bool,
}

impl CampaignBanner {
    pub fn desktop_image(&self) -> Option<&str> {
        self.desktop_banner_url
            .as_deref()
            .or(self.banner_url.as_deref())
    }

    pub fn mobile_image(&self) -> Option<&str> {
        self.mobile_banner_url
            .as_deref()
            .or(self.banner_url.as_deref())
    }

    /// Active, not yet expired, and has an image for both layouts.
    pub fn is_displayable(&self, now: DateTime<Utc>) -> bool {
        self.status
            && self.end_date > now
            && self.desktop_image().is_some()
            && self.mobile_image().is_some()
    }
}

/// The banner backend answers with either one banner or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BannerData {
    One(CampaignBanner),
    Many(Vec<CampaignBanner>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct BannerEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub data: Option<BannerData>,
}

impl BannerEnvelope {
    /// Picks the first banner that can actually be shown right now.
    pub fn select_active(self, now: DateTime<Utc>) -> Option<CampaignBanner> {
        if !self.ok {
            return None;
        }
        match self.data? {
            BannerData::One(banner) => Some(banner).filter(|b| b.is_displayable(now)),
            BannerData::Many(banners) => banners.into_iter().find(|b| b.is_displayable(now)),
        }
    }
}

/// One slide of the hero carousel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeroSlide {
    pub desktop_image: String,
    pub mobile_image: String,
    pub cta_text: String,
    pub cta_link: String,
}

impl HeroSlide {
    /// The stock carousel shown when no campaign is running.
    pub fn defaults() -> Vec<HeroSlide> {
        ["hycross", "crysta", "glanza", "hyryder", "rumion", "taisor"]
            .iter()
            .map(|model| HeroSlide {
                desktop_image: format!("/assets/Desktop/{}desk.jpg", model),
                mobile_image: format!("/assets/Mobile/{}mob.jpg", model),
                cta_text: "Book Now".to_string(),
                cta_link: "/vehicles".to_string(),
            })
            .collect()
    }
}

impl HeroSlide {
    pub fn from_banner(banner: &CampaignBanner) -> Option<Self> {
        Some(HeroSlide {
            desktop_image: banner.desktop_image()?.to_string(),
            mobile_image: banner.mobile_image()?.to_string(),
            cta_text: banner.cta_text.clone(),
            cta_link: banner.cta_link.clone(),
        })
    }
}

/// Time left on a promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// Returns `None` once `end` has been reached.
    pub fn until(end: DateTime<Utc>, now: DateTime<Utc>) -> Option<Self> {
        let remaining = (end - now).num_seconds();
        if remaining <= 0 {
            return None;
        }
        Some(Self {
            days: remaining / 86_400,
            hours: (remaining / 3_600) % 24,
            minutes: (remaining / 60) % 60,
            seconds: remaining % 60,
        })
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}
