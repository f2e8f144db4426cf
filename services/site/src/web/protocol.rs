//! services/site/src/web/protocol.rs
//!
//! Defines the JSON payloads exchanged between the browser and the site service.

use dealer_analytics_core::consent::{ConsentDecision, ConsentState, ThirdPartyScript};
use dealer_analytics_core::domain::{
    ConsentSettings, ContactRequest, Countdown, EventPayload, EventType, HeroSlide,
    LeadSubmission, PageContext,
};
use dealer_analytics_core::TrackerStats;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use utoipa::ToSchema;
use uuid::Uuid;

/// Models offered in the quick lead form.
pub const MODELS: &[&str] = &[
    "Glanza",
    "Urban Cruiser Taisor",
    "Urban Cruiser Hyryder",
    "Rumion",
    "Innova Hycross",
    "Innova Crysta",
    "Fortuner",
    "Hilux",
    "Camry",
    "Vellfire",
    "Land Cruiser",
    "Other",
];

/// Services offered in the contact form.
pub const SERVICES: &[&str] = &["buy", "service", "exchange", "other"];

fn mobile_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{10}$").expect("mobile number pattern is valid"))
}

//=========================================================================================
// Consent
//=========================================================================================

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentAction {
    AcceptAll,
    DenyAll,
    SavePreferences,
}

/// A visitor's answer to the consent banner or the preferences editor.
///
/// The category flags are only read for `save_preferences`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConsentRequest {
    pub action: ConsentAction,
    #[serde(default)]
    pub analytics: bool,
    #[serde(default)]
    pub marketing: bool,
    #[serde(default)]
    pub preferences: bool,
}

impl From<ConsentRequest> for ConsentDecision {
    fn from(req: ConsentRequest) -> Self {
        match req.action {
            ConsentAction::AcceptAll => ConsentDecision::AcceptAll,
            ConsentAction::DenyAll => ConsentDecision::DenyAll,
            ConsentAction::SavePreferences => ConsentDecision::SavePreferences {
                analytics: req.analytics,
                marketing: req.marketing,
                preferences: req.preferences,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsentResponse {
    /// `no_decision` or `decided`.
    pub state: String,
    pub banner_visible: bool,
    #[schema(value_type = Object)]
    pub settings: ConsentSettings,
    /// Third-party tags the page may load for this visitor.
    #[schema(value_type = Vec<Object>)]
    pub scripts: Vec<ThirdPartyScript>,
}

impl ConsentResponse {
    pub fn new(
        state: &ConsentState,
        ga_measurement_id: Option<&str>,
        meta_pixel_id: Option<&str>,
    ) -> Self {
        let settings = state.settings();
        let label = match state {
            ConsentState::NoDecision => "no_decision",
            ConsentState::Decided(_) => "decided",
        };
        Self {
            state: label.to_string(),
            banner_visible: state.banner_visible(),
            scripts: dealer_analytics_core::consent::allowed_scripts(
                &settings,
                ga_measurement_id,
                meta_pixel_id,
            ),
            settings,
        }
    }
}

//=========================================================================================
// Forms
//=========================================================================================

/// The quick lead form as the browser posts it.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LeadForm {
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_mobile_number: String,
    #[serde(default)]
    pub model_interested: String,
}

impl LeadForm {
    /// Trims the fields and checks them the way the form's own inputs do.
    pub fn validate(self) -> Result<LeadSubmission, String> {
        let customer_name = self.customer_name.trim().to_string();
        let customer_mobile_number = self.customer_mobile_number.trim().to_string();
        let model_interested = self.model_interested.trim().to_string();

        if customer_name.is_empty() {
            return Err("Please enter your name".to_string());
        }
        if !mobile_number_pattern().is_match(&customer_mobile_number) {
            return Err("Please enter a 10-digit mobile number".to_string());
        }
        if !MODELS.contains(&model_interested.as_str()) {
            return Err("Please select a model".to_string());
        }
        Ok(LeadSubmission {
            customer_name,
            customer_mobile_number,
            model_interested,
        })
    }
}

/// The general contact form.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub service: String,
}

impl ContactForm {
    pub fn validate(self) -> Result<ContactRequest, String> {
        let name = self.name.trim().to_string();
        let phone = self.phone.trim().to_string();
        let service = self.service.trim().to_string();

        if name.is_empty() {
            return Err("Please enter your name".to_string());
        }
        if phone.is_empty() {
            return Err("Please enter your phone number".to_string());
        }
        if !SERVICES.contains(&service.as_str()) {
            return Err("Please select an option".to_string());
        }
        Ok(ContactRequest {
            name,
            phone,
            service,
        })
    }
}

/// The inline status message shown under a form.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FormResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FormResponse {
    pub fn success(message: Option<String>) -> Self {
        Self { ok: true, message }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

//=========================================================================================
// Browser Events
//=========================================================================================

/// One interaction reported by the page script.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EventRequest {
    /// `page_view`, `click`, `cta_click`, `scroll_depth`, `error` or a custom name.
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub name: Option<String>,
    pub page_url: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub page_title: Option<String>,
    /// Required for `scroll_depth`; a percentage of the page.
    #[serde(default)]
    pub scroll_depth: Option<u8>,
    /// Milliseconds since the page loaded.
    #[serde(default)]
    pub time_on_page: u64,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: EventPayload,
}

impl EventRequest {
    /// Checks the request and resolves its event type. Form and consent events
    /// are recorded by their own endpoints and are refused here.
    pub fn validate(&self) -> Result<EventType, String> {
        if self.page_url.trim().is_empty() {
            return Err("page_url is required".to_string());
        }
        let event_type = EventType::from(self.event_type.trim());
        match event_type {
            EventType::Custom(ref name) if name.is_empty() => {
                Err("type is required".to_string())
            }
            EventType::FormSubmit | EventType::LeadConversion | EventType::ConsentUpdated => Err(
                format!("'{}' events are recorded by the form and consent endpoints", event_type),
            ),
            EventType::ScrollDepth if self.scroll_depth.is_none() => {
                Err("scroll_depth is required for scroll_depth events".to_string())
            }
            event_type => Ok(event_type),
        }
    }

    pub fn page(&self) -> PageContext {
        PageContext {
            url: self.page_url.clone(),
            referrer: self.referrer.clone(),
        }
    }
}

/// Whether the event was kept, and the browsing session it was counted in.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventAck {
    pub recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_views: Option<u32>,
}

impl EventAck {
    pub fn skipped() -> Self {
        Self {
            recorded: false,
            session_id: None,
            page_views: None,
        }
    }
}

//=========================================================================================
// Banner & Stats
//=========================================================================================

/// What the hero section should show.
#[derive(Debug, Serialize, ToSchema)]
pub struct BannerResponse {
    /// `true` when the slides come from a running campaign.
    pub campaign_active: bool,
    #[schema(value_type = Vec<Object>)]
    pub slides: Vec<HeroSlide>,
    pub cta_text: Option<String>,
    pub cta_link: Option<String>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    /// `DD:HH:MM:SS` left until `end_date`, absent once it has passed.
    pub countdown: Option<String>,
}

impl BannerResponse {
    pub fn fallback(end_date: Option<chrono::DateTime<chrono::Utc>>, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            campaign_active: false,
            slides: HeroSlide::defaults(),
            cta_text: None,
            cta_link: None,
            end_date,
            countdown: end_date
                .and_then(|end| Countdown::until(end, now))
                .map(|c| c.to_string()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub enabled: bool,
    #[schema(value_type = Object)]
    pub stats: TrackerStats,
}
