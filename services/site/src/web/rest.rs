//! services/site/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::cookies::RequestCookies;
use crate::web::middleware::Visitor;
use crate::web::protocol::{
    BannerResponse, ConsentRequest, ConsentResponse, ContactForm, EventAck, EventRequest,
    FormResponse, LeadForm, StatsResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::{header::REFERER, HeaderMap, StatusCode},
    response::Json,
    Extension,
};
use chrono::Utc;
use dealer_analytics_core::consent::{self, ConsentDecision, ConsentState};
use dealer_analytics_core::domain::{
    Countdown, EventPayload, EventType, HeroSlide, PageContext, SessionData, UtmParams,
};
use dealer_analytics_core::ports::PortError;
use dealer_analytics_core::{EventScope, SessionManager, TrackOutcome, Tracker};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::OpenApi;

const SUBMIT_FAILED: &str = "Failed to submit form. Please try again later.";

type FormError = (StatusCode, Json<FormResponse>);

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        get_consent_handler,
        update_consent_handler,
        submit_lead_handler,
        submit_contact_handler,
        track_event_handler,
        banner_handler,
        stats_handler,
        crate::web::legacy::legacy_asset_handler,
    ),
    components(
        schemas(
            ConsentRequest,
            ConsentResponse,
            LeadForm,
            ContactForm,
            FormResponse,
            EventRequest,
            EventAck,
            BannerResponse,
            StatsResponse
        )
    ),
    tags(
        (name = "Dealer Site API", description = "Consent, lead capture and campaign endpoints for the dealership site.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Consent Handlers
//=========================================================================================

/// Read the visitor's consent state and the third-party tags it permits.
#[utoipa::path(
    get,
    path = "/api/consent",
    responses(
        (status = 200, description = "Current consent state", body = ConsentResponse)
    )
)]
pub async fn get_consent_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(cookies): Extension<Arc<RequestCookies>>,
) -> Json<ConsentResponse> {
    let state = ConsentState::load(cookies.as_ref());
    Json(consent_response(&app_state, &state))
}

/// Record a decision from the consent banner or the preferences editor.
///
/// Writes the consent cookie for a year and answers with the new state.
#[utoipa::path(
    post,
    path = "/api/consent",
    request_body = ConsentRequest,
    responses(
        (status = 200, description = "Decision recorded", body = ConsentResponse),
        (status = 500, description = "The consent cookie could not be written")
    )
)]
pub async fn update_consent_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(visitor): Extension<Visitor>,
    Extension(cookies): Extension<Arc<RequestCookies>>,
    headers: HeaderMap,
    Json(request): Json<ConsentRequest>,
) -> Result<Json<ConsentResponse>, (StatusCode, String)> {
    let decision = ConsentDecision::from(request);
    let state = consent::record_decision(cookies.as_ref(), decision).map_err(|e| {
        error!("Failed to record consent decision: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to save consent preferences".to_string(),
        )
    })?;

    let settings = state.settings();
    if settings.analytics {
        let mut payload = visitor_payload(&visitor, None);
        payload.insert("analytics".into(), json!(settings.analytics));
        payload.insert("marketing".into(), json!(settings.marketing));
        payload.insert("preferences".into(), json!(settings.preferences));
        let page = referer_page(&headers);
        let (tracker, _) = visitor_tracker(&app_state, &visitor, &cookies, page, false, 0);
        tracker.track(EventType::ConsentUpdated, None, payload);
    } else {
        let discarded = app_state.tracker.discard_visitor(visitor.client_id);
        if discarded > 0 {
            info!(
                "Visitor {} declined analytics; {} buffered events discarded.",
                visitor.client_id, discarded
            );
        }
    }

    Ok(Json(consent_response(&app_state, &state)))
}

fn consent_response(app_state: &AppState, state: &ConsentState) -> ConsentResponse {
    ConsentResponse::new(
        state,
        app_state.config.ga_measurement_id.as_deref(),
        app_state.config.meta_pixel_id.as_deref(),
    )
}

//=========================================================================================
// Form Handlers
//=========================================================================================

/// Submit the quick lead form.
#[utoipa::path(
    post,
    path = "/api/leads",
    request_body = LeadForm,
    responses(
        (status = 200, description = "Lead accepted", body = FormResponse),
        (status = 400, description = "A field is missing or malformed", body = FormResponse),
        (status = 422, description = "The lead backend rejected the submission", body = FormResponse),
        (status = 502, description = "The lead backend could not be reached", body = FormResponse)
    )
)]
pub async fn submit_lead_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(visitor): Extension<Visitor>,
    Extension(cookies): Extension<Arc<RequestCookies>>,
    headers: HeaderMap,
    Json(form): Json<LeadForm>,
) -> Result<Json<FormResponse>, FormError> {
    let lead = form.validate().map_err(bad_request)?;

    let receipt = app_state
        .leads
        .submit_lead(&lead)
        .await
        .map_err(|e| submission_error("lead", e))?;
    info!("Lead submitted for model '{}'.", lead.model_interested);

    track_conversion(
        &app_state,
        &visitor,
        &cookies,
        &headers,
        "lead_form",
        &["customer_name", "customer_mobile_number", "model_interested"],
    );
    Ok(Json(FormResponse::success(receipt.message)))
}

/// Submit the general contact form.
#[utoipa::path(
    post,
    path = "/api/contact",
    request_body = ContactForm,
    responses(
        (status = 200, description = "Request accepted", body = FormResponse),
        (status = 400, description = "A field is missing or malformed", body = FormResponse),
        (status = 422, description = "The admin API rejected the request", body = FormResponse),
        (status = 502, description = "The admin API could not be reached", body = FormResponse)
    )
)]
pub async fn submit_contact_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(visitor): Extension<Visitor>,
    Extension(cookies): Extension<Arc<RequestCookies>>,
    headers: HeaderMap,
    Json(form): Json<ContactForm>,
) -> Result<Json<FormResponse>, FormError> {
    let contact = form.validate().map_err(bad_request)?;

    let receipt = app_state
        .leads
        .submit_contact(&contact)
        .await
        .map_err(|e| submission_error("contact", e))?;
    info!("Contact request submitted for service '{}'.", contact.service);

    track_conversion(
        &app_state,
        &visitor,
        &cookies,
        &headers,
        "contact_form",
        &["name", "phone", "service"],
    );
    Ok(Json(FormResponse::success(receipt.message)))
}

fn bad_request(message: String) -> FormError {
    (StatusCode::BAD_REQUEST, Json(FormResponse::failure(message)))
}

fn submission_error(form: &str, err: PortError) -> FormError {
    match err {
        PortError::Rejected(message) => {
            warn!("The {} backend rejected a submission: {}", form, message);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(FormResponse::failure(message)),
            )
        }
        other => {
            error!("Failed to submit {} form: {:?}", form, other);
            (StatusCode::BAD_GATEWAY, Json(FormResponse::failure(SUBMIT_FAILED)))
        }
    }
}

/// Records a successful submission, but only for visitors who allowed analytics.
fn track_conversion(
    app_state: &AppState,
    visitor: &Visitor,
    cookies: &Arc<RequestCookies>,
    headers: &HeaderMap,
    form_name: &str,
    field_names: &[&str],
) {
    if !ConsentState::load(cookies.as_ref()).analytics_allowed() {
        return;
    }
    let page = referer_page(headers);
    let page_url = (!page.url.is_empty()).then(|| page.url.clone());
    let (tracker, _) = visitor_tracker(app_state, visitor, cookies, page, false, 0);
    tracker.track_form_submit(
        form_name,
        field_names,
        visitor_payload(visitor, page_url.as_deref()),
    );
    tracker.track_lead_conversion(form_name, None, visitor_payload(visitor, page_url.as_deref()));
}

/// The page a form or consent request was sent from.
fn referer_page(headers: &HeaderMap) -> PageContext {
    PageContext {
        url: headers
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        referrer: String::new(),
    }
}

/// A handle on the shared tracker whose events belong to this visitor, in the
/// browsing session kept in their cookies. A page view counts towards the
/// session; anything else only keeps it alive.
fn visitor_tracker(
    app_state: &AppState,
    visitor: &Visitor,
    cookies: &Arc<RequestCookies>,
    page: PageContext,
    page_view: bool,
    time_on_page: u64,
) -> (Tracker, SessionData) {
    let now = Utc::now();
    let sessions = SessionManager::new(cookies.clone());
    let utm = UtmParams::from_url(&page.url);
    let session = if page_view {
        sessions.resume_or_start(now, utm)
    } else {
        sessions.touch(now, utm)
    };
    let scope = EventScope {
        client_id: visitor.client_id,
        session_id: session.id,
        page,
        scroll_depth: session.scroll_depth,
        time_on_page,
    };
    (app_state.tracker.scoped(scope), session)
}

fn visitor_payload(visitor: &Visitor, page: Option<&str>) -> EventPayload {
    let mut payload = EventPayload::new();
    payload.insert("visitor_id".into(), json!(visitor.client_id));
    if let Some(page) = page {
        payload.insert("page".into(), json!(page));
    }
    payload
}

//=========================================================================================
// Browser Event Handler
//=========================================================================================

/// Record an interaction reported by the page script.
///
/// Only visitors who allowed analytics are recorded. Page views count towards
/// the visitor's browsing session, which is kept in a cookie and restarts after
/// thirty minutes of inactivity.
#[utoipa::path(
    post,
    path = "/api/events",
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event handled; `recorded` tells whether it was kept", body = EventAck),
        (status = 400, description = "The event is malformed or belongs to another endpoint", body = FormResponse)
    )
)]
pub async fn track_event_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(visitor): Extension<Visitor>,
    Extension(cookies): Extension<Arc<RequestCookies>>,
    Json(request): Json<EventRequest>,
) -> Result<Json<EventAck>, FormError> {
    let event_type = request.validate().map_err(bad_request)?;
    if !ConsentState::load(cookies.as_ref()).analytics_allowed() {
        return Ok(Json(EventAck::skipped()));
    }

    let page_view = event_type == EventType::PageView;
    let (tracker, session) = visitor_tracker(
        &app_state,
        &visitor,
        &cookies,
        request.page(),
        page_view,
        request.time_on_page,
    );

    let EventRequest {
        name,
        page_url,
        page_title,
        scroll_depth,
        payload,
        ..
    } = request;
    let name = name.as_deref();
    let outcome = match event_type {
        EventType::PageView => {
            let title = page_title.as_deref().unwrap_or_default();
            Some(tracker.track_page_view(title, payload))
        }
        EventType::Click => {
            Some(tracker.track_click(name.unwrap_or("unknown"), &page_url, payload))
        }
        EventType::CtaClick => {
            Some(tracker.track_cta(name.unwrap_or("unknown"), &page_url, payload))
        }
        EventType::ScrollDepth => {
            let depth = scroll_depth.unwrap_or_default().min(100);
            SessionManager::new(cookies.clone()).record_scroll_depth(depth);
            tracker.track_scroll_depth(depth)
        }
        EventType::Error => {
            let message = name.unwrap_or("Unknown error");
            let context = payload.get("context").and_then(|v| v.as_str());
            let stack = payload.get("stack").and_then(|v| v.as_str());
            Some(tracker.track_error(message, context, stack))
        }
        other => Some(tracker.track(other, name, payload)),
    };

    let recorded = matches!(
        outcome,
        Some(TrackOutcome::Queued) | Some(TrackOutcome::Flushing(_))
    );
    Ok(Json(EventAck {
        recorded,
        session_id: Some(session.id),
        page_views: Some(session.page_views),
    }))
}

//=========================================================================================
// Banner & Stats Handlers
//=========================================================================================

/// The hero carousel: the running campaign if there is one, the stock slides otherwise.
#[utoipa::path(
    get,
    path = "/api/banner",
    responses(
        (status = 200, description = "Slides to show", body = BannerResponse)
    )
)]
pub async fn banner_handler(State(app_state): State<Arc<AppState>>) -> Json<BannerResponse> {
    let now = Utc::now();
    match app_state.banners.active_banners().await {
        Ok(envelope) => {
            let Some(banner) = envelope.select_active(now) else {
                return Json(BannerResponse::fallback(None, now));
            };
            Json(BannerResponse {
                campaign_active: true,
                slides: HeroSlide::from_banner(&banner).into_iter().collect(),
                cta_text: Some(banner.cta_text.clone()),
                cta_link: Some(banner.cta_link.clone()),
                end_date: Some(banner.end_date),
                countdown: Countdown::until(banner.end_date, now).map(|c| c.to_string()),
            })
        }
        Err(e) => {
            warn!("Failed to fetch campaign banner, using default slides: {}", e);
            Json(BannerResponse::fallback(
                app_state.config.countdown_fallback_end,
                now,
            ))
        }
    }
}

/// Delivery counters of the site-level analytics buffer.
#[utoipa::path(
    get,
    path = "/api/analytics/stats",
    responses(
        (status = 200, description = "Tracker counters", body = StatsResponse)
    )
)]
pub async fn stats_handler(State(app_state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        enabled: app_state.tracker.is_enabled(),
        stats: app_state.tracker.stats(),
    })
}
