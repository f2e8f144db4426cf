// tests/routes_test.rs

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE, SET_COOKIE},
        Request, StatusCode,
    },
    Router,
};
use bytes::Bytes;
use chrono::Utc;
use dealer_analytics_core::ports::{
    BannerService, CollectorTransport, LeadService, PortError, PortResult,
};
use dealer_analytics_core::{
    BannerEnvelope, ConsentSettings, ContactRequest, LeadReceipt, LeadSubmission, MemoryStore,
    Tracker, TrackerConfig, TrackerIdentity,
};
use serde_json::{json, Value};
use site_lib::config::Config;
use site_lib::web::{build_router, state::AppState};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

//=========================================================================================
// Mock Ports
//=========================================================================================

struct MockCollector {
    bodies: Mutex<Vec<Value>>,
}

#[async_trait]
impl CollectorTransport for MockCollector {
    async fn deliver(&self, body: Bytes) -> PortResult<()> {
        self.bodies
            .lock()
            .unwrap()
            .push(serde_json::from_slice(&body).unwrap());
        Ok(())
    }

    fn beacon(&self, _body: Bytes) -> bool {
        true
    }
}

impl MockCollector {
    /// Every delivered event, unwrapping batch envelopes.
    fn events(&self) -> Vec<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .flat_map(|body| match body.get("events") {
                Some(Value::Array(events)) => events.clone(),
                _ => vec![body.clone()],
            })
            .collect()
    }
}

struct MockLeads {
    respond: fn() -> PortResult<LeadReceipt>,
    leads: Mutex<Vec<LeadSubmission>>,
    contacts: Mutex<Vec<ContactRequest>>,
}

#[async_trait]
impl LeadService for MockLeads {
    async fn submit_lead(&self, lead: &LeadSubmission) -> PortResult<LeadReceipt> {
        self.leads.lock().unwrap().push(lead.clone());
        (self.respond)()
    }

    async fn submit_contact(&self, contact: &ContactRequest) -> PortResult<LeadReceipt> {
        self.contacts.lock().unwrap().push(contact.clone());
        (self.respond)()
    }
}

struct MockBanners {
    respond: fn() -> PortResult<BannerEnvelope>,
}

#[async_trait]
impl BannerService for MockBanners {
    async fn active_banners(&self) -> PortResult<BannerEnvelope> {
        (self.respond)()
    }
}

fn accepted() -> PortResult<LeadReceipt> {
    Ok(LeadReceipt {
        ok: true,
        message: Some("Thanks, we will call you shortly".to_string()),
    })
}

fn no_campaign() -> PortResult<BannerEnvelope> {
    Ok(serde_json::from_value(json!({ "ok": true, "data": [] })).unwrap())
}

//=========================================================================================
// Harness
//=========================================================================================

struct Harness {
    router: Router,
    tracker: Tracker,
    collector: Arc<MockCollector>,
    leads: Arc<MockLeads>,
}

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        log_level: tracing::Level::INFO,
        allowed_origin: "http://localhost:3000".to_string(),
        cookie_secure: false,
        analytics_endpoint: Some("http://collector.test/events".to_string()),
        analytics_batch_size: 10,
        analytics_flush_interval: Duration::from_secs(30),
        api_base: "http://admin.test".to_string(),
        lead_endpoint: Some("http://leads.test/smart-handler".to_string()),
        lead_api_key: None,
        storage_path: PathBuf::from("unused.json"),
        ga_measurement_id: Some("G-TEST123".to_string()),
        meta_pixel_id: Some("1234567890".to_string()),
        countdown_fallback_end: Some(Utc::now() + chrono::Duration::days(3)),
    }
}

fn harness(
    leads: fn() -> PortResult<LeadReceipt>,
    banners: fn() -> PortResult<BannerEnvelope>,
) -> Harness {
    let collector = Arc::new(MockCollector {
        bodies: Mutex::new(Vec::new()),
    });
    let tracker = Tracker::start(
        TrackerIdentity {
            client_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
        },
        ConsentSettings::accept_all(),
        Arc::new(MemoryStore::new()),
        Some(collector.clone() as Arc<dyn CollectorTransport>),
        TrackerConfig::default(),
    );
    let leads = Arc::new(MockLeads {
        respond: leads,
        leads: Mutex::new(Vec::new()),
        contacts: Mutex::new(Vec::new()),
    });
    let app_state = Arc::new(AppState {
        config: Arc::new(test_config()),
        tracker: tracker.clone(),
        leads: leads.clone(),
        banners: Arc::new(MockBanners { respond: banners }),
    });
    Harness {
        router: build_router(app_state),
        tracker,
        collector,
        leads,
    }
}

fn consent_cookie(settings: ConsentSettings) -> String {
    let raw = serde_json::to_string(&settings).unwrap();
    format!("epic_consent_v2={}", urlencoding::encode(&raw))
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Lets spawned flushes run to completion.
async fn settle(tracker: &Tracker) {
    tracker.flush().await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

/// The `name=value` pair of the last session cookie a response set.
fn session_cookie(response: &axum::response::Response) -> String {
    set_cookies(response)
        .into_iter()
        .filter(|c| c.starts_with("epic_session_v2="))
        .last()
        .expect("session cookie set")
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn consenting_visitor(client_id: Uuid) -> String {
    format!(
        "epic_client_id_v2={}; {}",
        client_id,
        consent_cookie(ConsentSettings::accept_all())
    )
}

fn valid_lead() -> Value {
    json!({
        "customer_name": "Asha",
        "customer_mobile_number": "9876543210",
        "model_interested": "Innova Hycross"
    })
}

//=========================================================================================
// Consent
//=========================================================================================

#[tokio::test]
async fn first_visit_shows_banner_and_assigns_client_id() {
    let h = harness(accepted, no_campaign);

    let response = h.router.oneshot(get("/api/consent")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("epic_client_id_v2=")));

    let body = json_body(response).await;
    assert_eq!(body["state"], "no_decision");
    assert_eq!(body["banner_visible"], true);
    assert_eq!(body["settings"]["analytics"], false);
    assert_eq!(body["scripts"], json!([]));
}

#[tokio::test]
async fn accept_all_sets_cookie_and_enables_scripts() {
    let h = harness(accepted, no_campaign);

    let response = h
        .router
        .oneshot(post_json("/api/consent", json!({ "action": "accept_all" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let consent = set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("epic_consent_v2="))
        .expect("consent cookie set");
    assert!(consent.contains("Max-Age=31536000"));
    assert!(consent.contains("SameSite=Strict"));

    let body = json_body(response).await;
    assert_eq!(body["state"], "decided");
    assert_eq!(body["banner_visible"], false);
    let kinds: Vec<&str> = body["scripts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["google_analytics", "meta_pixel"]);

    // consent_updated is queued, not flushed on its own
    assert_eq!(h.tracker.pending(), 1);
}

#[tokio::test]
async fn deny_all_records_nothing() {
    let h = harness(accepted, no_campaign);

    let response = h
        .router
        .oneshot(post_json("/api/consent", json!({ "action": "deny_all" }), None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["settings"]["analytics"], false);
    assert_eq!(body["scripts"], json!([]));
    assert_eq!(h.tracker.pending(), 0);
}

#[tokio::test]
async fn declining_after_accepting_discards_the_visitors_buffered_events() {
    let h = harness(accepted, no_campaign);
    let (leaving, staying) = (Uuid::new_v4(), Uuid::new_v4());
    let leaving_id = format!("epic_client_id_v2={}", leaving);

    let accept = post_json("/api/consent", json!({ "action": "accept_all" }), Some(&leaving_id));
    h.router.clone().oneshot(accept).await.unwrap();
    let click = json!({ "type": "click", "name": "gallery", "page_url": "https://dealer.test/" });
    for visitor in [leaving, staying] {
        let cookie = consenting_visitor(visitor);
        h.router
            .clone()
            .oneshot(post_json("/api/events", click.clone(), Some(&cookie)))
            .await
            .unwrap();
    }
    assert_eq!(h.tracker.pending(), 3);

    let deny = post_json(
        "/api/consent",
        json!({ "action": "deny_all" }),
        Some(&consenting_visitor(leaving)),
    );
    let response = h.router.clone().oneshot(deny).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.tracker.pending(), 1);

    settle(&h.tracker).await;
    let events = h.collector.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["client_id"], staying.to_string());
    assert_eq!(h.tracker.stats().pending, 0);
}

#[tokio::test]
async fn plain_http_origin_gets_cookies_without_secure() {
    let h = harness(accepted, no_campaign);

    let response = h.router.oneshot(get("/api/consent")).await.unwrap();
    let client_id = set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("epic_client_id_v2="))
        .unwrap();
    assert!(client_id.ends_with("Path=/; SameSite=Strict"));
    assert!(!client_id.contains("Secure"));
}

#[tokio::test]
async fn saved_preferences_gate_each_script() {
    let h = harness(accepted, no_campaign);

    let request = json!({ "action": "save_preferences", "analytics": true, "marketing": false });
    let response = h
        .router
        .oneshot(post_json("/api/consent", request, None))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["scripts"].as_array().unwrap().len(), 1);
    assert_eq!(body["scripts"][0]["kind"], "google_analytics");
    assert_eq!(body["scripts"][0]["ad_storage_granted"], false);
}

//=========================================================================================
// Forms
//=========================================================================================

#[tokio::test]
async fn invalid_lead_is_rejected_before_forwarding() {
    let h = harness(accepted, no_campaign);

    let mut lead = valid_lead();
    lead["customer_mobile_number"] = json!("12345");
    let response = h
        .router
        .oneshot(post_json("/api/leads", lead, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert!(h.leads.leads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn backend_rejection_message_is_shown_inline() {
    let h = harness(
        || Err(PortError::Rejected("Duplicate lead".to_string())),
        no_campaign,
    );

    let response = h
        .router
        .oneshot(post_json("/api/leads", valid_lead(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body, json!({ "ok": false, "message": "Duplicate lead" }));
}

#[tokio::test]
async fn unreachable_backend_gets_generic_message() {
    let h = harness(
        || Err(PortError::Unexpected("connection refused".to_string())),
        no_campaign,
    );

    let response = h
        .router
        .oneshot(post_json("/api/leads", valid_lead(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(
        body["message"],
        "Failed to submit form. Please try again later."
    );
}

#[tokio::test]
async fn consenting_visitor_lead_is_tracked_as_conversion() {
    let h = harness(accepted, no_campaign);
    let client_id = Uuid::new_v4();
    let cookie = format!(
        "epic_client_id_v2={}; {}",
        client_id,
        consent_cookie(ConsentSettings::accept_all())
    );

    let response = h
        .router
        .oneshot(post_json("/api/leads", valid_lead(), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // A known client id is not re-issued
    assert!(!set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("epic_client_id_v2=")));
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["message"], "Thanks, we will call you shortly");

    settle(&h.tracker).await;
    let events = h.collector.events();
    let types: Vec<&str> = events
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"form_submit"));
    assert!(types.contains(&"lead_conversion"));

    let form = events
        .iter()
        .find(|e| e["event_type"] == "form_submit")
        .unwrap();
    assert_eq!(form["payload"]["visitor_id"], client_id.to_string());
    assert_eq!(
        form["payload"]["form_fields"],
        json!(["customer_name", "customer_mobile_number", "model_interested"])
    );
    // Field values never reach the collector
    assert!(!form.to_string().contains("9876543210"));

    assert_eq!(h.leads.leads.lock().unwrap()[0].model_interested, "Innova Hycross");
}

#[tokio::test]
async fn undecided_visitor_lead_is_not_tracked() {
    let h = harness(accepted, no_campaign);

    let response = h
        .router
        .oneshot(post_json("/api/leads", valid_lead(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    settle(&h.tracker).await;
    assert!(h.collector.events().is_empty());
    assert_eq!(h.leads.leads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn contact_request_is_forwarded() {
    let h = harness(accepted, no_campaign);

    let request = json!({ "name": "Ravi", "phone": "9876543210", "service": "service" });
    let response = h
        .router
        .oneshot(post_json("/api/contact", request, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let contacts = h.leads.contacts.lock().unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].service, "service");
}

//=========================================================================================
// Browser Events
//=========================================================================================

#[tokio::test]
async fn page_views_are_counted_in_the_cookie_session() {
    let h = harness(accepted, no_campaign);
    let client_id = Uuid::new_v4();
    let visitor = consenting_visitor(client_id);
    let view = json!({
        "type": "page_view",
        "page_url": "https://dealer.test/models?utm_source=google",
        "referrer": "https://www.google.com/",
        "page_title": "Models",
        "time_on_page": 1500
    });

    let first = h
        .router
        .clone()
        .oneshot(post_json("/api/events", view.clone(), Some(&visitor)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let session = session_cookie(&first);
    let first = json_body(first).await;
    assert_eq!(first["recorded"], true);
    assert_eq!(first["page_views"], 1);

    let cookie = format!("{}; {}", visitor, session);
    let second = h
        .router
        .clone()
        .oneshot(post_json("/api/events", view, Some(&cookie)))
        .await
        .unwrap();
    let second = json_body(second).await;
    assert_eq!(second["page_views"], 2);
    assert_eq!(second["session_id"], first["session_id"]);

    settle(&h.tracker).await;
    let events = h.collector.events();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event["event_type"], "page_view");
        assert_eq!(event["client_id"], client_id.to_string());
        assert_eq!(event["session_id"], first["session_id"]);
        assert_eq!(event["page_url"], "https://dealer.test/models?utm_source=google");
        assert_eq!(event["referrer"], "https://www.google.com/");
        assert_eq!(event["payload"]["page_title"], "Models");
        assert_eq!(event["payload"]["time_on_page"], 1500);
    }
}

#[tokio::test]
async fn events_without_analytics_consent_are_not_recorded() {
    let h = harness(accepted, no_campaign);
    let view = json!({ "type": "page_view", "page_url": "https://dealer.test/" });

    let response = h
        .router
        .oneshot(post_json("/api/events", view, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("epic_session_v2=")));
    let body = json_body(response).await;
    assert_eq!(body, json!({ "recorded": false }));
    assert_eq!(h.tracker.pending(), 0);
}

#[tokio::test]
async fn scroll_milestones_follow_the_session_high_water_mark() {
    let h = harness(accepted, no_campaign);
    let visitor = consenting_visitor(Uuid::new_v4());
    let scroll = |depth: u8| {
        json!({ "type": "scroll_depth", "page_url": "https://dealer.test/offers", "scroll_depth": depth })
    };

    let response = h
        .router
        .clone()
        .oneshot(post_json("/api/events", scroll(60), Some(&visitor)))
        .await
        .unwrap();
    let mut cookie = format!("{}; {}", visitor, session_cookie(&response));
    assert_eq!(json_body(response).await["recorded"], true);

    let response = h
        .router
        .clone()
        .oneshot(post_json("/api/events", scroll(70), Some(&cookie)))
        .await
        .unwrap();
    cookie = format!("{}; {}", visitor, session_cookie(&response));
    assert_eq!(json_body(response).await["recorded"], false);

    let response = h
        .router
        .clone()
        .oneshot(post_json("/api/events", scroll(80), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["recorded"], true);

    settle(&h.tracker).await;
    let names: Vec<Value> = h
        .collector
        .events()
        .iter()
        .map(|e| e["event_name"].clone())
        .collect();
    assert_eq!(names, vec![json!("50%"), json!("75%")]);
}

#[tokio::test]
async fn scroll_event_without_a_depth_is_rejected() {
    let h = harness(accepted, no_campaign);
    let visitor = consenting_visitor(Uuid::new_v4());

    let response = h
        .router
        .oneshot(post_json(
            "/api/events",
            json!({ "type": "scroll_depth", "page_url": "https://dealer.test/" }),
            Some(&visitor),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.tracker.pending(), 0);
}

//=========================================================================================
// Banner, Stats & Legacy Assets
//=========================================================================================

#[tokio::test]
async fn running_campaign_replaces_default_slides() {
    let h = harness(accepted, || {
        let end = Utc::now() + chrono::Duration::days(2) - chrono::Duration::minutes(30);
        Ok(serde_json::from_value(json!({
            "ok": true,
            "data": {
                "banner_url": "https://cdn.test/diwali.jpg",
                "cta_text": "Claim Offer",
                "cta_link": "/offers",
                "end_date": end.to_rfc3339(),
                "status": true
            }
        }))
        .unwrap())
    });

    let response = h.router.oneshot(get("/api/banner")).await.unwrap();
    let body = json_body(response).await;

    assert_eq!(body["campaign_active"], true);
    assert_eq!(body["slides"].as_array().unwrap().len(), 1);
    assert_eq!(body["slides"][0]["desktop_image"], "https://cdn.test/diwali.jpg");
    assert_eq!(body["slides"][0]["mobile_image"], "https://cdn.test/diwali.jpg");
    assert_eq!(body["cta_text"], "Claim Offer");
    assert!(body["countdown"].as_str().unwrap().starts_with("01:23:"));
}

#[tokio::test]
async fn expired_campaign_falls_back_to_defaults() {
    let h = harness(accepted, || {
        let end = Utc::now() - chrono::Duration::hours(1);
        Ok(serde_json::from_value(json!({
            "ok": true,
            "data": [{
                "banner_url": "https://cdn.test/old.jpg",
                "cta_text": "Old",
                "cta_link": "/old",
                "end_date": end.to_rfc3339(),
                "status": true
            }]
        }))
        .unwrap())
    });

    let response = h.router.oneshot(get("/api/banner")).await.unwrap();
    let body = json_body(response).await;

    assert_eq!(body["campaign_active"], false);
    assert_eq!(body["slides"].as_array().unwrap().len(), 6);
    assert!(body["countdown"].is_null());
}

#[tokio::test]
async fn unreachable_banner_backend_uses_fallback_countdown() {
    let h = harness(accepted, || {
        Err(PortError::Unexpected("timed out".to_string()))
    });

    let response = h.router.oneshot(get("/api/banner")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["campaign_active"], false);
    assert_eq!(
        body["slides"][0]["desktop_image"],
        "/assets/Desktop/hycrossdesk.jpg"
    );
    assert!(body["countdown"].as_str().unwrap().starts_with("02:23:"));
}

#[tokio::test]
async fn stats_report_tracker_counters() {
    let h = harness(accepted, no_campaign);

    let response = h.router.oneshot(get("/api/analytics/stats")).await.unwrap();
    let body = json_body(response).await;

    assert_eq!(body["enabled"], true);
    assert_eq!(body["stats"]["delivered"], 0);
    assert_eq!(body["stats"]["pending"], 0);
}

#[tokio::test]
async fn legacy_assets_are_gone_for_good() {
    let h = harness(accepted, no_campaign);

    let response = h
        .router
        .oneshot(get("/api/mg-assets/images/hero/old-fortuner.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(
        response.headers()[CACHE_CONTROL],
        "public, max-age=2592000, immutable"
    );
    assert!(response.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}
