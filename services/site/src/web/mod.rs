pub mod cookies;
pub mod legacy;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use axum::{middleware as axum_middleware, routing::get, routing::post, Router};
use std::sync::Arc;

pub use middleware::identify_visitor;
pub use state::AppState;

/// Builds the API router. CORS and Swagger UI are layered on by the binary.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Routes that read or write visitor cookies
    let visitor_routes = Router::new()
        .route(
            "/api/consent",
            get(rest::get_consent_handler).post(rest::update_consent_handler),
        )
        .route("/api/leads", post(rest::submit_lead_handler))
        .route("/api/contact", post(rest::submit_contact_handler))
        .route("/api/events", post(rest::track_event_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            identify_visitor,
        ));

    let public_routes = Router::new()
        .route("/api/banner", get(rest::banner_handler))
        .route("/api/analytics/stats", get(rest::stats_handler))
        .route("/api/mg-assets/{*path}", get(legacy::legacy_asset_handler));

    Router::new()
        .merge(visitor_routes)
        .merge(public_routes)
        .with_state(app_state)
}
