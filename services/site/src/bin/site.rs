//! services/site/src/bin/site.rs

use chrono::Utc;
use dealer_analytics_core::{
    consent,
    domain::{ConsentSettings, UtmParams},
    ports::{CollectorTransport, KeyValueStore},
    SessionManager, Tracker, TrackerConfig, TrackerIdentity,
};
use site_lib::{
    adapters::{FileStore, ReqwestBannerClient, ReqwestCollector, ReqwestLeadClient},
    config::Config,
    error::ApiError,
    web::{build_router, rest::ApiDoc, state::AppState},
};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const BEACON_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open Local Storage ---
    info!("Opening storage at {}", config.storage_path.display());
    let store = Arc::new(FileStore::open(&config.storage_path)?);

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    let collector = config
        .analytics_endpoint
        .clone()
        .map(|endpoint| Arc::new(ReqwestCollector::new(http.clone(), endpoint)));
    let leads = Arc::new(ReqwestLeadClient::new(
        http.clone(),
        config.lead_endpoint.clone(),
        config.lead_api_key.clone(),
        &config.api_base,
    ));
    let banners = Arc::new(ReqwestBannerClient::new(http, &config.api_base));

    // --- 4. Start the Site-level Tracker ---
    let kv: Arc<dyn KeyValueStore> = store.clone();
    let session = SessionManager::new(kv.clone()).resume_or_start(Utc::now(), UtmParams::default());
    let identity = TrackerIdentity {
        client_id: consent::client_id(store.as_ref()),
        session_id: session.id,
    };
    let tracker = Tracker::start(
        identity,
        // Visitor consent is checked per request before anything is tracked.
        ConsentSettings::accept_all(),
        kv,
        collector
            .clone()
            .map(|c| c as Arc<dyn CollectorTransport>),
        TrackerConfig {
            batch_size: config.analytics_batch_size,
            flush_interval: config.analytics_flush_interval,
            ..TrackerConfig::default()
        },
    );

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        tracker: tracker.clone(),
        leads,
        banners,
    });

    let origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "Invalid ALLOWED_ORIGIN '{}': {}",
            config.allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let app = Router::new()
        .merge(build_router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- 8. Hand Off Buffered Events ---
    if tracker.flush_sync() {
        info!("Queued analytics events handed to the collector.");
    }
    if let Some(collector) = &collector {
        collector.drain(BEACON_GRACE).await;
    }
    tracker.shutdown();
    if let Err(e) = store.persist().await {
        error!("Failed to write storage on shutdown: {}", e);
    }
    info!("Server stopped.");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
