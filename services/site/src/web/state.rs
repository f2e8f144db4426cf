//! services/site/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use dealer_analytics_core::ports::{BannerService, LeadService};
use dealer_analytics_core::Tracker;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// The site-level event buffer. Disabled when no collector is configured.
    pub tracker: Tracker,
    pub leads: Arc<dyn LeadService>,
    pub banners: Arc<dyn BannerService>,
}
