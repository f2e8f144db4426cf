//! crates/dealer_analytics_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the site's core logic.
//! These traits form the boundary of the hexagonal architecture: browser-style
//! storage, cookies, the analytics collector and the lead/banner backends are
//! all injected as capabilities instead of being reached for globally.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use crate::domain::{BannerEnvelope, ContactRequest, LeadReceipt, LeadSubmission};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., filesystem, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The remote resource is absent. For the collector this means analytics is disabled.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A backend understood the request and declined it.
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

/// A synchronous string key/value store, shaped like browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> PortResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> PortResult<()>;
    fn remove_item(&self, key: &str) -> PortResult<()>;
}

/// A cookie jar. Values are handed over decoded; encoding is the jar's business.
pub trait CookieJar: Send + Sync {
    fn get_cookie(&self, name: &str) -> Option<String>;
    fn set_cookie(&self, name: &str, value: &str, max_age: Duration) -> PortResult<()>;
    fn remove_cookie(&self, name: &str) -> PortResult<()>;
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CollectorTransport: Send + Sync {
    /// POSTs an already-serialized JSON body to the collector.
    /// A 404 must surface as `PortError::NotFound`.
    async fn deliver(&self, body: Bytes) -> PortResult<()>;

    /// Hands the body off without waiting for, or being able to observe, the outcome.
    /// Returns whether the hand-off itself was accepted.
    fn beacon(&self, body: Bytes) -> bool;
}

#[async_trait]
pub trait LeadService: Send + Sync {
    /// Submits the quick lead form. Success is judged by HTTP status.
    async fn submit_lead(&self, lead: &LeadSubmission) -> PortResult<LeadReceipt>;

    /// Submits the contact form. Success is judged by the `ok` field of the answer.
    async fn submit_contact(&self, contact: &ContactRequest) -> PortResult<LeadReceipt>;
}

#[async_trait]
pub trait BannerService: Send + Sync {
    /// Fetches the currently configured campaign banner(s).
    async fn active_banners(&self) -> PortResult<BannerEnvelope>;
}
