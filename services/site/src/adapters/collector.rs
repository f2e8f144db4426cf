//! services/site/src/adapters/collector.rs
//!
//! This module contains the adapter for the analytics collector endpoint.
//! It implements the `CollectorTransport` port from the `core` crate.

use async_trait::async_trait;
use bytes::Bytes;
use dealer_analytics_core::ports::{CollectorTransport, PortError, PortResult};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that POSTs serialized event batches to the collector with `reqwest`.
#[derive(Clone)]
pub struct ReqwestCollector {
    client: Client,
    endpoint: String,
    /// Beacon requests that are still on the wire.
    in_flight: TaskTracker,
}

impl ReqwestCollector {
    /// Creates a new `ReqwestCollector`.
    pub fn new(client: Client, endpoint: String) -> Self {
        Self {
            client,
            endpoint,
            in_flight: TaskTracker::new(),
        }
    }

    /// Gives outstanding beacons up to `grace` to finish before the process exits.
    pub async fn drain(&self, grace: Duration) {
        self.in_flight.close();
        if tokio::time::timeout(grace, self.in_flight.wait()).await.is_err() {
            warn!(
                "{} analytics beacons still in flight at shutdown.",
                self.in_flight.len()
            );
        }
    }
}

//=========================================================================================
// `CollectorTransport` Trait Implementation
//=========================================================================================

#[async_trait]
impl CollectorTransport for ReqwestCollector {
    async fn deliver(&self, body: Bytes) -> PortResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(PortError::NotFound(self.endpoint.clone())),
            status => Err(PortError::Unexpected(format!("HTTP {}", status))),
        }
    }

    fn beacon(&self, body: Bytes) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.in_flight.spawn_on(
            async move {
                if let Err(e) = request.send().await {
                    debug!("Analytics beacon failed: {}", e);
                }
            },
            &runtime,
        );
        true
    }
}
