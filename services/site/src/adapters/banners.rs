//! services/site/src/adapters/banners.rs
//!
//! This module contains the adapter for the campaign-banner configuration API.
//! It implements the `BannerService` port from the `core` crate.

use async_trait::async_trait;
use dealer_analytics_core::domain::BannerEnvelope;
use dealer_analytics_core::ports::{BannerService, PortError, PortResult};
use reqwest::{header::CACHE_CONTROL, Client};

/// An adapter that reads the active campaign banner with `reqwest`.
#[derive(Clone)]
pub struct ReqwestBannerClient {
    client: Client,
    url: String,
}

impl ReqwestBannerClient {
    pub fn new(client: Client, api_base: &str) -> Self {
        Self {
            client,
            url: format!(
                "{}/admin/epic-toyota/campaign-banners/active",
                api_base.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait]
impl BannerService for ReqwestBannerClient {
    async fn active_banners(&self) -> PortResult<BannerEnvelope> {
        let response = self
            .client
            .get(&self.url)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "Banner endpoint answered HTTP {}",
                response.status()
            )));
        }

        response
            .json::<BannerEnvelope>()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }
}
