//! services/site/src/adapters/leads.rs
//!
//! This module contains the adapter for the two lead-intake backends.
//! It implements the `LeadService` port from the `core` crate.

use async_trait::async_trait;
use dealer_analytics_core::domain::{ContactRequest, LeadReceipt, LeadSubmission};
use dealer_analytics_core::ports::{LeadService, PortError, PortResult};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_REJECTION: &str = "Something went wrong";

/// What either backend may answer with. Both fields are optional because the
/// managed function only promises a status code.
#[derive(Debug, Default, Deserialize)]
struct LeadResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that forwards form submissions with `reqwest`.
#[derive(Clone)]
pub struct ReqwestLeadClient {
    client: Client,
    /// The managed function receiving quick lead-form submissions.
    lead_endpoint: Option<String>,
    lead_api_key: Option<String>,
    /// The admin API route receiving contact-form submissions.
    contact_url: String,
}

impl ReqwestLeadClient {
    /// Creates a new `ReqwestLeadClient`.
    pub fn new(
        client: Client,
        lead_endpoint: Option<String>,
        lead_api_key: Option<String>,
        api_base: &str,
    ) -> Self {
        Self {
            client,
            lead_endpoint,
            lead_api_key,
            contact_url: format!("{}/admin/epic-toyota/leads", api_base.trim_end_matches('/')),
        }
    }
}

//=========================================================================================
// `LeadService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LeadService for ReqwestLeadClient {
    async fn submit_lead(&self, lead: &LeadSubmission) -> PortResult<LeadReceipt> {
        let endpoint = self
            .lead_endpoint
            .as_ref()
            .ok_or_else(|| PortError::NotFound("LEAD_ENDPOINT is not configured".to_string()))?;

        let mut request = self.client.post(endpoint).json(lead);
        if let Some(key) = &self.lead_api_key {
            request = request.header("x-api-key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let status = response.status();
        // The body is informational only; an unreadable one is not a failure.
        let body: LeadResponse = response.json().await.unwrap_or_default();

        if status.is_success() {
            Ok(LeadReceipt {
                ok: true,
                message: body.message,
            })
        } else if status.is_client_error() {
            Err(PortError::Rejected(
                body.message.unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
            ))
        } else {
            Err(PortError::Unexpected(format!("Lead endpoint answered HTTP {}", status)))
        }
    }

    async fn submit_contact(&self, contact: &ContactRequest) -> PortResult<LeadReceipt> {
        let response = self
            .client
            .post(&self.contact_url)
            .json(contact)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Success here is the body's `ok` flag, not the status code.
        let body: LeadResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if body.ok == Some(true) {
            Ok(LeadReceipt {
                ok: true,
                message: body.message,
            })
        } else {
            Err(PortError::Rejected(
                body.message.unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
            ))
        }
    }
}
