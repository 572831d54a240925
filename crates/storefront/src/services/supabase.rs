//! Supabase PostgREST client for lead capture.
//!
//! Inserts captured emails into the `leads` table. A duplicate email
//! (unique-violation conflict) counts as a successful capture: the lead
//! is already in the system.

use brisco_core::Email;
use brisco_engine::services::{LeadCapture, LeadStore, ServiceError};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;

use crate::config::SupabaseConfig;

/// Table receiving captured leads.
const LEADS_TABLE: &str = "leads";

/// Postgres unique-violation code, surfaced in PostgREST error bodies.
const UNIQUE_VIOLATION: &str = "23505";

/// Request timeout. Lead capture is non-fatal, so fail fast.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Supabase PostgREST client.
///
/// Built from an optional config: without credentials the client is
/// disabled and every capture reports [`ServiceError::Disabled`].
#[derive(Clone)]
pub struct SupabaseLeads {
    inner: Option<Inner>,
}

#[derive(Clone)]
struct Inner {
    client: reqwest::Client,
    base_url: String,
}

impl SupabaseLeads {
    /// Create a Supabase lead-capture client.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client fails to build.
    pub fn new(config: Option<&SupabaseConfig>) -> Result<Self, ServiceError> {
        let Some(config) = config else {
            tracing::warn!("SUPABASE_URL not set; lead capture disabled");
            return Ok(Self { inner: None });
        };

        let key = config.anon_key.expose_secret();
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(key)
                .map_err(|e| ServiceError::Transport(format!("Invalid anon key format: {e}")))?,
        );
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ServiceError::Transport(format!("Invalid anon key format: {e}")))?,
        );
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            inner: Some(Inner {
                client,
                base_url: config.url.trim_end_matches('/').to_owned(),
            }),
        })
    }
}

impl LeadStore for SupabaseLeads {
    async fn record_lead(&self, email: &Email, source: &str) -> Result<LeadCapture, ServiceError> {
        let Some(inner) = &self.inner else {
            return Err(ServiceError::Disabled);
        };

        let body = serde_json::json!({
            "email": email.as_str(),
            "source": source,
        });

        let response = inner
            .client
            .post(format!("{}/rest/v1/{LEADS_TABLE}", inner.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(source, "Lead captured");
            return Ok(LeadCapture {
                captured: true,
                duplicate: false,
            });
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT || message.contains(UNIQUE_VIOLATION) {
            tracing::debug!(source, "Lead already captured");
            return Ok(LeadCapture {
                captured: true,
                duplicate: true,
            });
        }

        Err(ServiceError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
