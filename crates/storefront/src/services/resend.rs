//! Resend API client for access-code email delivery.
//!
//! Sends the storefront access code to prospective customers. Delivery
//! failures are soft by contract: the gate logs a warning and the visitor
//! proceeds to code entry regardless.

use brisco_core::Email;
use brisco_engine::services::{AccessMailer, SendReceipt, ServiceError};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::ResendConfig;

/// Resend API base URL.
const BASE_URL: &str = "https://api.resend.com";

/// Request timeout. Email failure is non-fatal, so fail fast.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Subject line for the access-code email.
const SUBJECT: &str = "Your Brisco Access Code";

/// Resend API client.
///
/// Built from an optional config: without credentials the client is
/// disabled and every send reports [`ServiceError::Disabled`].
#[derive(Clone)]
pub struct ResendMailer {
    inner: Option<Inner>,
    access_code: String,
}

#[derive(Clone)]
struct Inner {
    client: reqwest::Client,
    from: String,
}

/// Successful send response body.
#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl ResendMailer {
    /// Create a Resend client. `access_code` is the code included in the
    /// email body.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client fails to build.
    pub fn new(config: Option<&ResendConfig>, access_code: &str) -> Result<Self, ServiceError> {
        let Some(config) = config else {
            tracing::warn!("RESEND_API_KEY not set; access-code email disabled");
            return Ok(Self {
                inner: None,
                access_code: access_code.to_owned(),
            });
        };

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| ServiceError::Transport(format!("Invalid API key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            inner: Some(Inner {
                client,
                from: config.from.clone(),
            }),
            access_code: access_code.to_owned(),
        })
    }

    fn email_html(&self) -> String {
        format!(
            "<div style=\"font-family: 'Courier New', monospace; background: #000; color: #fff; padding: 40px; text-align: center;\">\
             <h1 style=\"letter-spacing: 4px;\">BRISCO</h1>\
             <p>Your access code:</p>\
             <p style=\"font-size: 28px; letter-spacing: 6px;\"><strong>{}</strong></p>\
             <p>Valid for 24 hours after entry.</p>\
             </div>",
            self.access_code
        )
    }
}

impl AccessMailer for ResendMailer {
    async fn send_access_code(&self, email: &Email) -> Result<SendReceipt, ServiceError> {
        let Some(inner) = &self.inner else {
            return Err(ServiceError::Disabled);
        };

        let body = serde_json::json!({
            "from": inner.from,
            "to": [email.as_str()],
            "subject": SUBJECT,
            "html": self.email_html(),
        });

        let response = inner
            .client
            .post(format!("{BASE_URL}/emails"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        tracing::info!(message_id = %sent.id, "Access-code email dispatched");
        Ok(SendReceipt {
            message_id: sent.id,
        })
    }
}
