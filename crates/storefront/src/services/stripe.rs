//! Stripe payment gateway client.
//!
//! Creates and confirms a payment intent for the checkout's full-payment
//! path. Card declines map to [`PaymentError::Declined`] with the
//! customer-facing reason; everything else is a gateway error.

use brisco_engine::services::{BillingDetails, ChargeReceipt, PaymentError, PaymentGateway};
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::StripeConfig;

/// Stripe API base URL.
const BASE_URL: &str = "https://api.stripe.com/v1";

/// Request timeout, generous because a charge in flight should not be
/// abandoned lightly.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Stripe payment gateway client.
///
/// Built from an optional config: without credentials the gateway is
/// disabled and every charge reports itself unavailable.
#[derive(Clone)]
pub struct StripeGateway {
    inner: Option<Inner>,
}

#[derive(Clone)]
struct Inner {
    client: reqwest::Client,
}

/// Successful payment-intent response body, reduced to what we keep.
#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
}

/// Stripe error envelope.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: String,
    message: Option<String>,
}

impl StripeGateway {
    /// Create a Stripe client.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::Gateway`] if the HTTP client fails to build.
    pub fn new(config: Option<&StripeConfig>) -> Result<Self, PaymentError> {
        let Some(config) = config else {
            tracing::warn!("STRIPE_SECRET_KEY not set; payment gateway disabled");
            return Ok(Self { inner: None });
        };

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|e| PaymentError::Gateway(format!("Invalid secret key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        Ok(Self {
            inner: Some(Inner { client }),
        })
    }
}

impl PaymentGateway for StripeGateway {
    async fn charge(
        &self,
        amount_cents: i64,
        currency: &str,
        billing: &BillingDetails,
        card_token: &str,
    ) -> Result<ChargeReceipt, PaymentError> {
        let Some(inner) = &self.inner else {
            return Err(PaymentError::Gateway(
                "payment gateway not configured".to_owned(),
            ));
        };

        let amount = amount_cents.to_string();
        let params: Vec<(&str, &str)> = vec![
            ("amount", amount.as_str()),
            ("currency", currency),
            ("payment_method", card_token),
            ("confirm", "true"),
            ("description", "Brisco order"),
            ("receipt_email", billing.email.as_str()),
            ("shipping[name]", billing.name.as_str()),
            ("shipping[address][line1]", billing.address_line1.as_str()),
            ("shipping[address][city]", billing.city.as_str()),
            ("shipping[address][state]", billing.state.as_str()),
            (
                "shipping[address][postal_code]",
                billing.postal_code.as_str(),
            ),
            // Confirming server-side without a return URL; card payments only.
            ("automatic_payment_methods[enabled]", "true"),
            ("automatic_payment_methods[allow_redirects]", "never"),
        ];

        let response = inner
            .client
            .post(format!("{BASE_URL}/payment_intents"))
            .form(&params)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !status.is_success() {
            if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
                if envelope.error.kind == "card_error" {
                    return Err(PaymentError::Declined {
                        reason: envelope
                            .error
                            .message
                            .unwrap_or_else(|| "Your card was declined.".to_owned()),
                    });
                }
                return Err(PaymentError::Gateway(format!(
                    "{}: {}",
                    envelope.error.kind,
                    envelope.error.message.unwrap_or_default()
                )));
            }
            return Err(PaymentError::Gateway(format!("{status}: {body}")));
        }

        let intent: PaymentIntent =
            serde_json::from_str(&body).map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if intent.status != "succeeded" {
            // requires_action and friends are not supported in this flow
            return Err(PaymentError::Declined {
                reason: format!("Payment not completed (status: {})", intent.status),
            });
        }

        tracing::info!(transaction_id = %intent.id, "Charge succeeded");
        Ok(ChargeReceipt {
            transaction_id: intent.id,
        })
    }
}
