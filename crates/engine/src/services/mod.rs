//! Contracts for the external collaborators the engines call.
//!
//! The engine never talks to the network itself; the storefront supplies
//! implementations of these traits (Resend for access-code email, Supabase
//! for lead capture, Stripe for payment). Tests supply counting doubles.
//!
//! Failure semantics differ per service and are part of the contract:
//! email-send and lead-capture failures are non-fatal (logged, user
//! proceeds), payment failures are fatal to the current attempt only.

use std::future::Future;

use brisco_core::Email;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the email-send and lead-capture services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never completed (network, timeout, TLS).
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with an error response.
    #[error("service error: {status} - {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Response body or error description.
        message: String,
    },

    /// The service is not configured and the call was skipped.
    #[error("service not configured")]
    Disabled,
}

/// Errors from the payment gateway. Fatal to the current payment attempt.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The gateway declined the charge, with a human-readable reason.
    #[error("payment declined: {reason}")]
    Declined {
        /// Reason suitable for showing to the customer.
        reason: String,
    },

    /// The gateway could not be reached or returned garbage.
    #[error("payment gateway error: {0}")]
    Gateway(String),
}

/// Receipt for a dispatched access-code email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider-assigned message identifier.
    pub message_id: String,
}

/// Result of a lead-capture attempt.
///
/// A duplicate email is a successful capture: the lead is already in the
/// system, which is what we wanted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadCapture {
    /// Whether the lead is now present in the store.
    pub captured: bool,
    /// Whether the lead already existed before this call.
    pub duplicate: bool,
}

/// Receipt for a successful charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeReceipt {
    /// Gateway-assigned transaction identifier.
    pub transaction_id: String,
}

/// Billing details forwarded to the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingDetails {
    /// Cardholder full name.
    pub name: String,
    /// Customer email address.
    pub email: Email,
    /// Street address.
    pub address_line1: String,
    /// City.
    pub city: String,
    /// State or province.
    pub state: String,
    /// Postal code.
    pub postal_code: String,
}

/// Sends the storefront access code to a prospective customer.
pub trait AccessMailer {
    /// Dispatch the access-code email.
    fn send_access_code(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<SendReceipt, ServiceError>> + Send;
}

/// Records captured leads. Capture must be idempotent per email.
pub trait LeadStore {
    /// Record a lead with its acquisition source.
    fn record_lead(
        &self,
        email: &Email,
        source: &str,
    ) -> impl Future<Output = Result<LeadCapture, ServiceError>> + Send;
}

/// Charges the customer. The only call whose failure is fatal to the
/// current attempt.
pub trait PaymentGateway {
    /// Charge `amount_cents` in `currency` against `card_token`.
    fn charge(
        &self,
        amount_cents: i64,
        currency: &str,
        billing: &BillingDetails,
        card_token: &str,
    ) -> impl Future<Output = Result<ChargeReceipt, PaymentError>> + Send;
}
