//! Integration tests for Brisco.
//!
//! The tests under `tests/` drive the engines the way the storefront
//! does: one visitor's cart, gate, and checkout, wired to scripted
//! service doubles instead of Resend, Supabase, and Stripe.
//!
//! This library holds the shared doubles.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use brisco_core::Email;
use brisco_engine::services::{
    AccessMailer, ChargeReceipt, LeadCapture, LeadStore, PaymentError, PaymentGateway, SendReceipt,
    ServiceError,
};
use brisco_engine::store::{KeyValueStore, StoreError};
use brisco_engine::time::Clock;

/// Mailer double. Counts sends and can be scripted to fail.
#[derive(Debug, Default)]
pub struct ScriptedMailer {
    pub sends: AtomicU32,
    pub fail: AtomicBool,
}

impl ScriptedMailer {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sends: AtomicU32::new(0),
            fail: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn send_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

impl AccessMailer for ScriptedMailer {
    async fn send_access_code(&self, _email: &Email) -> Result<SendReceipt, ServiceError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Api {
                status: 500,
                message: "provider down".to_owned(),
            });
        }
        Ok(SendReceipt {
            message_id: "msg_test".to_owned(),
        })
    }
}

/// Lead-store double. The first capture of any email succeeds, every
/// later one reports a duplicate, like a unique-constrained table.
#[derive(Debug, Default)]
pub struct ScriptedLeads {
    captures: std::sync::Mutex<Vec<String>>,
}

impl ScriptedLeads {
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.captures.lock().map(|seen| seen.len()).unwrap_or(0)
    }
}

impl LeadStore for ScriptedLeads {
    async fn record_lead(&self, email: &Email, _source: &str) -> Result<LeadCapture, ServiceError> {
        let mut seen = self
            .captures
            .lock()
            .map_err(|_| ServiceError::Transport("lead store poisoned".to_owned()))?;
        let duplicate = seen.iter().any(|e| e == email.as_str());
        if !duplicate {
            seen.push(email.as_str().to_owned());
        }
        Ok(LeadCapture {
            captured: true,
            duplicate,
        })
    }
}

/// Gateway double. Counts charges, optionally declines, optionally
/// sleeps to widen the window a second submission could race into.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    pub charges: AtomicU32,
    pub decline: AtomicBool,
    pub delay_ms: u64,
}

impl ScriptedGateway {
    #[must_use]
    pub fn slow(delay_ms: u64) -> Self {
        Self {
            charges: AtomicU32::new(0),
            decline: AtomicBool::new(false),
            delay_ms,
        }
    }

    #[must_use]
    pub fn charge_count(&self) -> u32 {
        self.charges.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for ScriptedGateway {
    async fn charge(
        &self,
        _amount_cents: i64,
        _currency: &str,
        _billing: &brisco_engine::services::BillingDetails,
        _card_token: &str,
    ) -> Result<ChargeReceipt, PaymentError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let n = self.charges.fetch_add(1, Ordering::SeqCst) + 1;
        if self.decline.load(Ordering::SeqCst) {
            return Err(PaymentError::Declined {
                reason: "card declined".to_owned(),
            });
        }
        Ok(ChargeReceipt {
            transaction_id: format!("pi_test_{n}"),
        })
    }
}

/// Store whose clones share one backing map, like two page loads
/// sharing the same browser storage.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    entries: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, String>>>,
}

impl SharedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store poisoned".to_owned()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store poisoned".to_owned()))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("store poisoned".to_owned()))?;
        entries.remove(key);
        Ok(())
    }
}

/// Settable clock shared across gate instances.
#[derive(Debug, Default)]
pub struct SharedClock {
    now_ms: AtomicI64,
}

impl SharedClock {
    #[must_use]
    pub fn at(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for &SharedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
