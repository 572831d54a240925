//! Access gate: email-then-code entry to the storefront.
//!
//! Two gate implementations existed historically - a single-step
//! password-only teaser and the two-step email-then-code flow. The two-step
//! flow is canonical here; the single-step variant's 24 hour session window
//! and code handling are folded in rather than carried as a second gate.
//!
//! The access-code send is deliberately non-blocking: the gate transitions
//! to the code prompt whether or not the email provider accepted the send,
//! and a failed send surfaces only as a soft warning. Lead capture rides on
//! the same submission and is likewise non-fatal.

use brisco_core::{Email, EmailError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::{AccessMailer, LeadStore};
use crate::store::{self, KeyValueStore};
use crate::time::Clock;

/// Namespace key the access session persists under.
pub const ACCESS_STORAGE_KEY: &str = "brisco-access";

/// Lead source recorded for gate submissions.
const LEAD_SOURCE: &str = "homepage_auth";

/// Gate configuration. Defaults match the production storefront.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// The access code mailed to customers. Compared case-sensitively.
    pub primary_code: String,
    /// Earlier code still honored, compared case-insensitively.
    pub legacy_alias: String,
    /// How long a granted session stays valid.
    pub session_ttl: chrono::Duration,
    /// Key the session persists under.
    pub storage_key: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            primary_code: "light2025".to_owned(),
            legacy_alias: "brisco2025".to_owned(),
            session_ttl: chrono::Duration::hours(24),
            storage_key: ACCESS_STORAGE_KEY.to_owned(),
        }
    }
}

/// Where the visitor is in the gate flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum GateState {
    /// Prompting for an email address.
    EmailEntry,
    /// Email accepted, prompting for the mailed access code.
    PasswordEntry {
        /// The submitted email, shown back to the visitor.
        email: Email,
    },
    /// Storefront unlocked for this session.
    Granted,
}

/// Persisted record of a granted session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessSession {
    granted: bool,
    granted_at_ms: i64,
    email: Option<Email>,
}

/// Outcome of the access-code dispatch, reported as a soft status.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The provider accepted the send.
    Sent {
        /// Provider-assigned message identifier.
        message_id: String,
    },
    /// The send failed; the visitor may proceed anyway.
    Failed,
}

/// Errors the gate surfaces to the visitor.
#[derive(Debug, Error)]
pub enum GateError {
    /// The submitted email is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The submitted code does not match.
    #[error("incorrect access code")]
    IncorrectCode,

    /// A code was submitted while the gate was not prompting for one.
    #[error("not awaiting an access code")]
    NotAwaitingCode,

    /// An email was submitted after access was already granted.
    #[error("access already granted")]
    AlreadyGranted,
}

/// The access gate state machine.
#[derive(Debug)]
pub struct AccessGate<S: KeyValueStore, C: Clock> {
    state: GateState,
    config: GateConfig,
    store: S,
    clock: C,
}

impl<S: KeyValueStore, C: Clock> AccessGate<S, C> {
    /// Construct the gate and immediately check for an existing session,
    /// short-circuiting to `Granted` when one is still valid.
    pub fn new(store: S, clock: C) -> Self {
        Self::with_config(store, clock, GateConfig::default())
    }

    /// Construct with explicit configuration.
    pub fn with_config(store: S, clock: C, config: GateConfig) -> Self {
        let mut gate = Self {
            state: GateState::EmailEntry,
            config,
            store,
            clock,
        };
        gate.check_existing_session();
        gate
    }

    /// The current gate state.
    #[must_use]
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Whether the storefront is unlocked.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self.state, GateState::Granted)
    }

    /// Submit an email address.
    ///
    /// On a valid email the gate transitions to the code prompt and then
    /// dispatches the access-code send and the lead capture. Neither call
    /// blocks the transition: a failed send is reported as
    /// [`SendOutcome::Failed`], a failed or duplicate lead capture is
    /// logged and swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidEmail`] for a malformed address (the
    /// state stays at `EmailEntry`), or [`GateError::AlreadyGranted`] when
    /// the session is already unlocked; a granted session stays granted
    /// until it expires.
    pub async fn submit_email(
        &mut self,
        raw: &str,
        mailer: &impl AccessMailer,
        leads: &impl LeadStore,
    ) -> Result<SendOutcome, GateError> {
        if self.is_granted() {
            return Err(GateError::AlreadyGranted);
        }
        let email = Email::parse(raw.trim())?;

        self.state = GateState::PasswordEntry {
            email: email.clone(),
        };

        match leads.record_lead(&email, LEAD_SOURCE).await {
            Ok(capture) if capture.duplicate => {
                tracing::debug!(email = %email, "Lead already captured");
            }
            Ok(_) => {
                tracing::info!(email = %email, "Lead captured");
            }
            Err(e) => {
                tracing::warn!(email = %email, error = %e, "Lead capture failed (non-fatal)");
            }
        }

        match mailer.send_access_code(&email).await {
            Ok(receipt) => {
                tracing::info!(email = %email, message_id = %receipt.message_id, "Access code sent");
                Ok(SendOutcome::Sent {
                    message_id: receipt.message_id,
                })
            }
            Err(e) => {
                // Deliberate: the send failing must not lock the visitor out.
                tracing::warn!(email = %email, error = %e, "Access code send failed (non-fatal)");
                Ok(SendOutcome::Failed)
            }
        }
    }

    /// Submit the mailed access code.
    ///
    /// The primary code matches case-sensitively; the legacy alias matches
    /// case-insensitively. On a match the gate is granted and the session
    /// persisted with the current timestamp.
    ///
    /// # Errors
    ///
    /// [`GateError::IncorrectCode`] on a mismatch (state stays at the code
    /// prompt; the caller clears the input), [`GateError::NotAwaitingCode`]
    /// when no code is expected.
    pub fn submit_code(&mut self, code: &str) -> Result<(), GateError> {
        let GateState::PasswordEntry { email } = &self.state else {
            return Err(GateError::NotAwaitingCode);
        };

        let code = code.trim();
        let matches_primary = code == self.config.primary_code;
        let matches_alias = code.to_lowercase() == self.config.legacy_alias.to_lowercase();
        if !matches_primary && !matches_alias {
            return Err(GateError::IncorrectCode);
        }

        let session = AccessSession {
            granted: true,
            granted_at_ms: self.clock.now_ms(),
            email: Some(email.clone()),
        };
        store::persist(&mut self.store, &self.config.storage_key, &session);

        tracing::info!(email = %email, "Access granted");
        self.state = GateState::Granted;
        Ok(())
    }

    /// Return from the code prompt to the email prompt.
    pub fn back(&mut self) {
        if matches!(self.state, GateState::PasswordEntry { .. }) {
            self.state = GateState::EmailEntry;
        }
    }

    /// Re-evaluate the persisted session: a session within the TTL grants
    /// immediately, an expired or corrupt one is cleared.
    pub fn check_existing_session(&mut self) {
        let raw = match self.store.get(&self.config.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Session store unavailable, starting at email entry");
                return;
            }
        };

        let session: AccessSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Corrupt access session, clearing");
                self.clear_session();
                return;
            }
        };

        let age_ms = self.clock.now_ms() - session.granted_at_ms;
        if session.granted && age_ms < self.config.session_ttl.num_milliseconds() {
            self.state = GateState::Granted;
        } else {
            self.clear_session();
            self.state = GateState::EmailEntry;
        }
    }

    fn clear_session(&mut self) {
        if let Err(e) = self.store.remove(&self.config.storage_key) {
            tracing::warn!(error = %e, "Failed to clear access session");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::{LeadCapture, SendReceipt, ServiceError};
    use crate::store::MemoryStore;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Clock double whose reading can be moved forward.
    #[derive(Debug, Default)]
    struct TestClock {
        now_ms: Cell<i64>,
    }

    impl TestClock {
        fn advance_hours(&self, hours: i64) {
            self.now_ms.set(self.now_ms.get() + hours * 60 * 60 * 1000);
        }
    }

    impl Clock for &TestClock {
        fn now_ms(&self) -> i64 {
            self.now_ms.get()
        }
    }

    /// Mailer double: counts sends, optionally fails them.
    #[derive(Debug, Default)]
    struct TestMailer {
        sends: AtomicU32,
        fail: AtomicBool,
    }

    impl AccessMailer for TestMailer {
        async fn send_access_code(&self, _email: &Email) -> Result<SendReceipt, ServiceError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ServiceError::Transport("connection refused".to_owned()));
            }
            Ok(SendReceipt {
                message_id: "msg_1".to_owned(),
            })
        }
    }

    /// Lead store double: reports every second capture as a duplicate.
    #[derive(Debug, Default)]
    struct TestLeads {
        captures: AtomicU32,
    }

    impl LeadStore for TestLeads {
        async fn record_lead(&self, _email: &Email, _source: &str) -> Result<LeadCapture, ServiceError> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(LeadCapture {
                captured: true,
                duplicate: n > 0,
            })
        }
    }

    fn gate<'a>(store: MemoryStore, clock: &'a TestClock) -> AccessGate<MemoryStore, &'a TestClock> {
        AccessGate::new(store, clock)
    }

    #[tokio::test]
    async fn test_valid_email_advances_to_code_prompt() {
        let clock = TestClock::default();
        let mut gate = gate(MemoryStore::new(), &clock);
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        let outcome = gate
            .submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();

        assert!(matches!(outcome, SendOutcome::Sent { .. }));
        assert!(matches!(gate.state(), GateState::PasswordEntry { .. }));
        assert_eq!(mailer.sends.load(Ordering::SeqCst), 1);
        assert_eq!(leads.captures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_email_stays_at_email_entry() {
        let clock = TestClock::default();
        let mut gate = gate(MemoryStore::new(), &clock);
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        for bad in ["", "no-at", "user@nodot", "sp ace@x.com"] {
            let result = gate.submit_email(bad, &mailer, &leads).await;
            assert!(matches!(result, Err(GateError::InvalidEmail(_))), "{bad}");
            assert_eq!(*gate.state(), GateState::EmailEntry);
        }
        assert_eq!(mailer.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_block_progress() {
        let clock = TestClock::default();
        let mut gate = gate(MemoryStore::new(), &clock);
        let mailer = TestMailer::default();
        mailer.fail.store(true, Ordering::SeqCst);
        let leads = TestLeads::default();

        let outcome = gate
            .submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();

        assert!(matches!(outcome, SendOutcome::Failed));
        assert!(matches!(gate.state(), GateState::PasswordEntry { .. }));
    }

    #[tokio::test]
    async fn test_code_matching() {
        let clock = TestClock::default();
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        // Primary is case-sensitive.
        let mut gate = gate(MemoryStore::new(), &clock);
        gate.submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();
        assert!(matches!(
            gate.submit_code("LIGHT2025"),
            Err(GateError::IncorrectCode)
        ));
        assert!(matches!(gate.state(), GateState::PasswordEntry { .. }));
        gate.submit_code("light2025").unwrap();
        assert!(gate.is_granted());

        // Legacy alias is case-insensitive.
        let mut gate2 = AccessGate::new(MemoryStore::new(), &clock);
        gate2
            .submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();
        gate2.submit_code("BRISCO2025").unwrap();
        assert!(gate2.is_granted());
    }

    #[tokio::test]
    async fn test_granted_session_ignores_email_resubmission() {
        let clock = TestClock::default();
        let mut gate = gate(MemoryStore::new(), &clock);
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        gate.submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();
        gate.submit_code("light2025").unwrap();
        assert!(gate.is_granted());

        // A granted session is terminal until expiry: a second email must
        // not demote the visitor back to the code prompt.
        let result = gate.submit_email("other@example.com", &mailer, &leads).await;
        assert!(matches!(result, Err(GateError::AlreadyGranted)));
        assert!(gate.is_granted());
        assert_eq!(mailer.sends.load(Ordering::SeqCst), 1);
        assert_eq!(leads.captures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_code_without_prompt_rejected() {
        let clock = TestClock::default();
        let mut gate = gate(MemoryStore::new(), &clock);
        assert!(matches!(
            gate.submit_code("light2025"),
            Err(GateError::NotAwaitingCode)
        ));
    }

    #[tokio::test]
    async fn test_back_returns_to_email_entry() {
        let clock = TestClock::default();
        let mut gate = gate(MemoryStore::new(), &clock);
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        gate.submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();
        gate.back();
        assert_eq!(*gate.state(), GateState::EmailEntry);
    }

    #[tokio::test]
    async fn test_session_survives_within_24_hours() {
        let clock = TestClock::default();
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        let mut gate = AccessGate::new(MemoryStore::new(), &clock);
        gate.submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();
        gate.submit_code("light2025").unwrap();

        // Same backing store, 23 hours later: granted without re-prompting.
        let store = gate.store.clone();
        clock.advance_hours(23);
        let revived = AccessGate::new(store, &clock);
        assert!(revived.is_granted());
    }

    #[tokio::test]
    async fn test_session_expires_after_24_hours() {
        let clock = TestClock::default();
        let mailer = TestMailer::default();
        let leads = TestLeads::default();

        let mut gate = AccessGate::new(MemoryStore::new(), &clock);
        gate.submit_email("fan@example.com", &mailer, &leads)
            .await
            .unwrap();
        gate.submit_code("light2025").unwrap();

        let store = gate.store.clone();
        clock.advance_hours(25);
        let revived = AccessGate::new(store, &clock);

        assert_eq!(*revived.state(), GateState::EmailEntry);
        // The stale session is cleared, not just ignored.
        assert_eq!(revived.store.get(ACCESS_STORAGE_KEY).unwrap(), None);
    }

    #[test]
    fn test_corrupt_session_cleared() {
        let clock = TestClock::default();
        let mut store = MemoryStore::new();
        store.set(ACCESS_STORAGE_KEY, "%%%").unwrap();

        let gate = AccessGate::new(store, &clock);
        assert_eq!(*gate.state(), GateState::EmailEntry);
        assert_eq!(gate.store.get(ACCESS_STORAGE_KEY).unwrap(), None);
    }
}
