//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use brisco_core::ProductId;
use brisco_engine::cart::{CartEngine, ProductOffer};
use brisco_engine::checkout::{CheckoutFlow, ScarcityQueue};
use brisco_engine::gate::{AccessGate, GateConfig};
use brisco_engine::store::MemoryStore;
use brisco_engine::time::SystemClock;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::BriscoConfig;
use crate::error::AppError;
use crate::services::{ResendMailer, StripeGateway, SupabaseLeads};

/// Session cookie key holding the shop-session id.
const SHOP_ID_KEY: &str = "shop_id";

/// How long an idle shop session survives in the cache.
const SESSION_IDLE: Duration = Duration::from_secs(48 * 60 * 60);

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("mailer setup failed: {0}")]
    Mailer(brisco_engine::services::ServiceError),
    #[error("lead store setup failed: {0}")]
    Leads(brisco_engine::services::ServiceError),
    #[error("payment gateway setup failed: {0}")]
    Gateway(brisco_engine::services::PaymentError),
}

/// One visitor's engines, serialized behind a mutex.
///
/// The engines persist into a per-session [`MemoryStore`], so cart and
/// access state live as long as the visitor's session cookie.
pub struct ShopSession {
    pub cart: CartEngine<MemoryStore>,
    pub gate: AccessGate<MemoryStore, SystemClock>,
    pub checkout: CheckoutFlow<ScarcityQueue>,
}

impl ShopSession {
    fn new() -> Self {
        Self {
            cart: CartEngine::new(MemoryStore::new()),
            gate: AccessGate::new(MemoryStore::new(), SystemClock),
            checkout: CheckoutFlow::new(ScarcityQueue::default()),
        }
    }
}

/// Handle to one visitor's shop session.
pub type SessionHandle = Arc<Mutex<ShopSession>>;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like service clients and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BriscoConfig,
    mailer: ResendMailer,
    leads: SupabaseLeads,
    gateway: StripeGateway,
    catalog: Vec<ProductOffer>,
    sessions: moka::future::Cache<Uuid, SessionHandle>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if any service client fails to build.
    pub fn new(config: BriscoConfig) -> Result<Self, StateError> {
        let gate_config = GateConfig::default();
        let mailer = ResendMailer::new(config.resend.as_ref(), &gate_config.primary_code)
            .map_err(StateError::Mailer)?;
        let leads = SupabaseLeads::new(config.supabase.as_ref()).map_err(StateError::Leads)?;
        let gateway = StripeGateway::new(config.stripe.as_ref()).map_err(StateError::Gateway)?;

        let sessions = moka::future::Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(SESSION_IDLE)
            .build();

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                mailer,
                leads,
                gateway,
                catalog: catalog(),
                sessions,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &BriscoConfig {
        &self.inner.config
    }

    /// Get a reference to the access-code mailer.
    #[must_use]
    pub fn mailer(&self) -> &ResendMailer {
        &self.inner.mailer
    }

    /// Get a reference to the lead store.
    #[must_use]
    pub fn leads(&self) -> &SupabaseLeads {
        &self.inner.leads
    }

    /// Get a reference to the payment gateway.
    #[must_use]
    pub fn gateway(&self) -> &StripeGateway {
        &self.inner.gateway
    }

    /// The current drop's offers.
    #[must_use]
    pub fn catalog(&self) -> &[ProductOffer] {
        &self.inner.catalog
    }

    /// Look up an offer by id.
    #[must_use]
    pub fn find_product(&self, id: ProductId) -> Option<&ProductOffer> {
        self.inner.catalog.iter().find(|offer| offer.id == id)
    }

    /// Resolve the visitor's shop session, creating one on first contact.
    ///
    /// The session cookie carries only an opaque id; the engines live in
    /// the in-process cache under that id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Internal`] if the cookie session store fails.
    pub async fn shop(&self, session: &tower_sessions::Session) -> Result<SessionHandle, AppError> {
        let id = match session
            .get::<Uuid>(SHOP_ID_KEY)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
        {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                session
                    .insert(SHOP_ID_KEY, id)
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                id
            }
        };

        let handle = self
            .inner
            .sessions
            .get_with(id, async { Arc::new(Mutex::new(ShopSession::new())) })
            .await;
        Ok(handle)
    }
}

/// The current drop. A single shirt, priced per the tier table's
/// single-unit rate.
fn catalog() -> Vec<ProductOffer> {
    vec![ProductOffer {
        id: ProductId::new(1),
        name: "Brisco Lightning Tee".to_owned(),
        list_price: Decimal::from(65),
        image_ref: "/images/shirt-front.png".to_owned(),
    }]
}
