//! Checkout flow: a linear step machine for a single product purchase.
//!
//! Steps run `Product -> Info -> Payment -> Confirmation`, with an optional
//! waiting-room pre-step on open. The flow owns an ephemeral context - one
//! product, a size, a quantity of 1 to 10, and the contact form - which is
//! reset whenever the flow closes or an order confirms. Nothing here
//! persists; the confirmed order is handed to the cart for record-keeping.
//!
//! The waiting room is scarcity theater, not a real queue. The randomness
//! behind it (whether it appears, the starting position, how fast it
//! drains) lives behind [`WaitingRoomStrategy`] so tests can pin it down.

use brisco_core::{CurrencyCode, Email, EmailError, Price};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::cart::{CartEngine, ProductOffer};
use crate::pricing;
use crate::services::{BillingDetails, ChargeReceipt, PaymentError, PaymentGateway};
use crate::store::KeyValueStore;

/// Maximum quantity purchasable in one checkout.
pub const MAX_QUANTITY: u32 = 10;

/// Checkout steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Cosmetic queue shown before the product step on some opens.
    WaitingRoom,
    /// Product, size, and quantity selection.
    Product,
    /// Contact and shipping details.
    Info,
    /// Payment method and card entry.
    Payment,
    /// Order confirmed.
    Confirmation,
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// One charge for the full amount.
    Full,
    /// Four interest-free payments. Not yet wired to a provider; always
    /// simulates success.
    Installment,
}

/// Contact and shipping details collected on the info step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct CustomerInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub phone: String,
}

impl CustomerInfo {
    /// The first required field that is empty, if any, by form order.
    #[must_use]
    pub fn first_missing_field(&self) -> Option<&'static str> {
        let fields: [(&'static str, &str); 8] = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("zip", &self.zip),
            ("phone", &self.phone),
        ];
        fields
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
    }
}

/// A waiting-room admission ticket.
#[derive(Debug, Clone, Serialize)]
pub struct QueueTicket {
    /// Current position in the fake queue.
    pub position: u32,
    /// Advertised wait window in minutes, for display only.
    pub advertised_wait_minutes: (u32, u32),
    /// How often the presentation layer should tick the queue.
    pub tick_interval_ms: u64,
}

/// Decides whether an open gets a waiting room and how the queue drains.
pub trait WaitingRoomStrategy {
    /// A ticket when this open should queue, or `None` to go straight in.
    fn admission(&mut self) -> Option<QueueTicket>;

    /// How many positions the queue drops on one tick. At least one.
    fn step(&mut self) -> u32;
}

/// Production strategy: roughly 3 opens in 10 see a queue starting between
/// 100 and 599, draining 1-5 positions every 2-5 seconds.
#[derive(Debug, Clone)]
pub struct ScarcityQueue {
    admission_probability: f64,
}

impl Default for ScarcityQueue {
    fn default() -> Self {
        Self {
            admission_probability: 0.3,
        }
    }
}

impl WaitingRoomStrategy for ScarcityQueue {
    fn admission(&mut self) -> Option<QueueTicket> {
        let mut rng = rand::rng();
        if rng.random::<f64>() >= self.admission_probability {
            return None;
        }
        let wait = rng.random_range(2..=3u32);
        Some(QueueTicket {
            position: rng.random_range(100..=599),
            advertised_wait_minutes: (wait, wait + 2),
            tick_interval_ms: rng.random_range(2000..=5000),
        })
    }

    fn step(&mut self) -> u32 {
        rand::rng().random_range(1..=5)
    }
}

/// Strategy that never queues. Used where the delay is unwanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWaitingRoom;

impl WaitingRoomStrategy for NoWaitingRoom {
    fn admission(&mut self) -> Option<QueueTicket> {
        None
    }

    fn step(&mut self) -> u32 {
        1
    }
}

/// Result of one queue tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueueStatus {
    /// Still queued at `position`.
    Waiting {
        /// Remaining position.
        position: u32,
    },
    /// Reached the front; the flow advanced to the product step.
    Admitted,
    /// No queue is active (closed flow, or already past the queue).
    Inactive,
}

/// A confirmed order, as shown on the confirmation step.
#[derive(Debug, Clone, Serialize)]
pub struct OrderConfirmation {
    /// Gateway transaction identifier (or `demo_*` for simulated paths).
    pub transaction_id: String,
    /// Product name.
    pub product_name: String,
    /// Purchased size.
    pub size: String,
    /// Purchased quantity.
    pub quantity: u32,
    /// Charged total in dollars.
    pub total: Decimal,
    /// Customer email the receipt goes to.
    pub email: String,
}

/// Errors the checkout surfaces.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No checkout is open.
    #[error("checkout is not open")]
    NotOpen,

    /// `advance` called from a step with no forward transition.
    #[error("cannot advance from the current step")]
    CannotAdvance,

    /// The product step requires a size before advancing.
    #[error("please select a size")]
    SizeNotSelected,

    /// A required contact field is empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The contact email is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// A payment is already in flight; this call was dropped.
    #[error("a payment is already being processed")]
    PaymentInFlight,

    /// Payment was submitted while not on the payment step.
    #[error("not at the payment step")]
    NotAtPayment,

    /// The gateway rejected or failed the charge. Retryable.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// The checkout flow state machine.
#[derive(Debug)]
pub struct CheckoutFlow<W: WaitingRoomStrategy> {
    open: bool,
    step: Step,
    product: Option<ProductOffer>,
    size: Option<String>,
    quantity: u32,
    info: CustomerInfo,
    queue: Option<QueueTicket>,
    processing: bool,
    strategy: W,
}

/// Read-only snapshot for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSnapshot {
    /// Whether a checkout is open at all.
    pub open: bool,
    /// Current step.
    pub step: Step,
    /// Selected product name, if open.
    pub product_name: Option<String>,
    /// Selected product listed price, if open.
    pub list_price: Option<Decimal>,
    /// Selected size.
    pub size: Option<String>,
    /// Selected quantity.
    pub quantity: u32,
    /// Total under the mini-cart tier formula.
    pub total: Decimal,
    /// A quarter of the total, for the installment option display.
    pub installment_amount: Decimal,
    /// Queue position while in the waiting room.
    pub queue_position: Option<u32>,
    /// Whether a payment is currently in flight.
    pub processing: bool,
}

impl<W: WaitingRoomStrategy> CheckoutFlow<W> {
    /// Create a closed flow with the given waiting-room strategy.
    pub fn new(strategy: W) -> Self {
        Self {
            open: false,
            step: Step::Product,
            product: None,
            size: None,
            quantity: 1,
            info: CustomerInfo::default(),
            queue: None,
            processing: false,
            strategy,
        }
    }

    /// Open a checkout for `product`, resetting any previous context.
    ///
    /// The strategy decides whether the visitor queues first; otherwise
    /// the flow starts at the product step.
    pub fn open(&mut self, product: &ProductOffer) -> Step {
        self.reset();
        self.open = true;
        self.product = Some(product.clone());

        if let Some(ticket) = self.strategy.admission() {
            tracing::debug!(position = ticket.position, "Entering waiting room");
            self.queue = Some(ticket);
            self.step = Step::WaitingRoom;
        } else {
            self.step = Step::Product;
        }
        self.step
    }

    /// Close the flow and reset all context to defaults.
    ///
    /// Any active queue is dropped, so a timer tick arriving after close
    /// finds nothing to mutate.
    pub fn close(&mut self) {
        self.reset();
    }

    /// Advance the fake queue by one tick.
    ///
    /// Reaching position one (or below) admits the visitor and moves the
    /// flow to the product step. Outside the waiting room this is inert.
    pub fn tick_queue(&mut self) -> QueueStatus {
        if self.step != Step::WaitingRoom {
            return QueueStatus::Inactive;
        }
        let Some(ticket) = self.queue.as_mut() else {
            return QueueStatus::Inactive;
        };

        let drop = self.strategy.step().max(1);
        ticket.position = ticket.position.saturating_sub(drop);
        if ticket.position <= 1 {
            self.queue = None;
            self.step = Step::Product;
            return QueueStatus::Admitted;
        }
        QueueStatus::Waiting {
            position: ticket.position,
        }
    }

    /// Select a size on the product step.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::NotOpen`] when no checkout is open.
    pub fn set_size(&mut self, size: &str) -> Result<(), CheckoutError> {
        if !self.open {
            return Err(CheckoutError::NotOpen);
        }
        self.size = Some(size.to_owned());
        Ok(())
    }

    /// Bump quantity up, clamped to [`MAX_QUANTITY`].
    pub fn increment_quantity(&mut self) {
        if self.quantity < MAX_QUANTITY {
            self.quantity += 1;
        }
    }

    /// Bump quantity down, clamped to one.
    pub fn decrement_quantity(&mut self) {
        if self.quantity > 1 {
            self.quantity -= 1;
        }
    }

    /// Replace the contact form contents.
    pub fn set_customer_info(&mut self, info: CustomerInfo) {
        self.info = info;
    }

    /// Move one step forward, enforcing the step's validation gate.
    ///
    /// # Errors
    ///
    /// - `Product -> Info` requires a selected size
    /// - `Info -> Payment` requires all contact fields non-empty and a
    ///   well-formed email
    ///
    /// A rejected advance leaves the step unchanged.
    pub fn advance(&mut self) -> Result<Step, CheckoutError> {
        if !self.open {
            return Err(CheckoutError::NotOpen);
        }
        match self.step {
            Step::Product => {
                if self.size.is_none() {
                    return Err(CheckoutError::SizeNotSelected);
                }
                self.step = Step::Info;
            }
            Step::Info => {
                if let Some(field) = self.info.first_missing_field() {
                    return Err(CheckoutError::MissingField(field));
                }
                Email::parse(self.info.email.trim())?;
                self.step = Step::Payment;
            }
            Step::WaitingRoom | Step::Payment | Step::Confirmation => {
                return Err(CheckoutError::CannotAdvance);
            }
        }
        Ok(self.step)
    }

    /// Move one step backward. Never validated.
    pub fn back(&mut self) -> Step {
        self.step = match self.step {
            Step::Info => Step::Product,
            Step::Payment => Step::Info,
            other => other,
        };
        self.step
    }

    /// Total for the selected quantity of the selected product, under the
    /// same tier thresholds as the cart (single unit at the listed price).
    #[must_use]
    pub fn total(&self) -> Decimal {
        let Some(product) = &self.product else {
            return Decimal::ZERO;
        };
        let unit = pricing::unit_price_for_quantity(self.quantity, product.list_price);
        (Decimal::from(self.quantity) * unit).round_dp(2)
    }

    /// One quarter of the total, shown next to the installment option.
    #[must_use]
    pub fn installment_amount(&self) -> Decimal {
        (self.total() / Decimal::from(4)).round_dp(2)
    }

    /// Current step.
    #[must_use]
    pub const fn step(&self) -> Step {
        self.step
    }

    /// Read-only snapshot for the presentation layer.
    #[must_use]
    pub fn snapshot(&self) -> CheckoutSnapshot {
        CheckoutSnapshot {
            open: self.open,
            step: self.step,
            product_name: self.product.as_ref().map(|p| p.name.clone()),
            list_price: self.product.as_ref().map(|p| p.list_price),
            size: self.size.clone(),
            quantity: self.quantity,
            total: self.total(),
            installment_amount: self.installment_amount(),
            queue_position: self.queue.as_ref().map(|q| q.position),
            processing: self.processing,
        }
    }

    /// Submit payment for the open checkout.
    ///
    /// `Full` charges through the gateway; `Installment` simulates success
    /// until a provider is wired up. On success the flow moves to the
    /// confirmation step and the confirmed line lands in `cart` for
    /// record-keeping. On failure the step stays at payment so the visitor
    /// can retry.
    ///
    /// Reentrancy-guarded: a second call while a charge is in flight is
    /// rejected without touching the gateway.
    ///
    /// # Errors
    ///
    /// [`CheckoutError::PaymentInFlight`], [`CheckoutError::NotAtPayment`],
    /// [`CheckoutError::SizeNotSelected`], [`CheckoutError::InvalidEmail`],
    /// or [`CheckoutError::Payment`] with the gateway's reason.
    pub async fn submit_payment<P, S>(
        &mut self,
        method: PaymentMethod,
        card_token: &str,
        gateway: &P,
        cart: &mut CartEngine<S>,
    ) -> Result<OrderConfirmation, CheckoutError>
    where
        P: PaymentGateway,
        S: KeyValueStore,
    {
        if self.processing {
            return Err(CheckoutError::PaymentInFlight);
        }
        if self.step != Step::Payment {
            return Err(CheckoutError::NotAtPayment);
        }
        let product = self.product.clone().ok_or(CheckoutError::NotOpen)?;
        let size = self.size.clone().ok_or(CheckoutError::SizeNotSelected)?;
        let email = Email::parse(self.info.email.trim())?;
        let total = self.total();

        let billing = BillingDetails {
            name: format!("{} {}", self.info.first_name.trim(), self.info.last_name.trim()),
            email: email.clone(),
            address_line1: self.info.address.clone(),
            city: self.info.city.clone(),
            state: self.info.state.clone(),
            postal_code: self.info.zip.clone(),
        };
        // The flag is cleared by the guard's Drop, so an abandoned charge
        // future cannot wedge the checkout at PaymentInFlight.
        self.processing = true;
        let in_flight = InFlightGuard(&mut self.processing);
        let result = match method {
            PaymentMethod::Full => {
                let amount = Price::new(total, CurrencyCode::USD);
                gateway
                    .charge(
                        amount.as_cents(),
                        CurrencyCode::USD.gateway_code(),
                        &billing,
                        card_token,
                    )
                    .await
            }
            PaymentMethod::Installment => {
                // Known incomplete path: no installment provider yet.
                tracing::info!("Installment selected; simulating success");
                Ok(ChargeReceipt {
                    transaction_id: format!("demo_{}", chrono::Utc::now().timestamp_millis()),
                })
            }
        };
        drop(in_flight);

        let receipt = result.map_err(CheckoutError::Payment)?;

        cart.record_order(&product, Some(size.as_str()), self.quantity);
        let confirmation = OrderConfirmation {
            transaction_id: receipt.transaction_id,
            product_name: product.name,
            size,
            quantity: self.quantity,
            total,
            email: email.into_inner(),
        };
        tracing::info!(transaction_id = %confirmation.transaction_id, "Order confirmed");
        self.step = Step::Confirmation;
        Ok(confirmation)
    }

    fn reset(&mut self) {
        self.open = false;
        self.step = Step::Product;
        self.product = None;
        self.size = None;
        self.quantity = 1;
        self.info = CustomerInfo::default();
        self.queue = None;
        self.processing = false;
    }
}

/// Clears the payment in-flight flag when dropped.
struct InFlightGuard<'a>(&'a mut bool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use brisco_core::ProductId;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Strategy double: queue once from a fixed position, fixed drain.
    #[derive(Debug)]
    struct FixedQueue {
        position: u32,
        drop: u32,
    }

    impl WaitingRoomStrategy for FixedQueue {
        fn admission(&mut self) -> Option<QueueTicket> {
            Some(QueueTicket {
                position: self.position,
                advertised_wait_minutes: (2, 4),
                tick_interval_ms: 10,
            })
        }

        fn step(&mut self) -> u32 {
            self.drop
        }
    }

    /// Gateway double that counts charges and can decline.
    #[derive(Debug, Default)]
    struct TestGateway {
        charges: AtomicU32,
        decline: bool,
    }

    impl PaymentGateway for TestGateway {
        async fn charge(
            &self,
            _amount_cents: i64,
            _currency: &str,
            _billing: &BillingDetails,
            _card_token: &str,
        ) -> Result<ChargeReceipt, PaymentError> {
            self.charges.fetch_add(1, Ordering::SeqCst);
            if self.decline {
                return Err(PaymentError::Declined {
                    reason: "card declined".to_owned(),
                });
            }
            Ok(ChargeReceipt {
                transaction_id: "pi_test_1".to_owned(),
            })
        }
    }

    fn shirt() -> ProductOffer {
        ProductOffer {
            id: ProductId::new(1),
            name: "Torch Tee".to_owned(),
            list_price: Decimal::from(65),
            image_ref: "/images/torch-front.jpg".to_owned(),
        }
    }

    fn filled_info() -> CustomerInfo {
        CustomerInfo {
            first_name: "Max".to_owned(),
            last_name: "Line".to_owned(),
            email: "max@example.com".to_owned(),
            address: "1 Torch Way".to_owned(),
            city: "Los Angeles".to_owned(),
            state: "CA".to_owned(),
            zip: "90001".to_owned(),
            phone: "(555) 123-4567".to_owned(),
        }
    }

    fn flow() -> CheckoutFlow<NoWaitingRoom> {
        CheckoutFlow::new(NoWaitingRoom)
    }

    /// Drive an open flow to the payment step.
    fn at_payment(flow: &mut CheckoutFlow<NoWaitingRoom>) {
        flow.open(&shirt());
        flow.set_size("M").unwrap();
        flow.advance().unwrap();
        flow.set_customer_info(filled_info());
        flow.advance().unwrap();
    }

    #[test]
    fn test_open_without_queue_starts_at_product() {
        let mut flow = flow();
        assert_eq!(flow.open(&shirt()), Step::Product);
        assert_eq!(flow.tick_queue(), QueueStatus::Inactive);
    }

    #[test]
    fn test_advance_without_size_rejected() {
        let mut flow = flow();
        flow.open(&shirt());
        assert!(matches!(
            flow.advance(),
            Err(CheckoutError::SizeNotSelected)
        ));
        assert_eq!(flow.step(), Step::Product);

        flow.set_size("M").unwrap();
        assert_eq!(flow.advance().unwrap(), Step::Info);
    }

    #[test]
    fn test_advance_names_first_missing_field() {
        let mut flow = flow();
        flow.open(&shirt());
        flow.set_size("M").unwrap();
        flow.advance().unwrap();

        let mut info = filled_info();
        info.city = String::new();
        flow.set_customer_info(info);

        assert!(matches!(
            flow.advance(),
            Err(CheckoutError::MissingField("city"))
        ));
        assert_eq!(flow.step(), Step::Info);
    }

    #[test]
    fn test_advance_rejects_malformed_email() {
        let mut flow = flow();
        flow.open(&shirt());
        flow.set_size("M").unwrap();
        flow.advance().unwrap();

        let mut info = filled_info();
        info.email = "not-an-email".to_owned();
        flow.set_customer_info(info);

        assert!(matches!(flow.advance(), Err(CheckoutError::InvalidEmail(_))));
        assert_eq!(flow.step(), Step::Info);
    }

    #[test]
    fn test_back_is_unconditional() {
        let mut flow = flow();
        at_payment(&mut flow);
        assert_eq!(flow.back(), Step::Info);
        assert_eq!(flow.back(), Step::Product);
        // No step before product.
        assert_eq!(flow.back(), Step::Product);
    }

    #[test]
    fn test_quantity_clamped_1_to_10() {
        let mut flow = flow();
        flow.open(&shirt());

        flow.decrement_quantity();
        assert_eq!(flow.snapshot().quantity, 1);

        for _ in 0..20 {
            flow.increment_quantity();
        }
        assert_eq!(flow.snapshot().quantity, MAX_QUANTITY);
    }

    #[test]
    fn test_mini_cart_pricing() {
        let mut flow = flow();
        flow.open(&shirt());

        assert_eq!(flow.total(), Decimal::from(65));
        flow.increment_quantity();
        assert_eq!(flow.total(), Decimal::from(110));
        flow.increment_quantity();
        flow.increment_quantity();
        assert_eq!(flow.total(), Decimal::from(200));
        assert_eq!(flow.installment_amount(), Decimal::from(50));
    }

    #[test]
    fn test_waiting_room_drains_and_admits() {
        let mut flow = CheckoutFlow::new(FixedQueue {
            position: 10,
            drop: 4,
        });
        assert_eq!(flow.open(&shirt()), Step::WaitingRoom);

        assert_eq!(flow.tick_queue(), QueueStatus::Waiting { position: 6 });
        assert_eq!(flow.tick_queue(), QueueStatus::Waiting { position: 2 });
        assert_eq!(flow.tick_queue(), QueueStatus::Admitted);
        assert_eq!(flow.step(), Step::Product);
        assert_eq!(flow.tick_queue(), QueueStatus::Inactive);
    }

    #[test]
    fn test_close_cancels_queue() {
        let mut flow = CheckoutFlow::new(FixedQueue {
            position: 500,
            drop: 1,
        });
        flow.open(&shirt());
        flow.close();

        // A straggler tick after close must not mutate anything.
        assert_eq!(flow.tick_queue(), QueueStatus::Inactive);
        assert!(!flow.snapshot().open);
        assert_eq!(flow.snapshot().quantity, 1);
    }

    #[test]
    fn test_close_resets_context() {
        let mut flow = flow();
        at_payment(&mut flow);
        flow.close();

        let snapshot = flow.snapshot();
        assert!(!snapshot.open);
        assert_eq!(snapshot.step, Step::Product);
        assert!(snapshot.product_name.is_none());
        assert!(snapshot.size.is_none());
        assert_eq!(snapshot.quantity, 1);
    }

    #[tokio::test]
    async fn test_full_payment_confirms_and_records_in_cart() {
        let mut flow = flow();
        at_payment(&mut flow);
        flow.increment_quantity();

        let gateway = TestGateway::default();
        let mut cart = CartEngine::new(MemoryStore::new());

        let confirmation = flow
            .submit_payment(PaymentMethod::Full, "tok_visa", &gateway, &mut cart)
            .await
            .unwrap();

        assert_eq!(confirmation.transaction_id, "pi_test_1");
        assert_eq!(confirmation.quantity, 2);
        assert_eq!(confirmation.total, Decimal::from(110));
        assert_eq!(flow.step(), Step::Confirmation);
        assert_eq!(cart.item_count(), 2);
    }

    #[tokio::test]
    async fn test_declined_payment_stays_at_payment_step() {
        let mut flow = flow();
        at_payment(&mut flow);

        let gateway = TestGateway {
            decline: true,
            ..TestGateway::default()
        };
        let mut cart = CartEngine::new(MemoryStore::new());

        let result = flow
            .submit_payment(PaymentMethod::Full, "tok_visa", &gateway, &mut cart)
            .await;

        assert!(matches!(
            result,
            Err(CheckoutError::Payment(PaymentError::Declined { .. }))
        ));
        assert_eq!(flow.step(), Step::Payment);
        assert!(!flow.snapshot().processing);
        assert!(cart.is_empty());

        // Retry affordance: the guard is clear, a second attempt reaches
        // the gateway again.
        let _ = flow
            .submit_payment(PaymentMethod::Full, "tok_visa", &gateway, &mut cart)
            .await;
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reentrant_payment_rejected_without_charging() {
        let mut flow = flow();
        at_payment(&mut flow);

        let gateway = TestGateway::default();
        let mut cart = CartEngine::new(MemoryStore::new());

        // Simulate a charge in flight.
        flow.processing = true;
        let result = flow
            .submit_payment(PaymentMethod::Full, "tok_visa", &gateway, &mut cart)
            .await;

        assert!(matches!(result, Err(CheckoutError::PaymentInFlight)));
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
    }

    /// Gateway double whose charge never resolves.
    struct StalledGateway;

    impl PaymentGateway for StalledGateway {
        async fn charge(
            &self,
            _amount_cents: i64,
            _currency: &str,
            _billing: &BillingDetails,
            _card_token: &str,
        ) -> Result<ChargeReceipt, PaymentError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_charge_does_not_wedge_the_checkout() {
        use std::future::Future;
        use std::task::{Context, Waker};

        let mut flow = flow();
        at_payment(&mut flow);
        let mut cart = CartEngine::new(MemoryStore::new());

        // Drop the submit future mid-charge, as a client disconnect would.
        {
            let stalled = StalledGateway;
            let mut fut = Box::pin(flow.submit_payment(
                PaymentMethod::Full,
                "tok_visa",
                &stalled,
                &mut cart,
            ));
            let mut cx = Context::from_waker(Waker::noop());
            assert!(fut.as_mut().poll(&mut cx).is_pending());
        }

        // The in-flight flag must not survive the abandoned attempt.
        assert!(!flow.snapshot().processing);
        let gateway = TestGateway::default();
        let confirmation = flow
            .submit_payment(PaymentMethod::Full, "tok_visa", &gateway, &mut cart)
            .await
            .unwrap();
        assert_eq!(confirmation.transaction_id, "pi_test_1");
        assert_eq!(flow.step(), Step::Confirmation);
    }

    #[tokio::test]
    async fn test_installment_simulates_success() {
        let mut flow = flow();
        at_payment(&mut flow);

        let gateway = TestGateway::default();
        let mut cart = CartEngine::new(MemoryStore::new());

        let confirmation = flow
            .submit_payment(PaymentMethod::Installment, "", &gateway, &mut cart)
            .await
            .unwrap();

        assert!(confirmation.transaction_id.starts_with("demo_"));
        // The installment stub never touches the gateway.
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
        assert_eq!(flow.step(), Step::Confirmation);
    }

    #[tokio::test]
    async fn test_payment_off_step_rejected() {
        let mut flow = flow();
        flow.open(&shirt());

        let gateway = TestGateway::default();
        let mut cart = CartEngine::new(MemoryStore::new());

        let result = flow
            .submit_payment(PaymentMethod::Full, "tok_visa", &gateway, &mut cart)
            .await;
        assert!(matches!(result, Err(CheckoutError::NotAtPayment)));
        assert_eq!(gateway.charges.load(Ordering::SeqCst), 0);
    }
}
