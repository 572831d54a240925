//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                     - Health check
//!
//! # Access gate
//! GET  /api/access                 - Current gate state
//! POST /api/access/email           - Submit email, dispatch access code
//! POST /api/access/verify          - Submit access code
//! POST /api/access/back            - Return to email entry
//!
//! # Catalog (gate-guarded)
//! GET  /api/products               - Current drop
//!
//! # Cart (gate-guarded)
//! GET    /api/cart                 - Cart snapshot
//! POST   /api/cart/items           - Add item
//! PATCH  /api/cart/items           - Set line quantity
//! DELETE /api/cart/items           - Remove line
//! DELETE /api/cart                 - Clear cart
//!
//! # Checkout (gate-guarded)
//! GET  /api/checkout               - Checkout snapshot
//! POST /api/checkout/open          - Open for a product
//! POST /api/checkout/queue/tick    - Advance the waiting-room queue
//! POST /api/checkout/size          - Select size
//! POST /api/checkout/quantity      - Bump quantity up or down
//! POST /api/checkout/info          - Submit contact details
//! POST /api/checkout/advance       - Move one step forward
//! POST /api/checkout/back          - Move one step back
//! POST /api/checkout/payment       - Submit payment
//! POST /api/checkout/close         - Close and reset
//! ```

pub mod cart;
pub mod checkout;
pub mod gate;

use axum::{
    Router,
    routing::{get, post},
};

use crate::error::AppError;
use crate::state::{AppState, ShopSession};

/// Reject the request unless the visitor has passed the access gate.
pub(crate) fn require_access(shop: &ShopSession) -> Result<(), AppError> {
    if shop.gate.is_granted() {
        Ok(())
    } else {
        Err(AppError::AccessRequired)
    }
}

/// Create the access gate routes router.
pub fn gate_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(gate::show))
        .route("/email", post(gate::submit_email))
        .route("/verify", post(gate::submit_code))
        .route("/back", post(gate::back))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route(
            "/items",
            post(cart::add).patch(cart::set_quantity).delete(cart::remove),
        )
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/open", post(checkout::open))
        .route("/queue/tick", post(checkout::tick_queue))
        .route("/size", post(checkout::set_size))
        .route("/quantity", post(checkout::set_quantity))
        .route("/info", post(checkout::set_info))
        .route("/advance", post(checkout::advance))
        .route("/back", post(checkout::back))
        .route("/payment", post(checkout::submit_payment))
        .route("/close", post(checkout::close))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(cart::products))
        .nest("/api/access", gate_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/checkout", checkout_routes())
}
