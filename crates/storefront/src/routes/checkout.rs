//! Checkout route handlers.
//!
//! All checkout routes are gate-guarded and operate on the visitor's
//! single checkout flow. Mutations return the post-mutation snapshot;
//! payment returns the order confirmation.

use axum::{Json, extract::State, response::IntoResponse};
use brisco_core::ProductId;
use brisco_engine::checkout::{CustomerInfo, PaymentMethod};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::routes::require_access;
use crate::state::{AppState, ShopSession};

/// Checkout-open body.
#[derive(Debug, Deserialize)]
pub struct OpenForm {
    pub product_id: ProductId,
}

/// Size-selection body.
#[derive(Debug, Deserialize)]
pub struct SizeForm {
    pub size: String,
}

/// Quantity-bump body.
#[derive(Debug, Deserialize)]
pub struct QuantityForm {
    pub direction: Direction,
}

/// Which way to bump the quantity.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// Payment submission body.
#[derive(Debug, Deserialize)]
pub struct PaymentForm {
    pub method: PaymentMethod,
    #[serde(default)]
    pub card_token: String,
}

/// Checkout snapshot.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let shop = shop.lock().await;
    require_access(&shop)?;

    Ok(Json(shop.checkout.snapshot()))
}

/// Open a checkout for a product.
#[instrument(skip_all, fields(product_id = %form.product_id))]
pub async fn open(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<OpenForm>,
) -> Result<impl IntoResponse> {
    let offer = state
        .find_product(form.product_id)
        .ok_or_else(|| AppError::NotFound(format!("product {}", form.product_id)))?
        .clone();

    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    shop.checkout.open(&offer);
    Ok(Json(shop.checkout.snapshot()))
}

/// Advance the waiting-room queue by one tick.
#[instrument(skip_all)]
pub async fn tick_queue(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    let status = shop.checkout.tick_queue();
    Ok(Json(serde_json::json!({
        "queue": status,
        "snapshot": shop.checkout.snapshot(),
    })))
}

/// Select a size.
#[instrument(skip_all, fields(size = %form.size))]
pub async fn set_size(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<SizeForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    shop.checkout.set_size(&form.size)?;
    Ok(Json(shop.checkout.snapshot()))
}

/// Bump the quantity up or down, clamped by the engine.
#[instrument(skip_all)]
pub async fn set_quantity(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<QuantityForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    match form.direction {
        Direction::Up => shop.checkout.increment_quantity(),
        Direction::Down => shop.checkout.decrement_quantity(),
    }
    Ok(Json(shop.checkout.snapshot()))
}

/// Submit contact and shipping details.
#[instrument(skip_all)]
pub async fn set_info(
    State(state): State<AppState>,
    session: Session,
    Json(info): Json<CustomerInfo>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    shop.checkout.set_customer_info(info);
    Ok(Json(shop.checkout.snapshot()))
}

/// Move one step forward.
#[instrument(skip_all)]
pub async fn advance(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    shop.checkout.advance()?;
    Ok(Json(shop.checkout.snapshot()))
}

/// Move one step back.
#[instrument(skip_all)]
pub async fn back(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    shop.checkout.back();
    Ok(Json(shop.checkout.snapshot()))
}

/// Submit payment for the open checkout.
#[instrument(skip_all)]
pub async fn submit_payment(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<PaymentForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    // Split borrows: the confirmed order lands in the same session's cart.
    let ShopSession { cart, checkout, .. } = &mut *shop;
    let confirmation = checkout
        .submit_payment(form.method, &form.card_token, state.gateway(), cart)
        .await?;
    Ok(Json(confirmation))
}

/// Close the checkout and reset its context.
#[instrument(skip_all)]
pub async fn close(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    shop.checkout.close();
    Ok(Json(shop.checkout.snapshot()))
}
