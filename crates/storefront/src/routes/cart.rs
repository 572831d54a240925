//! Cart and catalog route handlers.
//!
//! All cart routes are gate-guarded. Mutations return a [`CartUpdate`]
//! carrying the post-mutation snapshot and an optional toast notice;
//! reads return the bare snapshot.

use axum::{Json, extract::State, response::IntoResponse};
use brisco_core::ProductId;
use brisco_engine::cart::item_key;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::routes::require_access;
use crate::state::AppState;

/// Add-to-cart body.
#[derive(Debug, Deserialize)]
pub struct AddForm {
    pub product_id: ProductId,
    pub size: Option<String>,
}

/// Quantity-update body.
#[derive(Debug, Deserialize)]
pub struct QuantityForm {
    pub product_id: ProductId,
    pub size: Option<String>,
    pub quantity: u32,
}

/// Line-removal body.
#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub product_id: ProductId,
    pub size: Option<String>,
}

/// The current drop.
#[instrument(skip_all)]
pub async fn products(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let shop = shop.lock().await;
    require_access(&shop)?;

    Ok(Json(state.catalog().to_vec()))
}

/// Cart snapshot.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let shop = shop.lock().await;
    require_access(&shop)?;

    Ok(Json(shop.cart.snapshot()))
}

/// Add one unit of a product to the cart.
#[instrument(skip_all, fields(product_id = %form.product_id))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<AddForm>,
) -> Result<impl IntoResponse> {
    let offer = state
        .find_product(form.product_id)
        .ok_or_else(|| AppError::NotFound(format!("product {}", form.product_id)))?
        .clone();

    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    let update = shop.cart.add_item(&offer, form.size.as_deref())?;
    Ok(Json(update))
}

/// Set a line's quantity. Zero removes the line.
#[instrument(skip_all, fields(product_id = %form.product_id, quantity = form.quantity))]
pub async fn set_quantity(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<QuantityForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    let key = item_key(form.product_id, form.size.as_deref());
    let update = shop.cart.set_quantity(&key, form.quantity);
    Ok(Json(update))
}

/// Remove a line from the cart.
#[instrument(skip_all, fields(product_id = %form.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<RemoveForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    let key = item_key(form.product_id, form.size.as_deref());
    let update = shop.cart.remove_item(&key);
    Ok(Json(update))
}

/// Empty the cart.
#[instrument(skip_all)]
pub async fn clear(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;
    require_access(&shop)?;

    Ok(Json(shop.cart.clear()))
}
