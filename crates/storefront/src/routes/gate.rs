//! Access gate route handlers.
//!
//! The gate fronts the whole storefront: until the visitor's email and
//! access code are accepted, cart and checkout routes answer 401.
//! A failed or disabled email send is reported as a soft `delivery`
//! status, never an error, so the visitor can still enter the code.

use axum::{Json, extract::State, response::IntoResponse};
use brisco_engine::gate::{GateState, SendOutcome};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::state::AppState;

/// Email submission body.
#[derive(Debug, Deserialize)]
pub struct EmailForm {
    pub email: String,
}

/// Access-code submission body.
#[derive(Debug, Deserialize)]
pub struct CodeForm {
    pub code: String,
}

/// Current gate state.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let shop = shop.lock().await;
    Ok(Json(shop.gate.state().clone()))
}

/// Submit an email address and dispatch the access code.
#[instrument(skip_all, fields(email = %form.email))]
pub async fn submit_email(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<EmailForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;

    let outcome = shop
        .gate
        .submit_email(&form.email, state.mailer(), state.leads())
        .await?;

    let delivery = match outcome {
        SendOutcome::Sent { .. } => "sent",
        SendOutcome::Failed => "failed",
    };
    Ok(Json(serde_json::json!({
        "state": shop.gate.state(),
        "delivery": delivery,
    })))
}

/// Submit the mailed access code.
#[instrument(skip_all)]
pub async fn submit_code(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<CodeForm>,
) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;

    shop.gate.submit_code(&form.code)?;
    debug_assert!(matches!(shop.gate.state(), GateState::Granted));
    Ok(Json(shop.gate.state().clone()))
}

/// Return from the code prompt to the email prompt.
#[instrument(skip_all)]
pub async fn back(State(state): State<AppState>, session: Session) -> Result<impl IntoResponse> {
    let shop = state.shop(&session).await?;
    let mut shop = shop.lock().await;

    shop.gate.back();
    Ok(Json(shop.gate.state().clone()))
}
