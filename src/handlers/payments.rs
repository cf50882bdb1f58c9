//! Payment endpoints.
//!
//! Clients pay against their own work orders, managers record and settle
//! payments for anyone. Balance accounting lives in the database layer so
//! concurrent payments against the same invoice serialize on the invoice row.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use tracing::instrument;
use validator::Validate;

use crate::dtos::{CreatePaymentRequest, UpdatePaymentRequest};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::Payment;
use crate::services::AccessScope;
use crate::AppState;

async fn ensure_visible(
    state: &AppState,
    scope: &AccessScope,
    payment: &Payment,
) -> Result<(), AppError> {
    let visible = match scope {
        AccessScope::All => true,
        AccessScope::Mechanic(id) => {
            let work_order = state.db.get_work_order(payment.work_order_id).await?;
            work_order.map(|wo| wo.mechanic_id == *id).unwrap_or(false)
        }
        AccessScope::Client(user_id) => {
            let booking = state.db.booking_for_work_order(payment.work_order_id).await?;
            booking.map(|b| b.client_id == *user_id).unwrap_or(false)
        }
        AccessScope::Nothing => false,
    };
    if visible {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to access this payment"
        )))
    }
}

#[instrument(skip(state, user))]
pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Payment>>, AppError> {
    let scope = state.db.resolve_scope(&user).await?;
    let payments = state.db.list_payments(&scope).await?;
    Ok(Json(payments))
}

#[instrument(skip(state, user))]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, AppError> {
    let payment = state
        .db
        .get_payment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    let scope = state.db.resolve_scope(&user).await?;
    ensure_visible(&state, &scope, &payment).await?;

    Ok(Json(payment))
}

#[instrument(skip(state, user, payload), fields(work_order_id = payload.work_order_id))]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    payload.validate()?;

    if payload.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payment amount must be greater than zero."
        )));
    }

    let work_order = state
        .db
        .get_work_order(payload.work_order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("WorkOrder not found")))?;

    if !user.is_manager() {
        if !user.is_client() {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Not allowed to record payments"
            )));
        }
        let booking = state
            .db
            .booking_for_work_order(payload.work_order_id)
            .await?;
        if booking.map(|b| b.client_id == user.user_id) != Some(true) {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Not allowed to pay for this work order"
            )));
        }
    }

    if !work_order.status().invoiceable() {
        return Err(AppError::InvalidState(
            "WorkOrder must be Completed or ReadyForPayment to accept payments.".to_string(),
        ));
    }

    let payment = state.db.create_payment(&payload).await?;

    Ok((StatusCode::CREATED, Json(payment)))
}

/// Settle a pending payment. Re-running on an already-completed payment is a
/// no-op that returns the payment unchanged.
#[instrument(skip(state, user))]
pub async fn complete_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can complete payments"
        )));
    }

    let (payment, _already_completed) = state.db.complete_payment(id).await?;

    Ok(Json(payment))
}

#[instrument(skip(state, user, payload))]
pub async fn update_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can update payments"
        )));
    }

    payload.validate()?;

    let payment = state
        .db
        .update_payment(id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(payment))
}

#[instrument(skip(state, user))]
pub async fn delete_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can delete payments"
        )));
    }

    let deleted = state.db.delete_payment(id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Payment not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
