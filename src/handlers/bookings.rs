//! Booking endpoints.
//!
//! Clients create and cancel their own appointments, mechanics see the ones
//! assigned to them, managers see and edit everything.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::instrument;
use validator::Validate;

use crate::dtos::{BookingListQuery, CreateBookingRequest, UpdateBookingRequest};
use crate::error::AppError;
use crate::models::{Booking, BookingStatus, ListBookingsFilter};
use crate::middleware::AuthUser;
use crate::services::lifecycle;
use crate::services::AccessScope;
use crate::AppState;

fn ensure_visible(scope: &AccessScope, booking: &Booking) -> Result<(), AppError> {
    let visible = match scope {
        AccessScope::All => true,
        AccessScope::Mechanic(id) => booking.mechanic_id == Some(*id),
        AccessScope::Client(user_id) => booking.client_id == *user_id,
        AccessScope::Nothing => false,
    };
    if visible {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to access this booking"
        )))
    }
}

#[instrument(skip(state, user))]
pub async fn list_bookings(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<BookingListQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let scope = state.db.resolve_scope(&user).await?;
    let filter = ListBookingsFilter {
        start_date: query.start_date,
        end_date: query.end_date,
    };
    let bookings = state.db.list_bookings(&scope, &filter).await?;
    Ok(Json(bookings))
}

#[instrument(skip(state, user))]
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .db
        .get_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    let scope = state.db.resolve_scope(&user).await?;
    ensure_visible(&scope, &booking)?;

    Ok(Json(booking))
}

#[instrument(skip(state, user, payload))]
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    if !user.is_manager() && !user.is_client() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only clients and managers can create bookings"
        )));
    }

    payload.validate()?;

    if payload.booking_date < Utc::now().date_naive() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Booking date cannot be in the past."
        )));
    }

    // Managers may book on a client's behalf; everyone else books for
    // themselves.
    let client_id = match (&payload.client_id, user.is_manager()) {
        (Some(client_id), true) => client_id.clone(),
        _ => user.user_id.clone(),
    };

    let booking = state.db.create_booking(&client_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

#[instrument(skip(state, user, payload))]
pub async fn update_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can update bookings"
        )));
    }

    payload.validate()?;

    let booking = state
        .db
        .update_booking(id, &payload)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    Ok(Json(booking))
}

#[instrument(skip(state, user))]
pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .db
        .get_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    if booking.status() == BookingStatus::Cancelled {
        return Err(AppError::InvalidState(
            "Booking is already cancelled.".to_string(),
        ));
    }

    // Managers can cancel anything at any time. Clients can cancel their own
    // bookings subject to the lead-time rule.
    if !user.is_manager() {
        if !user.is_client() || booking.client_id != user.user_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Not allowed to cancel this booking"
            )));
        }
        if !lifecycle::client_may_cancel(booking.booking_date, booking.booking_time, Utc::now()) {
            return Err(AppError::LeadTimeViolation(
                "Booking cannot be cancelled. Minimum 24 hours notice required.".to_string(),
            ));
        }
    }

    let booking = state
        .db
        .cancel_booking(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    Ok(Json(booking))
}
