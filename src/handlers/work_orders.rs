//! Work-order endpoints.
//!
//! The update path is role-split: the assigned mechanic may move the status
//! forward and record notes and actual time (with automatic start/finish
//! stamping and labor derivation), while managers may edit every field.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::instrument;
use validator::Validate;

use crate::dtos::{CreateWorkOrderRequest, UpdateWorkOrderRequest};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{WorkOrder, WorkOrderChanges};
use crate::services::lifecycle;
use crate::services::AccessScope;
use crate::AppState;

async fn ensure_visible(
    state: &AppState,
    scope: &AccessScope,
    work_order: &WorkOrder,
) -> Result<(), AppError> {
    let visible = match scope {
        AccessScope::All => true,
        AccessScope::Mechanic(id) => work_order.mechanic_id == *id,
        AccessScope::Client(user_id) => {
            let booking = state.db.booking_for_work_order(work_order.id).await?;
            booking.map(|b| b.client_id == *user_id).unwrap_or(false)
        }
        AccessScope::Nothing => false,
    };
    if visible {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to access this work order"
        )))
    }
}

#[instrument(skip(state, user))]
pub async fn list_work_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<WorkOrder>>, AppError> {
    let scope = state.db.resolve_scope(&user).await?;
    let work_orders = state.db.list_work_orders(&scope).await?;
    Ok(Json(work_orders))
}

#[instrument(skip(state, user))]
pub async fn get_work_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<WorkOrder>, AppError> {
    let work_order = state
        .db
        .get_work_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("WorkOrder not found")))?;

    let scope = state.db.resolve_scope(&user).await?;
    ensure_visible(&state, &scope, &work_order).await?;

    Ok(Json(work_order))
}

#[instrument(skip(state, user, payload))]
pub async fn create_work_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateWorkOrderRequest>,
) -> Result<(StatusCode, Json<WorkOrder>), AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can create work orders"
        )));
    }

    payload.validate()?;

    state
        .db
        .get_booking(payload.booking_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Booking not found")))?;

    let work_order = state.db.create_work_order(&payload).await?;

    Ok((StatusCode::CREATED, Json(work_order)))
}

#[instrument(skip(state, user, payload))]
pub async fn update_work_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateWorkOrderRequest>,
) -> Result<Json<WorkOrder>, AppError> {
    payload.validate()?;

    let work_order = state
        .db
        .get_work_order(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("WorkOrder not found")))?;

    let changes = if user.is_manager() {
        manager_changes(&work_order, &payload)
    } else if user.is_mechanic() {
        let mechanic = state
            .db
            .find_mechanic_by_user(&user.user_id)
            .await?
            .filter(|m| m.id == work_order.mechanic_id)
            .ok_or_else(|| {
                AppError::Forbidden(anyhow::anyhow!(
                    "Only the assigned mechanic can update this work order"
                ))
            })?;
        mechanic_changes(&work_order, &payload, mechanic.hourly_rate)
    } else {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to update work orders"
        )));
    };

    let work_order = state
        .db
        .update_work_order(id, &changes)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("WorkOrder not found")))?;

    Ok(Json(work_order))
}

/// Managers patch any field. An explicit totalCost wins; otherwise a status
/// transition recomputes it from the (possibly just-patched) cost parts.
fn manager_changes(work_order: &WorkOrder, payload: &UpdateWorkOrderRequest) -> WorkOrderChanges {
    let mut changes = WorkOrderChanges {
        status: payload.status.map(|s| s.as_str().to_string()),
        description: payload.description.clone(),
        mechanic_notes: payload.mechanic_notes.clone(),
        estimated_duration_minutes: payload.estimated_duration_minutes,
        actual_duration_minutes: payload.actual_duration_minutes,
        labor_cost: payload.labor_cost,
        parts_cost: payload.parts_cost,
        total_cost: payload.total_cost,
        started_at: payload.started_at,
        completed_at: payload.completed_at,
    };

    if changes.total_cost.is_none() {
        if let Some(new_status) = payload.status {
            changes.total_cost = lifecycle::total_cost_after_transition(
                work_order.status(),
                new_status,
                payload.labor_cost.or(work_order.labor_cost),
                payload.parts_cost.or(work_order.parts_cost),
                work_order.total_cost,
            );
        }
    }

    changes
}

/// Mechanics touch only status, notes and actual time. A transition stamps
/// started/completed timestamps and derives labor from the hourly rate.
fn mechanic_changes(
    work_order: &WorkOrder,
    payload: &UpdateWorkOrderRequest,
    hourly_rate: Option<rust_decimal::Decimal>,
) -> WorkOrderChanges {
    let mut changes = WorkOrderChanges {
        status: payload.status.map(|s| s.as_str().to_string()),
        mechanic_notes: payload.mechanic_notes.clone(),
        actual_duration_minutes: payload.actual_duration_minutes,
        ..Default::default()
    };

    if let Some(new_status) = payload.status {
        let stamps = lifecycle::mechanic_transition_stamps(
            new_status,
            work_order.started_at,
            work_order.completed_at,
            payload
                .actual_duration_minutes
                .or(work_order.actual_duration_minutes),
            hourly_rate,
            Utc::now(),
        );
        changes.started_at = stamps.started_at;
        changes.completed_at = stamps.completed_at;
        changes.labor_cost = stamps.labor_cost;

        changes.total_cost = lifecycle::total_cost_after_transition(
            work_order.status(),
            new_status,
            stamps.labor_cost.or(work_order.labor_cost),
            work_order.parts_cost,
            work_order.total_cost,
        );
    }

    changes
}

#[instrument(skip(state, user))]
pub async fn delete_work_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can delete work orders"
        )));
    }

    let deleted = state.db.delete_work_order(id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("WorkOrder not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
