//! Invoice endpoints.
//!
//! Invoice generation and the full listing are manager operations; single
//! invoices are readable by the assigned mechanic and the owning client.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::instrument;

use crate::dtos::CreateInvoiceRequest;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::Invoice;
use crate::services::AccessScope;
use crate::AppState;

async fn ensure_visible(
    state: &AppState,
    scope: &AccessScope,
    invoice: &Invoice,
) -> Result<(), AppError> {
    let visible = match scope {
        AccessScope::All => true,
        AccessScope::Mechanic(id) => {
            let work_order = state.db.get_work_order(invoice.work_order_id).await?;
            work_order.map(|wo| wo.mechanic_id == *id).unwrap_or(false)
        }
        AccessScope::Client(user_id) => {
            let booking = state.db.booking_for_work_order(invoice.work_order_id).await?;
            booking.map(|b| b.client_id == *user_id).unwrap_or(false)
        }
        AccessScope::Nothing => false,
    };
    if visible {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Not allowed to access this invoice"
        )))
    }
}

#[instrument(skip(state, user))]
pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Invoice>>, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can list invoices"
        )));
    }

    let invoices = state.db.list_invoices().await?;
    Ok(Json(invoices))
}

#[instrument(skip(state, user))]
pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .get_invoice(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    let scope = state.db.resolve_scope(&user).await?;
    ensure_visible(&state, &scope, &invoice).await?;

    Ok(Json(invoice))
}

#[instrument(skip(state, user))]
pub async fn get_invoice_by_work_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(work_order_id): Path<i64>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = state
        .db
        .get_invoice_by_work_order(work_order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    let scope = state.db.resolve_scope(&user).await?;
    ensure_visible(&state, &scope, &invoice).await?;

    Ok(Json(invoice))
}

#[instrument(skip(state, user, payload))]
pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only managers can create invoices"
        )));
    }

    let invoice = state
        .db
        .create_invoice(payload.work_order_id, payload.tax_rate)
        .await?;

    Ok((StatusCode::CREATED, Json(invoice)))
}
