pub mod bookings;
pub mod invoices;
pub mod payments;
pub mod work_orders;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::error::AppError;
use crate::AppState;

/// Liveness probe. Verifies the database is reachable.
pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.db.health_check().await?;
    Ok(Json(json!({
        "status": "healthy",
        "service": &state.config.service_name,
    })))
}
