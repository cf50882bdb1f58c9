//! Mechanic profile: links an identity-provider user to shop-floor data.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Mechanic {
    pub id: i64,
    pub user_id: String,
    pub service_center_id: Option<i64>,
    pub specialization: Option<String>,
    pub hourly_rate: Option<Decimal>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}
