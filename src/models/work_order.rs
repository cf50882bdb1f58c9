//! Work order model: the unit of mechanical work tied to an active booking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Work order status.
///
/// Nominal path is Scheduled -> InProgress -> Completed -> ReadyForPayment ->
/// Closed. `Closed` is only reached through full payment; managers may set
/// any other status directly (transition legality is not enforced for them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Scheduled,
    InProgress,
    Completed,
    ReadyForPayment,
    Closed,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Scheduled => "scheduled",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::ReadyForPayment => "ready_for_payment",
            WorkOrderStatus::Closed => "closed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "in_progress" => WorkOrderStatus::InProgress,
            "completed" => WorkOrderStatus::Completed,
            "ready_for_payment" => WorkOrderStatus::ReadyForPayment,
            "closed" => WorkOrderStatus::Closed,
            _ => WorkOrderStatus::Scheduled,
        }
    }

    /// Whether an invoice may be raised against a work order in this status.
    pub fn invoiceable(&self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Completed | WorkOrderStatus::ReadyForPayment
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    pub id: i64,
    pub booking_id: i64,
    pub mechanic_id: i64,
    pub status: String,
    pub description: Option<String>,
    pub mechanic_notes: Option<String>,
    pub estimated_duration_minutes: Option<i32>,
    pub actual_duration_minutes: Option<i32>,
    pub labor_cost: Option<Decimal>,
    pub parts_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkOrder {
    pub fn status(&self) -> WorkOrderStatus {
        WorkOrderStatus::from_string(&self.status)
    }
}

/// Resolved field changes for a work-order update. Handlers fold the caller's
/// patch and the transition side effects into this before anything is written;
/// `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct WorkOrderChanges {
    pub status: Option<String>,
    pub description: Option<String>,
    pub mechanic_notes: Option<String>,
    pub estimated_duration_minutes: Option<i32>,
    pub actual_duration_minutes: Option<i32>,
    pub labor_cost: Option<Decimal>,
    pub parts_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
