//! Request payloads for the HTTP surface.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::{BookingStatus, PaymentMethod, WorkOrderStatus};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    /// Honored only for managers booking on a client's behalf.
    pub client_id: Option<String>,
    pub vehicle_id: Option<i64>,
    pub service_type_id: Option<i64>,
    pub service_center_id: Option<i64>,
    pub mechanic_id: Option<i64>,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[validate(length(max = 500))]
    pub client_notes: Option<String>,
}

/// Manager-only full booking update; assigning a mechanic here drives
/// work-order creation.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub vehicle_id: Option<i64>,
    pub service_type_id: Option<i64>,
    pub service_center_id: Option<i64>,
    pub mechanic_id: Option<i64>,
    pub booking_date: Option<NaiveDate>,
    pub booking_time: Option<NaiveTime>,
    pub status: Option<BookingStatus>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[validate(length(max = 500))]
    pub client_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkOrderRequest {
    pub booking_id: i64,
    pub mechanic_id: i64,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    pub estimated_duration_minutes: Option<i32>,
}

/// Work-order patch. Mechanics may only touch status, mechanicNotes and
/// actualDurationMinutes; managers get the full field set.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkOrderRequest {
    pub status: Option<WorkOrderStatus>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[validate(length(max = 2000))]
    pub mechanic_notes: Option<String>,
    pub estimated_duration_minutes: Option<i32>,
    pub actual_duration_minutes: Option<i32>,
    pub labor_cost: Option<Decimal>,
    pub parts_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub work_order_id: i64,
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub work_order_id: i64,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(max = 100))]
    pub transaction_id: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Manager patch for a still-pending payment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub method: Option<PaymentMethod>,
    #[validate(length(max = 100))]
    pub transaction_id: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}
