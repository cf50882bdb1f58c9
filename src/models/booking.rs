//! Booking model: a client's reservation of a service slot.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Booking lifecycle status.
///
/// A booking is created `Pending`, advances to `Confirmed` on first mechanic
/// assignment and reaches `Completed` only when its work order closes with
/// full payment. `Cancelled` is the sole exit before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    ReadyForPayment,
    Closed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::ReadyForPayment => "ready_for_payment",
            BookingStatus::Closed => "closed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "in_progress" => BookingStatus::InProgress,
            "completed" => BookingStatus::Completed,
            "cancelled" => BookingStatus::Cancelled,
            "ready_for_payment" => BookingStatus::ReadyForPayment,
            "closed" => BookingStatus::Closed,
            _ => BookingStatus::Pending,
        }
    }
}

/// Booking row. `mechanic_id` stays absent until a manager assigns one.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: i64,
    pub client_id: String,
    pub vehicle_id: Option<i64>,
    pub service_type_id: Option<i64>,
    pub service_center_id: Option<i64>,
    pub mechanic_id: Option<i64>,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub status: String,
    pub notes: Option<String>,
    pub client_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn status(&self) -> BookingStatus {
        BookingStatus::from_string(&self.status)
    }
}

/// Filter parameters for listing bookings (manager date range).
#[derive(Debug, Clone, Default)]
pub struct ListBookingsFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}
