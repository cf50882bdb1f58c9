//! Lifecycle recomputation rules.
//!
//! Every derived-field rule in the booking/work-order/invoice/payment
//! lifecycle lives here as a pure function keyed on the status transition
//! that triggers it, so the handlers stay orchestration-only and the
//! invariants are testable without a store.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use crate::models::WorkOrderStatus;

/// Minimum notice a client must give to cancel their own booking.
pub const CANCEL_LEAD_TIME_HOURS: f64 = 24.0;

/// Days until an invoice falls due.
pub const INVOICE_DUE_DAYS: i64 = 30;

/// Default VAT rate applied when the caller supplies none.
pub fn default_tax_rate() -> Decimal {
    Decimal::new(18, 2)
}

/// Hours remaining until the appointment slot.
///
/// The stored date and time carry no zone; they are interpreted as UTC, so
/// the cancellation window is measured on the UTC clock. Shops in other
/// zones should store slot times pre-converted to UTC.
pub fn hours_until_appointment(date: NaiveDate, time: NaiveTime, now: DateTime<Utc>) -> f64 {
    let appointment = date.and_time(time).and_utc();
    (appointment - now).num_seconds() as f64 / 3600.0
}

/// Client-initiated cancellation requires the full lead time; managers are
/// exempt from this rule.
pub fn client_may_cancel(date: NaiveDate, time: NaiveTime, now: DateTime<Utc>) -> bool {
    hours_until_appointment(date, time, now) >= CANCEL_LEAD_TIME_HOURS
}

/// Labor cost derived from actual duration and the mechanic's hourly rate.
pub fn derive_labor_cost(actual_minutes: i32, hourly_rate: Decimal) -> Decimal {
    (Decimal::from(actual_minutes) / Decimal::from(60) * hourly_rate).round_dp(2)
}

/// Timestamps and derived labor cost produced by a mechanic-driven status
/// change. Stamping is first-transition-only: an already-set timestamp is
/// never overwritten.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusStamps {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub labor_cost: Option<Decimal>,
}

pub fn mechanic_transition_stamps(
    new_status: WorkOrderStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    actual_minutes: Option<i32>,
    hourly_rate: Option<Decimal>,
    now: DateTime<Utc>,
) -> StatusStamps {
    let mut stamps = StatusStamps::default();

    match new_status {
        WorkOrderStatus::InProgress if started_at.is_none() => {
            stamps.started_at = Some(now);
        }
        WorkOrderStatus::Completed if completed_at.is_none() => {
            stamps.completed_at = Some(now);
            if let (Some(minutes), Some(rate)) = (actual_minutes, hourly_rate) {
                stamps.labor_cost = Some(derive_labor_cost(minutes, rate));
            }
        }
        _ => {}
    }

    stamps
}

/// Total-cost recomputation for manager-driven status transitions.
///
/// Transitioning to `Completed` recomputes unconditionally; transitioning to
/// `ReadyForPayment` recomputes only when the current total is unset or zero,
/// preserving a previously finalized figure. Returns `None` when the stored
/// total should be left alone.
pub fn total_cost_after_transition(
    old_status: WorkOrderStatus,
    new_status: WorkOrderStatus,
    labor_cost: Option<Decimal>,
    parts_cost: Option<Decimal>,
    current_total: Option<Decimal>,
) -> Option<Decimal> {
    if old_status == new_status {
        return None;
    }

    let recomputed = labor_cost.unwrap_or_default() + parts_cost.unwrap_or_default();
    match new_status {
        WorkOrderStatus::Completed => Some(recomputed),
        WorkOrderStatus::ReadyForPayment
            if current_total.is_none() || current_total == Some(Decimal::ZERO) =>
        {
            Some(recomputed)
        }
        _ => None,
    }
}

/// Mechanic assignment change: `Some(target)` when the requested mechanic is
/// a first assignment or differs from the current one, `None` when nothing
/// needs to happen (including re-assigning the same mechanic).
pub fn assignment_target(current: Option<i64>, requested: Option<i64>) -> Option<i64> {
    match requested {
        Some(target) if current != Some(target) => Some(target),
        _ => None,
    }
}

/// Unique invoice number: `INV-{yyyyMMdd}-{workOrderId:04}`.
pub fn invoice_number(now: DateTime<Utc>, work_order_id: i64) -> String {
    format!("INV-{}-{:04}", now.format("%Y%m%d"), work_order_id)
}

/// Tax and grand total for an invoice, rounded to 2 decimals.
pub fn invoice_amounts(sub_total: Decimal, tax_rate: Decimal) -> (Decimal, Decimal) {
    let tax_amount = (sub_total * tax_rate).round_dp(2);
    (tax_amount, sub_total + tax_amount)
}

pub fn invoice_due_date(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(INVOICE_DUE_DAYS)
}

/// Outcome of applying an amount against an invoice balance.
#[derive(Debug, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The amount overshoots what is still owed.
    ExceedsBalance { remaining: Decimal },
    /// The amount settles the invoice in full; the work order closes and the
    /// booking completes.
    Settles,
    /// A partial payment; the invoice stays open.
    Partial,
}

pub fn evaluate_payment(
    amount: Decimal,
    prior_completed: Decimal,
    invoice_total: Decimal,
) -> PaymentOutcome {
    let remaining = invoice_total - prior_completed;
    if amount > remaining {
        PaymentOutcome::ExceedsBalance { remaining }
    } else if prior_completed + amount >= invoice_total {
        PaymentOutcome::Settles
    } else {
        PaymentOutcome::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn lead_time_blocks_close_cancellations() {
        let now = Utc.with_ymd_and_hms(2024, 5, 31, 23, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        // 10 hours out: too late for a client.
        assert!(!client_may_cancel(date, time, now));

        let early = Utc.with_ymd_and_hms(2024, 5, 30, 9, 0, 0).unwrap();
        assert!(client_may_cancel(date, time, early));
    }

    #[test]
    fn labor_cost_from_duration_and_rate() {
        // 90 minutes at $40/h comes to $60.00.
        assert_eq!(derive_labor_cost(90, dec("40")), dec("60.00"));
        assert_eq!(derive_labor_cost(45, dec("50")), dec("37.50"));
    }

    #[test]
    fn starting_stamps_once() {
        let now = Utc::now();
        let stamps = mechanic_transition_stamps(
            WorkOrderStatus::InProgress,
            None,
            None,
            None,
            None,
            now,
        );
        assert_eq!(stamps.started_at, Some(now));

        // Already started: no re-stamp.
        let stamps = mechanic_transition_stamps(
            WorkOrderStatus::InProgress,
            Some(now),
            None,
            None,
            None,
            now,
        );
        assert_eq!(stamps, StatusStamps::default());
    }

    #[test]
    fn completing_stamps_and_derives_labor() {
        let now = Utc::now();
        let stamps = mechanic_transition_stamps(
            WorkOrderStatus::Completed,
            Some(now),
            None,
            Some(90),
            Some(dec("40")),
            now,
        );
        assert_eq!(stamps.completed_at, Some(now));
        assert_eq!(stamps.labor_cost, Some(dec("60.00")));
    }

    #[test]
    fn completing_without_rate_leaves_labor_unset() {
        let now = Utc::now();
        let stamps = mechanic_transition_stamps(
            WorkOrderStatus::Completed,
            None,
            None,
            Some(90),
            None,
            now,
        );
        assert_eq!(stamps.completed_at, Some(now));
        assert_eq!(stamps.labor_cost, None);
    }

    #[test]
    fn completed_transition_recomputes_total_unconditionally() {
        let total = total_cost_after_transition(
            WorkOrderStatus::InProgress,
            WorkOrderStatus::Completed,
            Some(dec("60")),
            Some(dec("40")),
            Some(dec("500")),
        );
        assert_eq!(total, Some(dec("100")));
    }

    #[test]
    fn ready_for_payment_preserves_finalized_total() {
        let kept = total_cost_after_transition(
            WorkOrderStatus::Completed,
            WorkOrderStatus::ReadyForPayment,
            Some(dec("60")),
            Some(dec("40")),
            Some(dec("120")),
        );
        assert_eq!(kept, None);

        let recomputed = total_cost_after_transition(
            WorkOrderStatus::Completed,
            WorkOrderStatus::ReadyForPayment,
            Some(dec("60")),
            Some(dec("40")),
            Some(Decimal::ZERO),
        );
        assert_eq!(recomputed, Some(dec("100")));
    }

    #[test]
    fn unchanged_status_never_recomputes() {
        let total = total_cost_after_transition(
            WorkOrderStatus::Completed,
            WorkOrderStatus::Completed,
            Some(dec("60")),
            Some(dec("40")),
            None,
        );
        assert_eq!(total, None);
    }

    #[test]
    fn reassigning_same_mechanic_is_a_noop() {
        assert_eq!(assignment_target(None, Some(3)), Some(3));
        assert_eq!(assignment_target(Some(3), Some(5)), Some(5));
        assert_eq!(assignment_target(Some(3), Some(3)), None);
        assert_eq!(assignment_target(Some(3), None), None);
    }

    #[test]
    fn invoice_number_format() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(invoice_number(now, 42), "INV-20240615-0042");
        assert_eq!(invoice_number(now, 12345), "INV-20240615-12345");
    }

    #[test]
    fn invoice_amounts_round_to_cents() {
        let (tax, total) = invoice_amounts(dec("100.00"), dec("0.18"));
        assert_eq!(tax, dec("18.00"));
        assert_eq!(total, dec("118.00"));

        let (tax, total) = invoice_amounts(dec("33.33"), dec("0.18"));
        assert_eq!(tax, dec("6.00"));
        assert_eq!(total, dec("39.33"));
    }

    #[test]
    fn payment_evaluation_covers_all_outcomes() {
        let total = dec("118.00");
        assert_eq!(
            evaluate_payment(dec("118.00"), Decimal::ZERO, total),
            PaymentOutcome::Settles
        );
        assert_eq!(
            evaluate_payment(dec("50.00"), Decimal::ZERO, total),
            PaymentOutcome::Partial
        );
        assert_eq!(
            evaluate_payment(dec("68.00"), dec("50.00"), total),
            PaymentOutcome::Settles
        );
        assert_eq!(
            evaluate_payment(dec("70.00"), dec("50.00"), total),
            PaymentOutcome::ExceedsBalance {
                remaining: dec("68.00")
            }
        );
    }
}
