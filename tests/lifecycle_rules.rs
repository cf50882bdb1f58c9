//! End-to-end checks of the appointment lifecycle rules: cancellation
//! windows, work-order transition stamping, invoice math and payment
//! settlement, exercised through the crate's public API.

use booking_service::middleware::{AuthUser, Role};
use booking_service::models::WorkOrderStatus;
use booking_service::services::lifecycle::{
    self, PaymentOutcome, StatusStamps,
};
use booking_service::services::AccessScope;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn user(id: &str, roles: Vec<Role>) -> AuthUser {
    AuthUser {
        user_id: id.to_string(),
        roles,
    }
}

#[test]
fn client_cancellation_window_closes_at_24_hours() {
    let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
    let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();

    let early = Utc.with_ymd_and_hms(2024, 6, 9, 9, 0, 0).unwrap();
    assert!(lifecycle::client_may_cancel(date, time, early));

    let late = Utc.with_ymd_and_hms(2024, 6, 9, 11, 0, 0).unwrap();
    assert!(!lifecycle::client_may_cancel(date, time, late));

    // Exactly 24 hours out still makes the window.
    let boundary = Utc.with_ymd_and_hms(2024, 6, 9, 10, 0, 0).unwrap();
    assert!(lifecycle::client_may_cancel(date, time, boundary));
}

#[test]
fn reassigning_the_same_mechanic_is_a_no_op() {
    assert_eq!(lifecycle::assignment_target(None, Some(7)), Some(7));
    assert_eq!(lifecycle::assignment_target(Some(3), Some(7)), Some(7));
    assert_eq!(lifecycle::assignment_target(Some(7), Some(7)), None);
    assert_eq!(lifecycle::assignment_target(Some(7), None), None);
}

#[test]
fn starting_work_stamps_once() {
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 10, 5, 0).unwrap();

    let first = lifecycle::mechanic_transition_stamps(
        WorkOrderStatus::InProgress,
        None,
        None,
        None,
        None,
        now,
    );
    assert_eq!(first.started_at, Some(now));
    assert_eq!(first.completed_at, None);

    // A second pass through in_progress leaves the original stamp alone.
    let later = now + chrono::Duration::hours(1);
    let second = lifecycle::mechanic_transition_stamps(
        WorkOrderStatus::InProgress,
        Some(now),
        None,
        None,
        None,
        later,
    );
    assert_eq!(second, StatusStamps::default());
}

#[test]
fn completion_derives_labor_from_actual_time_and_rate() {
    let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 30, 0).unwrap();

    let stamps = lifecycle::mechanic_transition_stamps(
        WorkOrderStatus::Completed,
        Some(now - chrono::Duration::hours(2)),
        None,
        Some(90),
        Some(dec("50")),
        now,
    );
    assert_eq!(stamps.completed_at, Some(now));
    assert_eq!(stamps.labor_cost, Some(dec("75.00")));

    // Missing rate means no derived labor, but the stamp still lands.
    let no_rate = lifecycle::mechanic_transition_stamps(
        WorkOrderStatus::Completed,
        None,
        None,
        Some(90),
        None,
        now,
    );
    assert_eq!(no_rate.completed_at, Some(now));
    assert_eq!(no_rate.labor_cost, None);
}

#[test]
fn completing_recomputes_total_from_cost_parts() {
    let total = lifecycle::total_cost_after_transition(
        WorkOrderStatus::InProgress,
        WorkOrderStatus::Completed,
        Some(dec("75.00")),
        Some(dec("120.50")),
        Some(dec("10.00")),
    );
    assert_eq!(total, Some(dec("195.50")));

    // Moving to ready_for_payment preserves a finalized total.
    let kept = lifecycle::total_cost_after_transition(
        WorkOrderStatus::Completed,
        WorkOrderStatus::ReadyForPayment,
        Some(dec("75.00")),
        Some(dec("120.50")),
        Some(dec("200.00")),
    );
    assert_eq!(kept, None);

    // But fills in a missing one.
    let filled = lifecycle::total_cost_after_transition(
        WorkOrderStatus::Completed,
        WorkOrderStatus::ReadyForPayment,
        Some(dec("75.00")),
        None,
        None,
    );
    assert_eq!(filled, Some(dec("75.00")));
}

#[test]
fn invoice_math_matches_the_published_format() {
    let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();

    assert_eq!(lifecycle::invoice_number(now, 42), "INV-20240615-0042");

    let (tax, total) = lifecycle::invoice_amounts(dec("195.50"), lifecycle::default_tax_rate());
    assert_eq!(tax, dec("35.19"));
    assert_eq!(total, dec("230.69"));

    assert_eq!(
        lifecycle::invoice_due_date(now),
        Utc.with_ymd_and_hms(2024, 7, 15, 9, 0, 0).unwrap()
    );
}

#[test]
fn payments_partial_then_settling_then_rejected() {
    let total = dec("230.69");

    // First partial payment stays pending.
    assert_eq!(
        lifecycle::evaluate_payment(dec("100.00"), Decimal::ZERO, total),
        PaymentOutcome::Partial
    );

    // Exact remainder settles.
    assert_eq!(
        lifecycle::evaluate_payment(dec("130.69"), dec("100.00"), total),
        PaymentOutcome::Settles
    );

    // Anything past the remainder is rejected with the balance.
    assert_eq!(
        lifecycle::evaluate_payment(dec("140.00"), dec("100.00"), total),
        PaymentOutcome::ExceedsBalance {
            remaining: dec("130.69")
        }
    );
}

#[test]
fn manager_scope_sees_everything_regardless_of_other_roles() {
    let u = user("u-1", vec![Role::Manager, Role::Mechanic, Role::Client]);
    assert_eq!(AccessScope::for_user(&u, Some(5)), AccessScope::All);
}

#[test]
fn mechanic_scope_requires_a_linked_profile() {
    let u = user("u-2", vec![Role::Mechanic]);
    assert_eq!(AccessScope::for_user(&u, Some(5)), AccessScope::Mechanic(5));
    assert_eq!(AccessScope::for_user(&u, None), AccessScope::Nothing);
}

#[test]
fn client_scope_is_limited_to_own_records() {
    let u = user("u-3", vec![Role::Client]);
    assert_eq!(
        AccessScope::for_user(&u, None),
        AccessScope::Client("u-3".to_string())
    );
}

#[test]
fn unknown_roles_grant_no_visibility() {
    let u = user("u-4", vec![]);
    assert_eq!(AccessScope::for_user(&u, None), AccessScope::Nothing);
}
