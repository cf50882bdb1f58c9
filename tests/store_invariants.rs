//! Store-level invariant tests: slot-conflict rejection and the terminal
//! settlement cascade, which live in SQL rather than in the pure rule layer.
//!
//! Each test spins up a throwaway database from `BOOKING_TEST_DATABASE_URL`
//! (an admin connection string, e.g. `postgres://postgres@localhost/postgres`)
//! and runs the embedded migrations against it. Without that variable the
//! tests are skipped so the suite stays runnable offline.

use std::sync::atomic::{AtomicU32, Ordering};

use booking_service::dtos::{
    CreateBookingRequest, CreatePaymentRequest, CreateWorkOrderRequest, UpdatePaymentRequest,
};
use booking_service::error::AppError;
use booking_service::models::{PaymentMethod, WorkOrderChanges};
use booking_service::services::Database;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;

static DB_COUNTER: AtomicU32 = AtomicU32::new(0);

const CLIENT_ID: &str = "client-1";

async fn spawn_db() -> Option<Database> {
    let admin_url = std::env::var("BOOKING_TEST_DATABASE_URL").ok()?;

    let db_name = format!(
        "booking_test_{}_{}",
        std::process::id(),
        DB_COUNTER.fetch_add(1, Ordering::Relaxed)
    );

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&admin_url)
        .await
        .expect("Failed to connect to admin database");
    sqlx::query(&format!(r#"CREATE DATABASE "{}""#, db_name))
        .execute(&admin)
        .await
        .expect("Failed to create test database");

    let (prefix, _) = admin_url
        .rsplit_once('/')
        .expect("Admin database URL has no database segment");
    let url = format!("{}/{}", prefix, db_name);

    let db = Database::new(&url, 5, 1)
        .await
        .expect("Failed to connect to test database");
    db.run_migrations().await.expect("Failed to run migrations");

    Some(db)
}

async fn seed_mechanic(db: &Database, user_id: &str, hourly_rate: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO mechanics (user_id, hourly_rate) VALUES ($1, $2) RETURNING id",
    )
    .bind(user_id)
    .bind(hourly_rate.parse::<Decimal>().unwrap())
    .fetch_one(db.pool())
    .await
    .expect("Failed to seed mechanic")
}

fn booking_draft(mechanic_id: Option<i64>, date: NaiveDate, time: NaiveTime) -> CreateBookingRequest {
    CreateBookingRequest {
        client_id: None,
        vehicle_id: None,
        service_type_id: None,
        service_center_id: None,
        mechanic_id,
        booking_date: date,
        booking_time: time,
        notes: None,
        client_notes: None,
    }
}

fn payment_of(work_order_id: i64, amount: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        work_order_id,
        amount: amount.parse().unwrap(),
        method: PaymentMethod::Cash,
        transaction_id: None,
        notes: None,
    }
}

/// Book a mechanic, raise the work order to a billed state and invoice it.
/// Returns (booking id, work order id, invoice total).
async fn billed_work_order(db: &Database, mechanic_id: i64) -> (i64, i64, Decimal) {
    let date = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
    let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

    let booking = db
        .create_booking(CLIENT_ID, &booking_draft(Some(mechanic_id), date, time))
        .await
        .expect("Failed to create booking");

    let work_order = db
        .create_work_order(&CreateWorkOrderRequest {
            booking_id: booking.id,
            mechanic_id,
            description: None,
            estimated_duration_minutes: None,
        })
        .await
        .expect("Failed to create work order");

    db.update_work_order(
        work_order.id,
        &WorkOrderChanges {
            status: Some("completed".to_string()),
            total_cost: Some("100.00".parse().unwrap()),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to complete work order");

    let invoice = db
        .create_invoice(work_order.id, Some("0.18".parse().unwrap()))
        .await
        .expect("Failed to create invoice");

    (booking.id, work_order.id, invoice.total_amount)
}

async fn statuses(db: &Database, booking_id: i64, work_order_id: i64) -> (String, String) {
    let booking = db.get_booking(booking_id).await.unwrap().unwrap();
    let work_order = db.get_work_order(work_order_id).await.unwrap().unwrap();
    (booking.status, work_order.status)
}

#[tokio::test]
async fn second_booking_for_a_taken_slot_is_rejected() {
    let Some(db) = spawn_db().await else {
        return;
    };
    let mechanic_id = seed_mechanic(&db, "mech-1", "40").await;

    let date = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
    let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

    db.create_booking(CLIENT_ID, &booking_draft(Some(mechanic_id), date, time))
        .await
        .expect("First booking should succeed");

    let second = db
        .create_booking("client-2", &booking_draft(Some(mechanic_id), date, time))
        .await;
    assert!(matches!(second, Err(AppError::SlotConflict(_))));

    // A different time on the same day is free.
    let later = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    db.create_booking("client-2", &booking_draft(Some(mechanic_id), date, later))
        .await
        .expect("Different slot should succeed");
}

#[tokio::test]
async fn cancelled_booking_frees_its_slot() {
    let Some(db) = spawn_db().await else {
        return;
    };
    let mechanic_id = seed_mechanic(&db, "mech-1", "40").await;

    let date = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
    let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

    let booking = db
        .create_booking(CLIENT_ID, &booking_draft(Some(mechanic_id), date, time))
        .await
        .unwrap();
    db.cancel_booking(booking.id).await.unwrap();

    db.create_booking("client-2", &booking_draft(Some(mechanic_id), date, time))
        .await
        .expect("Cancelled bookings should not hold the slot");
}

#[tokio::test]
async fn full_payment_closes_work_order_and_completes_booking() {
    let Some(db) = spawn_db().await else {
        return;
    };
    let mechanic_id = seed_mechanic(&db, "mech-1", "40").await;
    let (booking_id, work_order_id, total) = billed_work_order(&db, mechanic_id).await;
    assert_eq!(total, "118.00".parse().unwrap());

    let payment = db
        .create_payment(&payment_of(work_order_id, "118.00"))
        .await
        .expect("Settling payment should succeed");
    assert_eq!(payment.status, "completed");

    let (booking_status, work_order_status) = statuses(&db, booking_id, work_order_id).await;
    assert_eq!(work_order_status, "closed");
    assert_eq!(booking_status, "completed");

    // The balance is exhausted; another payment is rejected, and the cascade
    // does not fire twice.
    let overpay = db.create_payment(&payment_of(work_order_id, "1.00")).await;
    assert!(matches!(overpay, Err(AppError::ExceedsBalance(_))));
    let (booking_status, work_order_status) = statuses(&db, booking_id, work_order_id).await;
    assert_eq!(work_order_status, "closed");
    assert_eq!(booking_status, "completed");
}

#[tokio::test]
async fn partial_payment_stays_pending_until_completed() {
    let Some(db) = spawn_db().await else {
        return;
    };
    let mechanic_id = seed_mechanic(&db, "mech-1", "40").await;
    let (booking_id, work_order_id, _) = billed_work_order(&db, mechanic_id).await;

    let first = db
        .create_payment(&payment_of(work_order_id, "50.00"))
        .await
        .unwrap();
    assert_eq!(first.status, "pending");

    // The pending payment does not count toward the balance yet.
    let (_, work_order_status) = statuses(&db, booking_id, work_order_id).await;
    assert_eq!(work_order_status, "completed");

    let (completed, already) = db.complete_payment(first.id).await.unwrap();
    assert_eq!(completed.status, "completed");
    assert!(!already);

    let second = db
        .create_payment(&payment_of(work_order_id, "68.00"))
        .await
        .unwrap();
    assert_eq!(second.status, "completed");

    let (booking_status, work_order_status) = statuses(&db, booking_id, work_order_id).await;
    assert_eq!(work_order_status, "closed");
    assert_eq!(booking_status, "completed");

    // Re-completing the settling payment is an idempotent no-op.
    let (again, already) = db.complete_payment(second.id).await.unwrap();
    assert_eq!(again.status, "completed");
    assert!(already);
}

#[tokio::test]
async fn completed_payment_cannot_be_updated() {
    let Some(db) = spawn_db().await else {
        return;
    };
    let mechanic_id = seed_mechanic(&db, "mech-1", "40").await;
    let (_, work_order_id, _) = billed_work_order(&db, mechanic_id).await;

    let payment = db
        .create_payment(&payment_of(work_order_id, "118.00"))
        .await
        .unwrap();

    let patch = UpdatePaymentRequest {
        method: Some(PaymentMethod::Online),
        transaction_id: None,
        notes: None,
    };
    let result = db.update_payment(payment.id, &patch).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));

    // A missing payment is still a plain not-found, not a state error.
    let missing = db.update_payment(payment.id + 1000, &patch).await.unwrap();
    assert!(missing.is_none());
}
