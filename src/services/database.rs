//! Database service for booking-service.
//!
//! All SQL lives here. Check-then-act sequences (slot conflicts, payment
//! balances, work-order upserts) run inside transactions, with unique
//! indexes backing the invariants against racing writers.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

use crate::dtos::{
    CreateBookingRequest, CreatePaymentRequest, CreateWorkOrderRequest, UpdateBookingRequest,
    UpdatePaymentRequest,
};
use crate::error::AppError;
use crate::models::{
    Booking, BookingStatus, Invoice, ListBookingsFilter, Mechanic, Payment, PaymentStatus,
    WorkOrder, WorkOrderChanges, WorkOrderStatus,
};
use crate::services::lifecycle::{
    self, assignment_target, evaluate_payment, PaymentOutcome,
};
use crate::services::scope::AccessScope;

const BOOKING_COLUMNS: &str = "id, client_id, vehicle_id, service_type_id, service_center_id, \
     mechanic_id, booking_date, booking_time, status, notes, client_notes, \
     created_at, updated_at, cancelled_at";

const WORK_ORDER_COLUMNS: &str = "id, booking_id, mechanic_id, status, description, mechanic_notes, \
     estimated_duration_minutes, actual_duration_minutes, labor_cost, parts_cost, \
     total_cost, started_at, completed_at, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, invoice_number, work_order_id, sub_total, tax_amount, \
     total_amount, invoice_date, due_date, created_at";

const PAYMENT_COLUMNS: &str =
    "id, work_order_id, amount, method, status, transaction_id, notes, payment_date, created_at";

/// Scope bindings for list queries: `(mechanic_id, client_id)` with `None`
/// meaning "not constrained". Returns `None` for the empty scope.
fn scope_binds(scope: &AccessScope) -> Option<(Option<i64>, Option<String>)> {
    match scope {
        AccessScope::All => Some((None, None)),
        AccessScope::Mechanic(id) => Some((Some(*id), None)),
        AccessScope::Client(user_id) => Some((None, Some(user_id.clone()))),
        AccessScope::Nothing => None,
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "booking-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Mechanic Operations
    // -------------------------------------------------------------------------

    /// Look up the mechanic profile linked to an identity-provider user.
    #[instrument(skip(self))]
    pub async fn find_mechanic_by_user(&self, user_id: &str) -> Result<Option<Mechanic>, AppError> {
        let mechanic = sqlx::query_as::<_, Mechanic>(
            "SELECT id, user_id, service_center_id, specialization, hourly_rate, is_available, created_at \
             FROM mechanics WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get mechanic: {}", e)))?;

        Ok(mechanic)
    }

    #[instrument(skip(self))]
    pub async fn get_mechanic(&self, id: i64) -> Result<Option<Mechanic>, AppError> {
        let mechanic = sqlx::query_as::<_, Mechanic>(
            "SELECT id, user_id, service_center_id, specialization, hourly_rate, is_available, created_at \
             FROM mechanics WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get mechanic: {}", e)))?;

        Ok(mechanic)
    }

    /// Resolve the caller's visibility scope, fetching the mechanic profile
    /// when the Mechanic role is in play.
    pub async fn resolve_scope(
        &self,
        user: &crate::middleware::AuthUser,
    ) -> Result<AccessScope, AppError> {
        let mechanic_id = if user.is_mechanic() && !user.is_manager() {
            self.find_mechanic_by_user(&user.user_id).await?.map(|m| m.id)
        } else {
            None
        };
        Ok(AccessScope::for_user(user, mechanic_id))
    }

    // -------------------------------------------------------------------------
    // Booking Operations
    // -------------------------------------------------------------------------

    /// List bookings visible to the scope, newest date first, time ascending.
    #[instrument(skip(self, scope, filter))]
    pub async fn list_bookings(
        &self,
        scope: &AccessScope,
        filter: &ListBookingsFilter,
    ) -> Result<Vec<Booking>, AppError> {
        let Some((mechanic_id, client_id)) = scope_binds(scope) else {
            return Ok(Vec::new());
        };

        let bookings = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE ($1::bigint IS NULL OR mechanic_id = $1)
              AND ($2::text IS NULL OR client_id = $2)
              AND ($3::date IS NULL OR booking_date >= $3)
              AND ($4::date IS NULL OR booking_date <= $4)
            ORDER BY booking_date DESC, booking_time ASC
            "#
        ))
        .bind(mechanic_id)
        .bind(client_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list bookings: {}", e)))?;

        Ok(bookings)
    }

    #[instrument(skip(self))]
    pub async fn get_booking(&self, id: i64) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get booking: {}", e)))?;

        Ok(booking)
    }

    /// Create a booking. When a mechanic is requested, the slot-conflict
    /// check and the insert share one transaction; the partial unique index
    /// on the slot catches racers that slip past the check.
    #[instrument(skip(self, input), fields(client_id = %client_id))]
    pub async fn create_booking(
        &self,
        client_id: &str,
        input: &CreateBookingRequest,
    ) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        if let Some(mechanic_id) = input.mechanic_id {
            let conflict: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM bookings
                    WHERE mechanic_id = $1
                      AND booking_date = $2
                      AND booking_time = $3
                      AND status <> 'cancelled'
                )
                "#,
            )
            .bind(mechanic_id)
            .bind(input.booking_date)
            .bind(input.booking_time)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to check slot: {}", e))
            })?;

            if conflict {
                return Err(AppError::SlotConflict(
                    "The selected time slot is not available.".to_string(),
                ));
            }
        }

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings (
                client_id, vehicle_id, service_type_id, service_center_id, mechanic_id,
                booking_date, booking_time, status, notes, client_notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(client_id)
        .bind(input.vehicle_id)
        .bind(input.service_type_id)
        .bind(input.service_center_id)
        .bind(input.mechanic_id)
        .bind(input.booking_date)
        .bind(input.booking_time)
        .bind(&input.notes)
        .bind(&input.client_notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::SlotConflict("The selected time slot is not available.".to_string())
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create booking: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(booking_id = booking.id, "Booking created");

        Ok(booking)
    }

    /// Manager booking update. A new or changed mechanic assignment ensures
    /// exactly one work order exists for the booking (insert if absent, else
    /// retarget), and a pending booking advances to confirmed.
    #[instrument(skip(self, input))]
    pub async fn update_booking(
        &self,
        id: i64,
        input: &UpdateBookingRequest,
    ) -> Result<Option<Booking>, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get booking: {}", e)))?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let target = assignment_target(existing.mechanic_id, input.mechanic_id);

        // Explicit status wins; otherwise first assignment confirms a
        // pending booking.
        let status = match (&input.status, target) {
            (Some(status), _) => Some(status.as_str().to_string()),
            (None, Some(_)) if existing.status() == BookingStatus::Pending => {
                Some(BookingStatus::Confirmed.as_str().to_string())
            }
            _ => None,
        };

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings
            SET vehicle_id = COALESCE($2, vehicle_id),
                service_type_id = COALESCE($3, service_type_id),
                service_center_id = COALESCE($4, service_center_id),
                mechanic_id = COALESCE($5, mechanic_id),
                booking_date = COALESCE($6, booking_date),
                booking_time = COALESCE($7, booking_time),
                status = COALESCE($8, status),
                notes = COALESCE($9, notes),
                client_notes = COALESCE($10, client_notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(input.vehicle_id)
        .bind(input.service_type_id)
        .bind(input.service_center_id)
        .bind(input.mechanic_id)
        .bind(input.booking_date)
        .bind(input.booking_time)
        .bind(status)
        .bind(&input.notes)
        .bind(&input.client_notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::SlotConflict("The selected time slot is not available.".to_string())
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to update booking: {}", e)),
        })?;

        if let Some(mechanic_id) = target {
            let work_order_id: Option<i64> =
                sqlx::query_scalar("SELECT id FROM work_orders WHERE booking_id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!("Failed to get work order: {}", e))
                    })?;

            match work_order_id {
                Some(work_order_id) => {
                    sqlx::query(
                        "UPDATE work_orders SET mechanic_id = $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(work_order_id)
                    .bind(mechanic_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Failed to retarget work order: {}",
                            e
                        ))
                    })?;

                    info!(booking_id = id, work_order_id, mechanic_id, "Work order retargeted");
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO work_orders (booking_id, mechanic_id, status, description)
                        VALUES ($1, $2, 'scheduled', $3)
                        "#,
                    )
                    .bind(id)
                    .bind(mechanic_id)
                    .bind(&booking.notes)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Failed to create work order: {}",
                            e
                        ))
                    })?;

                    info!(booking_id = id, mechanic_id, "Work order created on assignment");
                }
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(Some(booking))
    }

    /// Mark a booking cancelled. Authorization and lead-time checks happen in
    /// the booking engine before this runs.
    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, id: i64) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancelled_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel booking: {}", e)))?;

        if booking.is_some() {
            info!(booking_id = id, "Booking cancelled");
        }

        Ok(booking)
    }

    // -------------------------------------------------------------------------
    // Work Order Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, scope))]
    pub async fn list_work_orders(&self, scope: &AccessScope) -> Result<Vec<WorkOrder>, AppError> {
        let Some((mechanic_id, client_id)) = scope_binds(scope) else {
            return Ok(Vec::new());
        };

        let work_orders = sqlx::query_as::<_, WorkOrder>(&format!(
            r#"
            SELECT {WORK_ORDER_COLUMNS}
            FROM work_orders
            WHERE ($1::bigint IS NULL OR mechanic_id = $1)
              AND ($2::text IS NULL OR EXISTS (
                    SELECT 1 FROM bookings b
                    WHERE b.id = work_orders.booking_id AND b.client_id = $2
              ))
            ORDER BY created_at DESC
            "#
        ))
        .bind(mechanic_id)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list work orders: {}", e))
        })?;

        Ok(work_orders)
    }

    #[instrument(skip(self))]
    pub async fn get_work_order(&self, id: i64) -> Result<Option<WorkOrder>, AppError> {
        let work_order = sqlx::query_as::<_, WorkOrder>(&format!(
            "SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get work order: {}", e)))?;

        Ok(work_order)
    }

    /// The booking that owns a work order, for ownership checks.
    #[instrument(skip(self))]
    pub async fn booking_for_work_order(
        &self,
        work_order_id: i64,
    ) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>(
            r#"
            SELECT b.id, b.client_id, b.vehicle_id, b.service_type_id, b.service_center_id,
                   b.mechanic_id, b.booking_date, b.booking_time, b.status, b.notes,
                   b.client_notes, b.created_at, b.updated_at, b.cancelled_at
            FROM bookings b
            JOIN work_orders wo ON wo.booking_id = b.id
            WHERE wo.id = $1
            "#,
        )
        .bind(work_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get owning booking: {}", e))
        })?;

        Ok(booking)
    }

    /// Direct work-order creation (manager). The unique index on booking_id
    /// keeps the 1:1 with the owning booking.
    #[instrument(skip(self, input))]
    pub async fn create_work_order(
        &self,
        input: &CreateWorkOrderRequest,
    ) -> Result<WorkOrder, AppError> {
        let work_order = sqlx::query_as::<_, WorkOrder>(&format!(
            r#"
            INSERT INTO work_orders (
                booking_id, mechanic_id, status, description, estimated_duration_minutes
            )
            VALUES ($1, $2, 'scheduled', $3, $4)
            RETURNING {WORK_ORDER_COLUMNS}
            "#
        ))
        .bind(input.booking_id)
        .bind(input.mechanic_id)
        .bind(&input.description)
        .bind(input.estimated_duration_minutes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("A work order already exists for this booking.".to_string())
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create work order: {}", e)),
        })?;

        info!(work_order_id = work_order.id, "Work order created");

        Ok(work_order)
    }

    /// Apply resolved field changes to a work order.
    #[instrument(skip(self, changes))]
    pub async fn update_work_order(
        &self,
        id: i64,
        changes: &WorkOrderChanges,
    ) -> Result<Option<WorkOrder>, AppError> {
        let work_order = sqlx::query_as::<_, WorkOrder>(&format!(
            r#"
            UPDATE work_orders
            SET status = COALESCE($2, status),
                description = COALESCE($3, description),
                mechanic_notes = COALESCE($4, mechanic_notes),
                estimated_duration_minutes = COALESCE($5, estimated_duration_minutes),
                actual_duration_minutes = COALESCE($6, actual_duration_minutes),
                labor_cost = COALESCE($7, labor_cost),
                parts_cost = COALESCE($8, parts_cost),
                total_cost = COALESCE($9, total_cost),
                started_at = COALESCE($10, started_at),
                completed_at = COALESCE($11, completed_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {WORK_ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.status)
        .bind(&changes.description)
        .bind(&changes.mechanic_notes)
        .bind(changes.estimated_duration_minutes)
        .bind(changes.actual_duration_minutes)
        .bind(changes.labor_cost)
        .bind(changes.parts_cost)
        .bind(changes.total_cost)
        .bind(changes.started_at)
        .bind(changes.completed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update work order: {}", e))
        })?;

        Ok(work_order)
    }

    #[instrument(skip(self))]
    pub async fn delete_work_order(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM work_orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete work order: {}", e))
            })?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(work_order_id = id, "Work order deleted");
        }

        Ok(deleted)
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    /// Generate the single invoice for a completed work order.
    #[instrument(skip(self))]
    pub async fn create_invoice(
        &self,
        work_order_id: i64,
        tax_rate: Option<Decimal>,
    ) -> Result<Invoice, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let work_order = sqlx::query_as::<_, WorkOrder>(&format!(
            "SELECT {WORK_ORDER_COLUMNS} FROM work_orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(work_order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get work order: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("WorkOrder not found")))?;

        if !work_order.status().invoiceable() {
            return Err(AppError::InvalidState(
                "WorkOrder must be Completed or ReadyForPayment to create invoice.".to_string(),
            ));
        }

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM invoices WHERE work_order_id = $1")
                .bind(work_order_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to check invoice: {}", e))
                })?;

        if existing.is_some() {
            return Err(AppError::Conflict(
                "Invoice already exists for this WorkOrder.".to_string(),
            ));
        }

        let now = Utc::now();
        let sub_total = work_order.total_cost.unwrap_or(Decimal::ZERO);
        let tax_rate = tax_rate.unwrap_or_else(lifecycle::default_tax_rate);
        let (tax_amount, total_amount) = lifecycle::invoice_amounts(sub_total, tax_rate);

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            INSERT INTO invoices (
                invoice_number, work_order_id, sub_total, tax_amount, total_amount,
                invoice_date, due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(lifecycle::invoice_number(now, work_order_id))
        .bind(work_order_id)
        .bind(sub_total)
        .bind(tax_amount)
        .bind(total_amount)
        .bind(now)
        .bind(lifecycle::invoice_due_date(now))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("Invoice already exists for this WorkOrder.".to_string())
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(
            invoice_id = invoice.id,
            invoice_number = %invoice.invoice_number,
            total_amount = %invoice.total_amount,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// List all invoices, newest first. Manager-only at the HTTP surface.
    #[instrument(skip(self))]
    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, AppError> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY invoice_date DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        Ok(invoices)
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        Ok(invoice)
    }

    #[instrument(skip(self))]
    pub async fn get_invoice_by_work_order(
        &self,
        work_order_id: i64,
    ) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE work_order_id = $1"
        ))
        .bind(work_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        Ok(invoice)
    }

    // -------------------------------------------------------------------------
    // Payment Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, scope))]
    pub async fn list_payments(&self, scope: &AccessScope) -> Result<Vec<Payment>, AppError> {
        let Some((mechanic_id, client_id)) = scope_binds(scope) else {
            return Ok(Vec::new());
        };

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.id, p.work_order_id, p.amount, p.method, p.status, p.transaction_id,
                   p.notes, p.payment_date, p.created_at
            FROM payments p
            JOIN work_orders wo ON wo.id = p.work_order_id
            WHERE ($1::bigint IS NULL OR wo.mechanic_id = $1)
              AND ($2::text IS NULL OR EXISTS (
                    SELECT 1 FROM bookings b
                    WHERE b.id = wo.booking_id AND b.client_id = $2
              ))
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(mechanic_id)
        .bind(client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        Ok(payments)
    }

    #[instrument(skip(self))]
    pub async fn get_payment(&self, id: i64) -> Result<Option<Payment>, AppError> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        Ok(payment)
    }

    /// Record a payment against a work order's invoice. The row lock on the
    /// invoice serializes concurrent payments toward the same balance; a
    /// settling payment closes the work order and completes the booking in
    /// the same transaction.
    #[instrument(skip(self, input), fields(work_order_id = input.work_order_id, amount = %input.amount))]
    pub async fn create_payment(&self, input: &CreatePaymentRequest) -> Result<Payment, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE work_order_id = $1 FOR UPDATE"
        ))
        .bind(input.work_order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| {
            AppError::Precondition(
                "No invoice exists for this work order yet. Create the invoice first.".to_string(),
            )
        })?;

        let prior_completed: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payments \
             WHERE work_order_id = $1 AND status = 'completed'",
        )
        .bind(input.work_order_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))?;

        let outcome = evaluate_payment(input.amount, prior_completed, invoice.total_amount);
        let status = match outcome {
            PaymentOutcome::ExceedsBalance { remaining } => {
                return Err(AppError::ExceedsBalance(format!(
                    "Payment amount {} exceeds the remaining balance {}.",
                    input.amount, remaining
                )));
            }
            PaymentOutcome::Settles => PaymentStatus::Completed,
            PaymentOutcome::Partial => PaymentStatus::Pending,
        };

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (work_order_id, amount, method, status, transaction_id, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(input.work_order_id)
        .bind(input.amount)
        .bind(input.method.as_str())
        .bind(status.as_str())
        .bind(&input.transaction_id)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        if status == PaymentStatus::Completed {
            Self::close_work_order(&mut tx, input.work_order_id).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(
            payment_id = payment.id,
            amount = %payment.amount,
            status = %payment.status,
            "Payment recorded"
        );

        Ok(payment)
    }

    /// Complete a pending payment. Idempotent: an already-completed payment
    /// comes back unchanged with the flag set.
    #[instrument(skip(self))]
    pub async fn complete_payment(&self, id: i64) -> Result<(Payment, bool), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        if payment.status() == PaymentStatus::Completed {
            return Ok((payment, true));
        }

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE work_order_id = $1 FOR UPDATE"
        ))
        .bind(payment.work_order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?
        .ok_or_else(|| {
            AppError::Precondition("No invoice exists for this work order yet.".to_string())
        })?;

        let prior_completed: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0) FROM payments \
             WHERE work_order_id = $1 AND status = 'completed' AND id <> $2",
        )
        .bind(payment.work_order_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))?;

        let settles = match evaluate_payment(payment.amount, prior_completed, invoice.total_amount)
        {
            PaymentOutcome::ExceedsBalance { remaining } => {
                return Err(AppError::ExceedsBalance(format!(
                    "Completing payment {} would exceed the remaining balance {}.",
                    payment.amount, remaining
                )));
            }
            PaymentOutcome::Settles => true,
            PaymentOutcome::Partial => false,
        };

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'completed', payment_date = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to complete payment: {}", e))
        })?;

        if settles {
            Self::close_work_order(&mut tx, payment.work_order_id).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(payment_id = id, settles, "Payment completed");

        Ok((payment, false))
    }

    /// Patch a still-pending payment. The row lock keeps a concurrent
    /// completion from slipping between the status check and the write.
    #[instrument(skip(self, input))]
    pub async fn update_payment(
        &self,
        id: i64,
        input: &UpdatePaymentRequest,
    ) -> Result<Option<Payment>, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        if existing.status() != PaymentStatus::Pending {
            return Err(AppError::InvalidState(
                "Only pending payments can be updated.".to_string(),
            ));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET method = COALESCE($2, method),
                transaction_id = COALESCE($3, transaction_id),
                notes = COALESCE($4, notes)
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(input.method.map(|m| m.as_str()))
        .bind(&input.transaction_id)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update payment: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(Some(payment))
    }

    #[instrument(skip(self))]
    pub async fn delete_payment(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment: {}", e))
            })?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(payment_id = id, "Payment deleted");
        }

        Ok(deleted)
    }

    /// Terminal transition: full payment closes the work order and completes
    /// the owning booking.
    async fn close_work_order(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        work_order_id: i64,
    ) -> Result<(), AppError> {
        let booking_id: i64 = sqlx::query_scalar(
            &format!(
                "UPDATE work_orders SET status = '{}', updated_at = NOW() WHERE id = $1 RETURNING booking_id",
                WorkOrderStatus::Closed.as_str()
            ),
        )
        .bind(work_order_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to close work order: {}", e))
        })?;

        sqlx::query(&format!(
            "UPDATE bookings SET status = '{}', updated_at = NOW() WHERE id = $1",
            BookingStatus::Completed.as_str()
        ))
        .bind(booking_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to complete booking: {}", e))
        })?;

        info!(work_order_id, booking_id, "Work order closed on full payment");

        Ok(())
    }
}
