pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::middleware::from_fn_with_state;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use secrecy::ExposeSecret;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use config::Config;
use middleware::auth_middleware;
use services::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

pub struct Application {
    host: String,
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        let state = AppState {
            db,
            config: config.clone(),
        };

        let protected = Router::new()
            // Booking endpoints
            .route("/bookings", get(handlers::bookings::list_bookings))
            .route("/bookings", post(handlers::bookings::create_booking))
            .route("/bookings/:id", get(handlers::bookings::get_booking))
            .route("/bookings/:id", put(handlers::bookings::update_booking))
            .route(
                "/bookings/:id/cancel",
                post(handlers::bookings::cancel_booking),
            )
            // Work order endpoints
            .route("/workorders", get(handlers::work_orders::list_work_orders))
            .route("/workorders", post(handlers::work_orders::create_work_order))
            .route(
                "/workorders/:id",
                get(handlers::work_orders::get_work_order),
            )
            .route(
                "/workorders/:id",
                put(handlers::work_orders::update_work_order),
            )
            .route(
                "/workorders/:id",
                delete(handlers::work_orders::delete_work_order),
            )
            // Invoice endpoints
            .route("/invoices", get(handlers::invoices::list_invoices))
            .route("/invoices", post(handlers::invoices::create_invoice))
            .route("/invoices/:id", get(handlers::invoices::get_invoice))
            .route(
                "/invoices/workorder/:work_order_id",
                get(handlers::invoices::get_invoice_by_work_order),
            )
            // Payment endpoints
            .route("/payments", get(handlers::payments::list_payments))
            .route("/payments", post(handlers::payments::create_payment))
            .route("/payments/:id", get(handlers::payments::get_payment))
            .route("/payments/:id", put(handlers::payments::update_payment))
            .route("/payments/:id", delete(handlers::payments::delete_payment))
            .route(
                "/payments/:id/complete",
                put(handlers::payments::complete_payment),
            )
            .layer(from_fn_with_state(state.clone(), auth_middleware));

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .merge(protected)
            .layer(CorsLayer::permissive())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            host: config.server.host,
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }
}
