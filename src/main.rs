// src/main.rs

use std::env;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use sqlx::{Pool, Postgres};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod billing;
mod db;
mod ingest;
mod models;
mod normalize;
mod routes;
mod sheet;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helpdesk_api=info,tower_http=info".into()),
        )
        .init();

    // Initialize DB pool (+ idempotent schema bootstrap)
    let pool = db::connect().await?;
    let state = AppState { pool };

    // Very permissive CORS for local dev (tighten for prod)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Root API router
    let api = Router::new()
        // health
        .route("/health", get(routes::health::health))
        // spreadsheet ingestion
        .route("/api/v1/ingest", post(routes::ingest::upload))
        // billing
        .route(
            "/api/v1/billing/:client_name/:month/:year",
            get(routes::billing::get_client_billing),
        )
        .route(
            "/api/v1/billing/:month/:year",
            get(routes::billing::get_all_billing),
        )
        .route(
            "/api/v1/statistics/:month/:year",
            get(routes::billing::get_statistics),
        )
        .route(
            "/api/v1/tickets/:month/:year",
            get(routes::billing::get_tickets),
        )
        // clients
        .route(
            "/api/v1/clients",
            post(routes::clients::create_client).get(routes::clients::list_clients),
        )
        .route(
            "/api/v1/clients/search",
            get(routes::clients::search_clients),
        )
        .route(
            "/api/v1/clients/:id",
            get(routes::clients::get_client)
                .put(routes::clients::update_client)
                .delete(routes::clients::deactivate_client),
        )
        // technicians
        .route(
            "/api/v1/technicians",
            post(routes::technicians::create_technician)
                .get(routes::technicians::list_technicians),
        )
        .route(
            "/api/v1/technicians/search",
            get(routes::technicians::search_technicians),
        )
        .route(
            "/api/v1/technicians/stats/:month/:year",
            get(routes::technicians::all_monthly_stats),
        )
        .route(
            "/api/v1/technicians/:id",
            get(routes::technicians::get_technician)
                .put(routes::technicians::update_technician),
        )
        .route(
            "/api/v1/technicians/:id/stats/:month/:year",
            get(routes::technicians::monthly_stats),
        )
        // admin: periods & upload batches
        .route("/api/v1/admin/periods", get(routes::admin::list_periods))
        .route(
            "/api/v1/admin/periods/:month/:year",
            delete(routes::admin::delete_period),
        )
        .route("/api/v1/admin/batches", get(routes::admin::list_batches))
        .route(
            "/api/v1/admin/batches/:batch_id",
            delete(routes::admin::delete_batch),
        )
        // state & middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // monthly exports can be large
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Port (axum 0.7 style)
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("🚀 API listening on http://127.0.0.1:{port}");

    axum::serve(listener, api.into_make_service()).await?;
    Ok(())
}
