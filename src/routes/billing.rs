// src/routes/billing.rs

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::query_as;

use crate::billing;
use crate::ingest::compute_statistics;
use crate::models::{IngestStats, InvoiceBreakdown, PeriodSummary, Ticket};
use crate::AppState;
use super::{check_month, internal_error, not_found};

#[derive(Serialize)]
pub struct AllBillingResp {
    pub month: i32,
    pub year: i32,
    pub clients: Vec<InvoiceBreakdown>,
    pub summary: PeriodSummary,
}

#[derive(Serialize)]
pub struct StatisticsResp {
    pub month: i32,
    pub year: i32,
    pub statistics: IngestStats,
}

/// GET /api/v1/billing/:client_name/:month/:year
pub async fn get_client_billing(
    State(state): State<AppState>,
    Path((client_name, month, year)): Path<(String, i32, i32)>,
) -> Result<Json<InvoiceBreakdown>, (StatusCode, String)> {
    check_month(month)?;
    if client_name.trim().is_empty() {
        return Err(super::bad_request("client name must not be empty"));
    }
    let breakdown = billing::client_billing(&state.pool, &client_name, month, year)
        .await
        .map_err(internal_error)?;
    Ok(Json(breakdown))
}

/// GET /api/v1/billing/:month/:year
pub async fn get_all_billing(
    State(state): State<AppState>,
    Path((month, year)): Path<(i32, i32)>,
) -> Result<Json<AllBillingResp>, (StatusCode, String)> {
    check_month(month)?;
    let clients = billing::all_clients_billing(&state.pool, month, year)
        .await
        .map_err(internal_error)?;
    let summary = billing::summarize(&clients);
    Ok(Json(AllBillingResp { month, year, clients, summary }))
}

/// GET /api/v1/statistics/:month/:year — aggregates recomputed from the
/// persisted tickets of the period.
pub async fn get_statistics(
    State(state): State<AppState>,
    Path((month, year)): Path<(i32, i32)>,
) -> Result<Json<StatisticsResp>, (StatusCode, String)> {
    check_month(month)?;
    let tickets = tickets_for_period(&state, month, year).await?;
    if tickets.is_empty() {
        return Err(not_found(format!("no data for period {month:02}/{year}")));
    }
    let statistics = compute_statistics(tickets.iter().map(|t| t.stat_input()));
    Ok(Json(StatisticsResp { month, year, statistics }))
}

/// GET /api/v1/tickets/:month/:year
pub async fn get_tickets(
    State(state): State<AppState>,
    Path((month, year)): Path<(i32, i32)>,
) -> Result<Json<Vec<Ticket>>, (StatusCode, String)> {
    check_month(month)?;
    let tickets = tickets_for_period(&state, month, year).await?;
    Ok(Json(tickets))
}

async fn tickets_for_period(
    state: &AppState,
    month: i32,
    year: i32,
) -> Result<Vec<Ticket>, (StatusCode, String)> {
    query_as::<_, Ticket>(
        r#"
        SELECT * FROM ticket_data
        WHERE processing_month = $1 AND processing_year = $2
        ORDER BY id
        "#,
    )
    .bind(month)
    .bind(year)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)
}
