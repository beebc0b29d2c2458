// src/routes/clients.rs

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::{query, query_as};

use crate::models::{
    Client, DEFAULT_CONTRACT_HOURS, DEFAULT_EXTERNAL_SERVICE_RATE, DEFAULT_HOURLY_RATE,
    DEFAULT_OVERTIME_RATE,
};
use crate::normalize::name_key;
use crate::AppState;
use super::{bad_request, internal_error, not_found};

#[derive(Deserialize)]
pub struct ListQ {
    pub include_inactive: Option<bool>,
}

#[derive(Deserialize)]
pub struct CreateClientBody {
    pub name: String,
    pub contact: Option<String>,
    pub sector: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    #[serde(default = "default_contract_hours")] pub contract_hours: f64,
    #[serde(default = "default_hourly_rate")] pub hourly_rate: f64,
    #[serde(default = "default_overtime_rate")] pub overtime_rate: f64,
    #[serde(default = "default_external_rate")] pub external_service_rate: f64,
}
fn default_contract_hours() -> f64 { DEFAULT_CONTRACT_HOURS }
fn default_hourly_rate() -> f64 { DEFAULT_HOURLY_RATE }
fn default_overtime_rate() -> f64 { DEFAULT_OVERTIME_RATE }
fn default_external_rate() -> f64 { DEFAULT_EXTERNAL_SERVICE_RATE }

#[derive(Deserialize)]
pub struct UpdateClientBody {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub sector: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub contract_hours: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub overtime_rate: Option<f64>,
    pub external_service_rate: Option<f64>,
    pub active: Option<bool>,
}

pub async fn list_clients(
    State(state): State<AppState>,
    Query(q): Query<ListQ>,
) -> Result<Json<Vec<Client>>, (StatusCode, String)> {
    let rows = if q.include_inactive.unwrap_or(false) {
        query_as::<_, Client>(r#"SELECT * FROM clients ORDER BY name"#)
            .fetch_all(&state.pool).await.map_err(internal_error)?
    } else {
        query_as::<_, Client>(r#"SELECT * FROM clients WHERE active ORDER BY name"#)
            .fetch_all(&state.pool).await.map_err(internal_error)?
    };
    Ok(Json(rows))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Client>, (StatusCode, String)> {
    let row = query_as::<_, Client>(r#"SELECT * FROM clients WHERE id = $1"#)
        .bind(id)
        .fetch_optional(&state.pool).await.map_err(internal_error)?;
    row.map(Json).ok_or_else(|| not_found(format!("client {id} not found")))
}

pub async fn create_client(
    State(state): State<AppState>,
    Json(body): Json<CreateClientBody>,
) -> Result<Json<Client>, (StatusCode, String)> {
    if body.name.trim().is_empty() {
        return Err(bad_request("client name must not be empty"));
    }
    reject_duplicate_name(&state, &body.name, None).await?;

    let row = query_as::<_, Client>(
        r#"
        INSERT INTO clients (name, contact, sector, email, phone, notes,
                             contract_hours, hourly_rate, overtime_rate, external_service_rate)
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        RETURNING *
        "#,
    )
    .bind(body.name.trim())
    .bind(&body.contact)
    .bind(&body.sector)
    .bind(&body.email)
    .bind(&body.phone)
    .bind(&body.notes)
    .bind(body.contract_hours)
    .bind(body.hourly_rate)
    .bind(body.overtime_rate)
    .bind(body.external_service_rate)
    .fetch_one(&state.pool).await.map_err(internal_error)?;
    Ok(Json(row))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateClientBody>,
) -> Result<Json<Client>, (StatusCode, String)> {
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(bad_request("client name must not be empty"));
        }
        reject_duplicate_name(&state, name, Some(id)).await?;
    }

    let row = query_as::<_, Client>(
        r#"
        UPDATE clients SET
            name                  = COALESCE($2, name),
            contact               = COALESCE($3, contact),
            sector                = COALESCE($4, sector),
            email                 = COALESCE($5, email),
            phone                 = COALESCE($6, phone),
            notes                 = COALESCE($7, notes),
            contract_hours        = COALESCE($8, contract_hours),
            hourly_rate           = COALESCE($9, hourly_rate),
            overtime_rate         = COALESCE($10, overtime_rate),
            external_service_rate = COALESCE($11, external_service_rate),
            active                = COALESCE($12, active),
            updated_at            = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(body.name.as_deref().map(str::trim))
    .bind(body.contact)
    .bind(body.sector)
    .bind(body.email)
    .bind(body.phone)
    .bind(body.notes)
    .bind(body.contract_hours)
    .bind(body.hourly_rate)
    .bind(body.overtime_rate)
    .bind(body.external_service_rate)
    .bind(body.active)
    .fetch_optional(&state.pool).await.map_err(internal_error)?;
    row.map(Json).ok_or_else(|| not_found(format!("client {id} not found")))
}

/// Clients are never hard-deleted; DELETE deactivates.
pub async fn deactivate_client(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let res = query(r#"UPDATE clients SET active = FALSE, updated_at = now() WHERE id = $1"#)
        .bind(id)
        .execute(&state.pool).await.map_err(internal_error)?;
    if res.rows_affected() == 0 {
        return Err(not_found(format!("client {id} not found")));
    }
    Ok(Json(serde_json::json!({ "deactivated": true })))
}

#[derive(Deserialize)]
pub struct SearchQ {
    pub q: Option<String>,
}

/// GET /api/v1/clients/search?q= — case-insensitive substring match on the
/// name, active clients only.
pub async fn search_clients(
    State(state): State<AppState>,
    Query(q): Query<SearchQ>,
) -> Result<Json<Vec<Client>>, (StatusCode, String)> {
    let term = q.q.as_deref().map(str::trim).unwrap_or("");
    if term.is_empty() {
        return Err(bad_request("query parameter 'q' must not be empty"));
    }
    let rows = query_as::<_, Client>(
        r#"SELECT * FROM clients WHERE active AND name ILIKE $1 ORDER BY name"#,
    )
    .bind(format!("%{term}%"))
    .fetch_all(&state.pool).await.map_err(internal_error)?;
    Ok(Json(rows))
}

/// Two clients may not share a normalized name — it is the identity the
/// whole pipeline matches on.
async fn reject_duplicate_name(
    state: &AppState,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<(), (StatusCode, String)> {
    let existing: Option<(i64,)> = query_as(
        r#"SELECT id FROM clients WHERE LOWER(TRIM(name)) = $1"#,
    )
    .bind(name_key(name))
    .fetch_optional(&state.pool).await.map_err(internal_error)?;

    match existing {
        Some((id,)) if Some(id) != exclude_id => Err((
            StatusCode::CONFLICT,
            format!("a client with the name '{}' already exists", name.trim()),
        )),
        _ => Ok(()),
    }
}
