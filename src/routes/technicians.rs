// src/routes/technicians.rs

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::query_as;

use crate::billing::round2;
use crate::models::{
    Technician, TechnicianStats, Ticket, DEFAULT_EFFICIENCY_TARGET, DEFAULT_MONTHLY_HOURS_TARGET,
};
use crate::normalize::name_key;
use crate::AppState;
use super::{bad_request, check_month, internal_error, not_found};

#[derive(Deserialize)]
pub struct CreateTechnicianBody {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    #[serde(default = "default_hours_target")] pub monthly_hours_target: f64,
    #[serde(default = "default_efficiency_target")] pub efficiency_target: f64,
}
fn default_hours_target() -> f64 { DEFAULT_MONTHLY_HOURS_TARGET }
fn default_efficiency_target() -> f64 { DEFAULT_EFFICIENCY_TARGET }

#[derive(Deserialize)]
pub struct UpdateTechnicianBody {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub monthly_hours_target: Option<f64>,
    pub efficiency_target: Option<f64>,
    pub active: Option<bool>,
}

pub async fn list_technicians(
    State(state): State<AppState>,
) -> Result<Json<Vec<Technician>>, (StatusCode, String)> {
    let rows = query_as::<_, Technician>(r#"SELECT * FROM technicians WHERE active ORDER BY name"#)
        .fetch_all(&state.pool).await.map_err(internal_error)?;
    Ok(Json(rows))
}

pub async fn get_technician(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Technician>, (StatusCode, String)> {
    let row = query_as::<_, Technician>(r#"SELECT * FROM technicians WHERE id = $1"#)
        .bind(id)
        .fetch_optional(&state.pool).await.map_err(internal_error)?;
    row.map(Json).ok_or_else(|| not_found(format!("technician {id} not found")))
}

pub async fn create_technician(
    State(state): State<AppState>,
    Json(body): Json<CreateTechnicianBody>,
) -> Result<Json<Technician>, (StatusCode, String)> {
    if body.name.trim().is_empty() {
        return Err(bad_request("technician name must not be empty"));
    }
    let existing: Option<(i64,)> =
        query_as(r#"SELECT id FROM technicians WHERE LOWER(TRIM(name)) = $1"#)
            .bind(name_key(&body.name))
            .fetch_optional(&state.pool).await.map_err(internal_error)?;
    if existing.is_some() {
        return Err((
            StatusCode::CONFLICT,
            format!("a technician with the name '{}' already exists", body.name.trim()),
        ));
    }

    let row = query_as::<_, Technician>(
        r#"
        INSERT INTO technicians (name, email, phone, department,
                                 monthly_hours_target, efficiency_target)
        VALUES ($1,$2,$3,$4,$5,$6)
        RETURNING *
        "#,
    )
    .bind(body.name.trim())
    .bind(&body.email)
    .bind(&body.phone)
    .bind(&body.department)
    .bind(body.monthly_hours_target)
    .bind(body.efficiency_target)
    .fetch_one(&state.pool).await.map_err(internal_error)?;
    Ok(Json(row))
}

pub async fn update_technician(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTechnicianBody>,
) -> Result<Json<Technician>, (StatusCode, String)> {
    let row = query_as::<_, Technician>(
        r#"
        UPDATE technicians SET
            name                 = COALESCE($2, name),
            email                = COALESCE($3, email),
            phone                = COALESCE($4, phone),
            department           = COALESCE($5, department),
            monthly_hours_target = COALESCE($6, monthly_hours_target),
            efficiency_target    = COALESCE($7, efficiency_target),
            active               = COALESCE($8, active),
            updated_at           = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(body.name.as_deref().map(str::trim))
    .bind(body.email)
    .bind(body.phone)
    .bind(body.department)
    .bind(body.monthly_hours_target)
    .bind(body.efficiency_target)
    .bind(body.active)
    .fetch_optional(&state.pool).await.map_err(internal_error)?;
    row.map(Json).ok_or_else(|| not_found(format!("technician {id} not found")))
}

/// GET /api/v1/technicians/:id/stats/:month/:year — monthly workload
/// against the technician's hours target.
pub async fn monthly_stats(
    State(state): State<AppState>,
    Path((id, month, year)): Path<(i64, i32, i32)>,
) -> Result<Json<TechnicianStats>, (StatusCode, String)> {
    check_month(month)?;
    let tech = query_as::<_, Technician>(r#"SELECT * FROM technicians WHERE id = $1"#)
        .bind(id)
        .fetch_optional(&state.pool).await.map_err(internal_error)?
        .ok_or_else(|| not_found(format!("technician {id} not found")))?;

    let tickets = query_as::<_, Ticket>(
        r#"
        SELECT * FROM ticket_data
        WHERE LOWER(TRIM(technician)) = $1
          AND processing_month = $2 AND processing_year = $3
        "#,
    )
    .bind(name_key(&tech.name))
    .bind(month)
    .bind(year)
    .fetch_all(&state.pool).await.map_err(internal_error)?;

    Ok(Json(stats_for(tech.monthly_hours_target, &tickets)))
}

#[derive(Serialize)]
pub struct TechnicianPeriodStats {
    pub technician: Technician,
    pub stats: TechnicianStats,
}

/// GET /api/v1/technicians/stats/:month/:year — workload of every active
/// technician for the period, one entry each.
pub async fn all_monthly_stats(
    State(state): State<AppState>,
    Path((month, year)): Path<(i32, i32)>,
) -> Result<Json<Vec<TechnicianPeriodStats>>, (StatusCode, String)> {
    check_month(month)?;
    let techs = query_as::<_, Technician>(r#"SELECT * FROM technicians WHERE active ORDER BY name"#)
        .fetch_all(&state.pool).await.map_err(internal_error)?;
    let tickets = query_as::<_, Ticket>(
        r#"SELECT * FROM ticket_data WHERE processing_month = $1 AND processing_year = $2"#,
    )
    .bind(month)
    .bind(year)
    .fetch_all(&state.pool).await.map_err(internal_error)?;

    let entries = techs
        .into_iter()
        .map(|tech| {
            let key = name_key(&tech.name);
            let own: Vec<Ticket> = tickets
                .iter()
                .filter(|t| t.technician.as_deref().is_some_and(|n| name_key(n) == key))
                .cloned()
                .collect();
            let stats = stats_for(tech.monthly_hours_target, &own);
            TechnicianPeriodStats { technician: tech, stats }
        })
        .collect();
    Ok(Json(entries))
}

#[derive(Deserialize)]
pub struct SearchQ {
    pub q: Option<String>,
}

/// GET /api/v1/technicians/search?q= — case-insensitive substring match on
/// the name, active technicians only.
pub async fn search_technicians(
    State(state): State<AppState>,
    Query(q): Query<SearchQ>,
) -> Result<Json<Vec<Technician>>, (StatusCode, String)> {
    let term = q.q.as_deref().map(str::trim).unwrap_or("");
    if term.is_empty() {
        return Err(bad_request("query parameter 'q' must not be empty"));
    }
    let rows = query_as::<_, Technician>(
        r#"SELECT * FROM technicians WHERE active AND name ILIKE $1 ORDER BY name"#,
    )
    .bind(format!("%{term}%"))
    .fetch_all(&state.pool).await.map_err(internal_error)?;
    Ok(Json(rows))
}

fn stats_for(hours_target: f64, tickets: &[Ticket]) -> TechnicianStats {
    let total_hours: f64 = tickets.iter().map(|t| t.total_service_time).sum();
    let external_services = tickets
        .iter()
        .filter(|t| t.external_service == Some(true))
        .count() as i64;
    let mut client_keys: Vec<String> = tickets
        .iter()
        .filter_map(|t| t.client_name.as_deref().map(name_key))
        .collect();
    client_keys.sort();
    client_keys.dedup();

    let efficiency = if hours_target > 0.0 {
        total_hours / hours_target * 100.0
    } else {
        0.0
    };

    TechnicianStats {
        total_tickets: tickets.len(),
        total_hours: round2(total_hours),
        external_services,
        clients_served: client_keys.len(),
        efficiency: round2(efficiency),
        target_achievement: round2(efficiency.min(100.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ticket(client: &str, hours: f64, external: Option<bool>) -> Ticket {
        Ticket {
            id: 0,
            ticket_id: Some("t".into()),
            client_name: Some(client.into()),
            client_id: None,
            subject: None,
            technician: Some("Joana".into()),
            primary_category: None,
            secondary_category: None,
            contact: None,
            arrival_date: None,
            departure_date: None,
            completion_date: None,
            workstation: None,
            pause_reason: None,
            sector: None,
            status: None,
            ticket_type: None,
            service: None,
            description: None,
            business_hours: None,
            external_service: external,
            start_date: None,
            end_date: None,
            total_service_time: hours,
            processing_month: Some(3),
            processing_year: Some(2025),
            upload_batch_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stats_count_hours_externals_and_distinct_clients() {
        let tickets = vec![
            ticket("Acme", 80.0, Some(true)),
            ticket(" acme ", 40.0, None),
            ticket("Globex", 20.0, Some(false)),
        ];
        let s = stats_for(160.0, &tickets);
        assert_eq!(s.total_tickets, 3);
        assert_eq!(s.total_hours, 140.0);
        assert_eq!(s.external_services, 1);
        assert_eq!(s.clients_served, 2); // Acme variants collapse
        assert_eq!(s.efficiency, 87.5);
        assert_eq!(s.target_achievement, 87.5);
    }

    #[test]
    fn achievement_caps_at_100() {
        let s = stats_for(100.0, &[ticket("Acme", 130.0, None)]);
        assert_eq!(s.efficiency, 130.0);
        assert_eq!(s.target_achievement, 100.0);
    }

    #[test]
    fn zero_target_does_not_divide() {
        let s = stats_for(0.0, &[ticket("Acme", 10.0, None)]);
        assert_eq!(s.efficiency, 0.0);
        assert_eq!(s.target_achievement, 0.0);
    }

    #[test]
    fn no_tickets_is_all_zero() {
        let s = stats_for(160.0, &[]);
        assert_eq!(s.total_tickets, 0);
        assert_eq!(s.total_hours, 0.0);
        assert_eq!(s.clients_served, 0);
    }
}
