// src/routes/admin.rs
//
// Bulk administration of persisted tickets: list/delete by processing
// period, list/delete by upload batch. No pipeline logic beyond the
// stated replace/delete contract.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::{query, query_as};

use crate::models::{BatchInfo, PeriodInfo};
use crate::AppState;
use super::{check_month, internal_error, not_found};

/// GET /api/v1/admin/periods
pub async fn list_periods(
    State(state): State<AppState>,
) -> Result<Json<Vec<PeriodInfo>>, (StatusCode, String)> {
    let rows = query_as::<_, PeriodInfo>(
        r#"
        SELECT processing_month AS month,
               processing_year  AS year,
               COUNT(*)         AS record_count,
               COUNT(DISTINCT LOWER(TRIM(client_name))) AS client_count,
               MIN(created_at)  AS first_upload,
               MAX(created_at)  AS last_upload
        FROM ticket_data
        WHERE processing_month IS NOT NULL AND processing_year IS NOT NULL
        GROUP BY processing_month, processing_year
        ORDER BY processing_year DESC, processing_month DESC
        "#,
    )
    .fetch_all(&state.pool).await.map_err(internal_error)?;
    Ok(Json(rows))
}

/// DELETE /api/v1/admin/periods/:month/:year
pub async fn delete_period(
    State(state): State<AppState>,
    Path((month, year)): Path<(i32, i32)>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    check_month(month)?;
    let res = query(
        r#"DELETE FROM ticket_data WHERE processing_month = $1 AND processing_year = $2"#,
    )
    .bind(month)
    .bind(year)
    .execute(&state.pool).await.map_err(internal_error)?;

    if res.rows_affected() == 0 {
        return Err(not_found(format!("no data for period {month:02}/{year}")));
    }
    tracing::info!(month, year, deleted = res.rows_affected(), "period deleted");
    Ok(Json(serde_json::json!({
        "success": true,
        "deleted_records": res.rows_affected(),
    })))
}

/// GET /api/v1/admin/batches
pub async fn list_batches(
    State(state): State<AppState>,
) -> Result<Json<Vec<BatchInfo>>, (StatusCode, String)> {
    let rows = query_as::<_, BatchInfo>(
        r#"
        SELECT upload_batch_id  AS batch_id,
               processing_month AS month,
               processing_year  AS year,
               COUNT(*)         AS record_count,
               MAX(created_at)  AS uploaded_at
        FROM ticket_data
        WHERE upload_batch_id IS NOT NULL
        GROUP BY upload_batch_id, processing_month, processing_year
        ORDER BY MAX(created_at) DESC
        "#,
    )
    .fetch_all(&state.pool).await.map_err(internal_error)?;
    Ok(Json(rows))
}

/// DELETE /api/v1/admin/batches/:batch_id
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let res = query(r#"DELETE FROM ticket_data WHERE upload_batch_id = $1"#)
        .bind(&batch_id)
        .execute(&state.pool).await.map_err(internal_error)?;

    if res.rows_affected() == 0 {
        return Err(not_found(format!("upload batch '{batch_id}' not found")));
    }
    tracing::info!(batch_id = %batch_id, deleted = res.rows_affected(), "batch deleted");
    Ok(Json(serde_json::json!({
        "success": true,
        "deleted_records": res.rows_affected(),
    })))
}
