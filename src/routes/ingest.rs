// src/routes/ingest.rs

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;

use crate::ingest::{ingest_bytes, IngestError};
use crate::models::IngestOutcome;
use crate::sheet;
use crate::AppState;
use super::{bad_request, check_month, internal_error};

/// POST /api/v1/ingest — multipart upload: `file` (xlsx/xls/csv) plus
/// optional `month`/`year` fields overriding the inferred period.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestOutcome>, (StatusCode, String)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut month: Option<i32> = None;
    let mut year: Option<i32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("could not read file part: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            "month" => month = Some(numeric_field(field, "month").await?),
            "year" => year = Some(numeric_field(field, "year").await?),
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| bad_request("no file was sent"))?;
    if !sheet::allowed_file(&filename) {
        return Err(bad_request("file type not allowed (use .xlsx, .xls or .csv)"));
    }
    if let Some(m) = month {
        check_month(m)?;
    }

    match ingest_bytes(&state.pool, &filename, &bytes, month, year).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e @ (IngestError::Sheet(_) | IngestError::NoUsableRows)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(IngestError::Db(e)) => Err(internal_error(e)),
    }
}

async fn numeric_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> Result<i32, (StatusCode, String)> {
    let text = field
        .text()
        .await
        .map_err(|e| bad_request(format!("could not read {name} field: {e}")))?;
    text.trim()
        .parse::<i32>()
        .map_err(|_| bad_request(format!("{name} must be numeric, got '{}'", text.trim())))
}
