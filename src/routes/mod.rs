use axum::http::StatusCode;

pub mod admin;
pub mod billing;
pub mod clients;
pub mod health;
pub mod ingest;
pub mod technicians;

// Common error mappers
pub fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
}

pub fn bad_request(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg.into())
}

pub fn not_found(msg: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, msg.into())
}

/// Months come straight from path segments and form fields.
pub fn check_month(month: i32) -> Result<(), (StatusCode, String)> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(bad_request(format!("invalid month: {month} (expected 1-12)")))
    }
}
