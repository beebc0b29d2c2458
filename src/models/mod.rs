// src/models/mod.rs

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Default contract terms for auto-created clients and default targets for
// auto-created technicians (the reference deployment's values).
pub const DEFAULT_CONTRACT_HOURS: f64 = 10.0;
pub const DEFAULT_HOURLY_RATE: f64 = 100.0;
pub const DEFAULT_OVERTIME_RATE: f64 = 115.0;
pub const DEFAULT_EXTERNAL_SERVICE_RATE: f64 = 88.0;
pub const DEFAULT_MONTHLY_HOURS_TARGET: f64 = 160.0;
pub const DEFAULT_EFFICIENCY_TARGET: f64 = 85.0;

// ───────────────────────────────────────
// Persisted rows
// ───────────────────────────────────────

/// One spreadsheet line. `client_name`/`technician` keep the literal text
/// from the upload for audit; `client_id` is resolved once at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: i64,
    pub ticket_id: Option<String>,
    pub client_name: Option<String>,
    pub client_id: Option<i64>,
    pub subject: Option<String>,
    pub technician: Option<String>,
    pub primary_category: Option<String>,
    pub secondary_category: Option<String>,
    pub contact: Option<String>,
    pub arrival_date: Option<NaiveDateTime>,
    pub departure_date: Option<NaiveDateTime>,
    pub completion_date: Option<NaiveDateTime>,
    pub workstation: Option<String>,
    pub pause_reason: Option<String>,
    pub sector: Option<String>,
    pub status: Option<String>,
    pub ticket_type: Option<String>,
    pub service: Option<String>,
    pub description: Option<String>,
    pub business_hours: Option<bool>,   // NULL = spreadsheet did not say
    pub external_service: Option<bool>, // NULL = spreadsheet did not say
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub total_service_time: f64, // hours, 0.0 when unparsable
    pub processing_month: Option<i32>,
    pub processing_year: Option<i32>,
    pub upload_batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub contact: Option<String>,
    pub sector: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub contract_hours: f64,
    pub hourly_rate: f64,
    pub overtime_rate: f64,
    pub external_service_rate: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Technician {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub monthly_hours_target: f64,
    pub efficiency_target: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ───────────────────────────────────────
// Ingestion outcome
// ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based data-row index (header excluded), as operators see it.
    pub row: usize,
    pub reason: String,
}

/// Aggregates over one upload, computed from the built ticket set before
/// insertion and returned to the caller alongside the batch id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub total_tickets: usize,
    pub total_hours: f64,
    pub unique_clients: usize,
    pub unique_technicians: usize,
    pub hours_by_client: BTreeMap<String, f64>,
    pub hours_by_technician: BTreeMap<String, f64>,
    pub external_services_by_client: BTreeMap<String, i64>,
    pub external_services_by_technician: BTreeMap<String, i64>,
    pub primary_categories: BTreeMap<String, i64>,
    pub secondary_categories: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub batch_id: String,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub inserted: usize,
    pub skipped: Vec<SkippedRow>,
    pub statistics: IngestStats,
    pub new_clients: Vec<String>,
    pub new_technicians: Vec<String>,
}

// ───────────────────────────────────────
// Billing
// ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingRates {
    pub hourly_rate: f64,
    pub overtime_rate: f64,
    pub external_service_rate: f64,
}

/// Itemized invoice for one client-period. Hour and money fields are
/// rounded to 2 decimals at this boundary only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceBreakdown {
    pub client_name: String,
    pub client_id: i64,
    pub total_hours: f64,
    pub contract_hours: f64,
    pub used_contract_hours: f64,
    pub overtime_hours: f64,
    pub external_services: i64,
    pub contract_value: f64,
    pub overtime_value: f64,
    pub external_services_value: f64,
    pub total_value: f64,
    pub rates: BillingRates,
    pub tickets: Vec<Ticket>,
}

/// Totals across every client with activity in the period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub total_clients: usize,
    pub total_value: f64,
    pub total_hours: f64,
    pub total_overtime_hours: f64,
    pub total_external_services: i64,
}

// ───────────────────────────────────────
// Technician monthly stats
// ───────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicianStats {
    pub total_tickets: usize,
    pub total_hours: f64,
    pub external_services: i64,
    pub clients_served: usize,
    pub efficiency: f64,
    pub target_achievement: f64,
}

// ───────────────────────────────────────
// Admin listings
// ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PeriodInfo {
    pub month: i32,
    pub year: i32,
    pub record_count: i64,
    pub client_count: i64,
    pub first_upload: Option<DateTime<Utc>>,
    pub last_upload: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchInfo {
    pub batch_id: String,
    pub month: Option<i32>,
    pub year: Option<i32>,
    pub record_count: i64,
    pub uploaded_at: Option<DateTime<Utc>>,
}
