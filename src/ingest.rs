// src/ingest.rs
//
// Ingestion pipeline: spreadsheet rows → ticket drafts → persisted batch.
// Re-uploading a period is a full replace of that period's tickets, never
// a merge. Rows are inserted in chunks; a failing chunk degrades to
// per-row inserts so one malformed row cannot discard its neighbours.

use chrono::NaiveDateTime;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{
    Client, IngestOutcome, IngestStats, SkippedRow, Technician, DEFAULT_CONTRACT_HOURS,
    DEFAULT_EFFICIENCY_TARGET, DEFAULT_EXTERNAL_SERVICE_RATE, DEFAULT_HOURLY_RATE,
    DEFAULT_MONTHLY_HOURS_TARGET, DEFAULT_OVERTIME_RATE,
};
use crate::normalize::{self, name_key};
use crate::sheet::{Field, Row, SheetError};

const INSERT_CHUNK: usize = 100;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Sheet(#[from] SheetError),
    #[error("no usable rows in spreadsheet")]
    NoUsableRows,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Record builder
// ─────────────────────────────────────────────────────────────────────────────

/// A ticket as built from one spreadsheet row, before it has a database
/// id, period tag or batch id.
#[derive(Debug, Clone)]
pub struct TicketDraft {
    /// 1-based data-row index in the source file.
    pub row: usize,
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
    pub business_hours: Option<bool>,
    pub external_service: Option<bool>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub total_service_time: f64,
}

/// Maps one normalized row to a draft. A row carrying neither a ticket id
/// nor a client name cannot be attributed to anything and is skipped;
/// every field-level defect degrades to its safe default instead.
pub fn build_ticket(row: &Row, index: usize) -> Result<TicketDraft, SkippedRow> {
    let ticket_id = normalize::text(row.get(Field::TicketId));
    let client_name = normalize::text(row.get(Field::ClientName));
    if ticket_id.is_none() && client_name.is_none() {
        return Err(SkippedRow {
            row: index,
            reason: "row has neither ticket id nor client name".into(),
        });
    }

    Ok(TicketDraft {
        row: index,
        ticket_id,
        client_name,
        client_id: None,
        subject: normalize::text(row.get(Field::Subject)),
        technician: normalize::text(row.get(Field::Technician)),
        primary_category: normalize::text(row.get(Field::PrimaryCategory)),
        secondary_category: normalize::text(row.get(Field::SecondaryCategory)),
        contact: normalize::text(row.get(Field::Contact)),
        arrival_date: normalize::timestamp(row.get(Field::ArrivalDate)),
        departure_date: normalize::timestamp(row.get(Field::DepartureDate)),
        completion_date: normalize::timestamp(row.get(Field::CompletionDate)),
        workstation: normalize::text(row.get(Field::Workstation)),
        pause_reason: normalize::text(row.get(Field::PauseReason)),
        sector: normalize::text(row.get(Field::Sector)),
        status: normalize::text(row.get(Field::Status)),
        ticket_type: normalize::text(row.get(Field::TicketType)),
        service: normalize::text(row.get(Field::Service)),
        description: normalize::text(row.get(Field::Description)),
        business_hours: normalize::tri_state(row.get(Field::BusinessHours)),
        external_service: normalize::tri_state(row.get(Field::ExternalService)),
        start_date: normalize::timestamp(row.get(Field::StartDate)),
        end_date: normalize::timestamp(row.get(Field::EndDate)),
        total_service_time: normalize::duration_hours(row.get(Field::TotalServiceTime)),
    })
}

/// Period heuristic when the caller supplies none: the month/year of the
/// most recent completion date in the file. No completion dates → None,
/// and the batch stays outside all billing queries.
pub fn infer_period(drafts: &[TicketDraft]) -> Option<(i32, i32)> {
    use chrono::Datelike;
    drafts
        .iter()
        .filter_map(|d| d.completion_date)
        .max()
        .map(|dt| (dt.month() as i32, dt.year()))
}

/// Short opaque token shared by every ticket of one upload.
pub fn new_batch_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────────────────

/// The slice of a ticket the aggregate statistics care about; implemented
/// by both drafts (ingest response) and persisted rows (/statistics).
pub struct StatInput<'a> {
    pub client: Option<&'a str>,
    pub technician: Option<&'a str>,
    pub hours: f64,
    pub external: bool,
    pub primary_category: Option<&'a str>,
    pub secondary_category: Option<&'a str>,
}

impl TicketDraft {
    pub fn stat_input(&self) -> StatInput<'_> {
        StatInput {
            client: self.client_name.as_deref(),
            technician: self.technician.as_deref(),
            hours: self.total_service_time,
            external: self.external_service == Some(true),
            primary_category: self.primary_category.as_deref(),
            secondary_category: self.secondary_category.as_deref(),
        }
    }
}

impl crate::models::Ticket {
    pub fn stat_input(&self) -> StatInput<'_> {
        StatInput {
            client: self.client_name.as_deref(),
            technician: self.technician.as_deref(),
            hours: self.total_service_time,
            external: self.external_service == Some(true),
            primary_category: self.primary_category.as_deref(),
            secondary_category: self.secondary_category.as_deref(),
        }
    }
}

pub fn compute_statistics<'a>(rows: impl Iterator<Item = StatInput<'a>>) -> IngestStats {
    let mut stats = IngestStats::default();
    for r in rows {
        stats.total_tickets += 1;
        stats.total_hours += r.hours;
        if let Some(client) = r.client {
            *stats.hours_by_client.entry(client.to_string()).or_default() += r.hours;
            if r.external {
                *stats
                    .external_services_by_client
                    .entry(client.to_string())
                    .or_default() += 1;
            }
        }
        if let Some(tech) = r.technician {
            *stats.hours_by_technician.entry(tech.to_string()).or_default() += r.hours;
            if r.external {
                *stats
                    .external_services_by_technician
                    .entry(tech.to_string())
                    .or_default() += 1;
            }
        }
        if let Some(cat) = r.primary_category {
            *stats.primary_categories.entry(cat.to_string()).or_default() += 1;
        }
        if let Some(cat) = r.secondary_category {
            *stats.secondary_categories.entry(cat.to_string()).or_default() += 1;
        }
    }
    stats.unique_clients = stats.hours_by_client.len();
    stats.unique_technicians = stats.hours_by_technician.len();
    stats
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived entities (get-or-create by normalized name)
// ─────────────────────────────────────────────────────────────────────────────

/// Idempotent lookup-or-create. The normalized name is the identity;
/// contact/sector backfill only fills columns that are still NULL.
/// Returns the client plus whether it was created by this call.
pub async fn get_or_create_client(
    pool: &PgPool,
    name: &str,
    contact: Option<&str>,
    sector: Option<&str>,
) -> sqlx::Result<(Client, bool)> {
    let key = name_key(name);
    let existing = sqlx::query_as::<_, Client>(
        r#"SELECT * FROM clients WHERE LOWER(TRIM(name)) = $1"#,
    )
    .bind(&key)
    .fetch_optional(pool)
    .await?;

    if let Some(client) = existing {
        let wants_backfill = (client.contact.is_none() && contact.is_some())
            || (client.sector.is_none() && sector.is_some());
        if !wants_backfill {
            return Ok((client, false));
        }
        let updated = sqlx::query_as::<_, Client>(
            r#"
            UPDATE clients SET
                contact    = COALESCE(contact, $2),
                sector     = COALESCE(sector, $3),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(client.id)
        .bind(contact)
        .bind(sector)
        .fetch_one(pool)
        .await?;
        return Ok((updated, false));
    }

    let created = sqlx::query_as::<_, Client>(
        r#"
        INSERT INTO clients (name, contact, sector, contract_hours, hourly_rate,
                             overtime_rate, external_service_rate)
        VALUES ($1,$2,$3,$4,$5,$6,$7)
        RETURNING *
        "#,
    )
    .bind(name.trim())
    .bind(contact)
    .bind(sector)
    .bind(DEFAULT_CONTRACT_HOURS)
    .bind(DEFAULT_HOURLY_RATE)
    .bind(DEFAULT_OVERTIME_RATE)
    .bind(DEFAULT_EXTERNAL_SERVICE_RATE)
    .fetch_one(pool)
    .await?;
    Ok((created, true))
}

pub async fn get_or_create_technician(
    pool: &PgPool,
    name: &str,
) -> sqlx::Result<(Technician, bool)> {
    let key = name_key(name);
    let existing = sqlx::query_as::<_, Technician>(
        r#"SELECT * FROM technicians WHERE LOWER(TRIM(name)) = $1"#,
    )
    .bind(&key)
    .fetch_optional(pool)
    .await?;
    if let Some(tech) = existing {
        return Ok((tech, false));
    }

    let created = sqlx::query_as::<_, Technician>(
        r#"
        INSERT INTO technicians (name, monthly_hours_target, efficiency_target)
        VALUES ($1,$2,$3)
        RETURNING *
        "#,
    )
    .bind(name.trim())
    .bind(DEFAULT_MONTHLY_HOURS_TARGET)
    .bind(DEFAULT_EFFICIENCY_TARGET)
    .fetch_one(pool)
    .await?;
    Ok((created, true))
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Full ingestion of an uploaded file: decode, build, persist. File-level
/// failures (undecodable, unknown header, nothing usable) surface before
/// any database mutation.
pub async fn ingest_bytes(
    pool: &PgPool,
    filename: &str,
    bytes: &[u8],
    month: Option<i32>,
    year: Option<i32>,
) -> Result<IngestOutcome, IngestError> {
    let rows = crate::sheet::parse(filename, bytes)?;
    ingest(pool, rows, month, year).await
}

/// Ingests one spreadsheet's rows. Explicit month/year win over the
/// inferred period; inference fills whichever half is missing. Assumes
/// single-writer discipline per period — the delete-then-insert sequence
/// is not atomic across chunks.
pub async fn ingest(
    pool: &PgPool,
    rows: Vec<Row>,
    month: Option<i32>,
    year: Option<i32>,
) -> Result<IngestOutcome, IngestError> {
    let batch_id = new_batch_id();

    let mut drafts: Vec<TicketDraft> = Vec::with_capacity(rows.len());
    let mut skipped: Vec<SkippedRow> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match build_ticket(row, i + 1) {
            Ok(draft) => drafts.push(draft),
            Err(skip) => {
                warn!(row = skip.row, reason = %skip.reason, "skipping row");
                skipped.push(skip);
            }
        }
    }
    if drafts.is_empty() {
        return Err(IngestError::NoUsableRows);
    }

    let inferred = infer_period(&drafts);
    let month = month.or(inferred.map(|(m, _)| m));
    let year = year.or(inferred.map(|(_, y)| y));

    let statistics = compute_statistics(drafts.iter().map(|d| d.stat_input()));

    // Derived entities first, so client ids can be stamped on the drafts.
    let (new_clients, client_ids) = upsert_clients(pool, &drafts).await?;
    let new_technicians = upsert_technicians(pool, &drafts).await?;
    for draft in &mut drafts {
        if let Some(name) = &draft.client_name {
            draft.client_id = client_ids
                .iter()
                .find(|(key, _)| *key == name_key(name))
                .map(|(_, id)| *id);
        }
    }

    let mut sink = PgSink { pool, batch_id: &batch_id, month, year };
    let (inserted, insert_failures) = persist_drafts(&mut sink, &drafts, month, year).await?;
    skipped.extend(insert_failures);

    info!(
        batch_id = %batch_id,
        inserted,
        skipped = skipped.len(),
        "ingest complete"
    );

    Ok(IngestOutcome {
        batch_id,
        month,
        year,
        inserted,
        skipped,
        statistics,
        new_clients,
        new_technicians,
    })
}

/// Where drafts land. The Postgres sink is the real one; tests substitute
/// an in-memory sink to exercise the replace and fallback logic without a
/// database.
trait DraftSink {
    async fn delete_period(&mut self, month: i32, year: i32) -> sqlx::Result<u64>;
    async fn insert_chunk(&mut self, chunk: &[TicketDraft]) -> sqlx::Result<()>;
    async fn insert_row(&mut self, draft: &TicketDraft) -> sqlx::Result<()>;
}

/// Replace-then-insert. A known period is wiped first, so re-uploading a
/// file replaces it instead of doubling it; an unknown period appends.
/// Each chunk lands whole or not at all, and a failing chunk degrades to
/// per-row inserts so one malformed row cannot discard its neighbours.
async fn persist_drafts<S: DraftSink>(
    sink: &mut S,
    drafts: &[TicketDraft],
    month: Option<i32>,
    year: Option<i32>,
) -> sqlx::Result<(usize, Vec<SkippedRow>)> {
    if let (Some(m), Some(y)) = (month, year) {
        let deleted = sink.delete_period(m, y).await?;
        if deleted > 0 {
            info!(month = m, year = y, deleted, "replaced existing period data");
        }
    }

    let mut inserted = 0usize;
    let mut skipped = Vec::new();
    for chunk in drafts.chunks(INSERT_CHUNK) {
        match sink.insert_chunk(chunk).await {
            Ok(()) => inserted += chunk.len(),
            Err(e) => {
                warn!(error = %e, rows = chunk.len(), "chunk insert failed, retrying row by row");
                for draft in chunk {
                    match sink.insert_row(draft).await {
                        Ok(()) => inserted += 1,
                        Err(e) => {
                            warn!(row = draft.row, error = %e, "skipping row");
                            skipped.push(SkippedRow {
                                row: draft.row,
                                reason: format!("insert failed: {e}"),
                            });
                        }
                    }
                }
            }
        }
    }
    Ok((inserted, skipped))
}

struct PgSink<'a> {
    pool: &'a PgPool,
    batch_id: &'a str,
    month: Option<i32>,
    year: Option<i32>,
}

impl DraftSink for PgSink<'_> {
    async fn delete_period(&mut self, month: i32, year: i32) -> sqlx::Result<u64> {
        Ok(sqlx::query(
            r#"DELETE FROM ticket_data WHERE processing_month = $1 AND processing_year = $2"#,
        )
        .bind(month)
        .bind(year)
        .execute(self.pool)
        .await?
        .rows_affected())
    }

    // One transaction per chunk: either the whole chunk lands or none of it
    // does.
    async fn insert_chunk(&mut self, chunk: &[TicketDraft]) -> sqlx::Result<()> {
        let mut tx = self.pool.begin().await?;
        for draft in chunk {
            insert_query(draft, self.batch_id, self.month, self.year)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    async fn insert_row(&mut self, draft: &TicketDraft) -> sqlx::Result<()> {
        insert_query(draft, self.batch_id, self.month, self.year)
            .execute(self.pool)
            .await
            .map(|_| ())
    }
}

const INSERT_SQL: &str = r#"
INSERT INTO ticket_data
    (ticket_id, client_name, client_id, subject, technician,
     primary_category, secondary_category, contact,
     arrival_date, departure_date, completion_date,
     workstation, pause_reason, sector, status, ticket_type,
     service, description, business_hours, external_service,
     start_date, end_date, total_service_time,
     processing_month, processing_year, upload_batch_id)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,
        $17,$18,$19,$20,$21,$22,$23,$24,$25,$26)
"#;

fn insert_query<'a>(
    d: &'a TicketDraft,
    batch_id: &'a str,
    month: Option<i32>,
    year: Option<i32>,
) -> Query<'a, Postgres, PgArguments> {
    sqlx::query(INSERT_SQL)
        .bind(&d.ticket_id)
        .bind(&d.client_name)
        .bind(d.client_id)
        .bind(&d.subject)
        .bind(&d.technician)
        .bind(&d.primary_category)
        .bind(&d.secondary_category)
        .bind(&d.contact)
        .bind(d.arrival_date)
        .bind(d.departure_date)
        .bind(d.completion_date)
        .bind(&d.workstation)
        .bind(&d.pause_reason)
        .bind(&d.sector)
        .bind(&d.status)
        .bind(&d.ticket_type)
        .bind(&d.service)
        .bind(&d.description)
        .bind(d.business_hours)
        .bind(d.external_service)
        .bind(d.start_date)
        .bind(d.end_date)
        .bind(d.total_service_time)
        .bind(month)
        .bind(year)
        .bind(batch_id)
}

/// One upsert input per distinct client in the file. The display name is
/// the first spelling seen; contact and sector each come from the first
/// row that supplies them, which may be different rows.
#[derive(Debug, PartialEq)]
struct ClientProfile {
    key: String,
    name: String,
    contact: Option<String>,
    sector: Option<String>,
}

fn client_profiles(drafts: &[TicketDraft]) -> Vec<ClientProfile> {
    let mut profiles: Vec<ClientProfile> = Vec::new();
    for draft in drafts {
        let Some(name) = &draft.client_name else { continue };
        let key = name_key(name);
        let idx = match profiles.iter().position(|p| p.key == key) {
            Some(i) => i,
            None => {
                profiles.push(ClientProfile {
                    key,
                    name: name.clone(),
                    contact: None,
                    sector: None,
                });
                profiles.len() - 1
            }
        };
        let profile = &mut profiles[idx];
        if profile.contact.is_none() {
            profile.contact = draft.contact.clone();
        }
        if profile.sector.is_none() {
            profile.sector = draft.sector.clone();
        }
    }
    profiles
}

/// Creates every unseen client (default contract terms) and backfills
/// contact/sector on existing ones, each field from the first row that
/// supplies it. Returns the names created plus the normalized-name → id
/// map.
async fn upsert_clients(
    pool: &PgPool,
    drafts: &[TicketDraft],
) -> sqlx::Result<(Vec<String>, Vec<(String, i64)>)> {
    let profiles = client_profiles(drafts);
    let mut created = Vec::new();
    let mut ids = Vec::with_capacity(profiles.len());
    for profile in profiles {
        let (client, was_created) = get_or_create_client(
            pool,
            &profile.name,
            profile.contact.as_deref(),
            profile.sector.as_deref(),
        )
        .await?;
        if was_created {
            created.push(client.name.clone());
        }
        ids.push((profile.key, client.id));
    }
    Ok((created, ids))
}

async fn upsert_technicians(pool: &PgPool, drafts: &[TicketDraft]) -> sqlx::Result<Vec<String>> {
    let mut keys: Vec<String> = Vec::new();
    let mut created = Vec::new();
    for draft in drafts {
        if let Some(name) = &draft.technician {
            let key = name_key(name);
            if keys.contains(&key) {
                continue;
            }
            keys.push(key);
            let (tech, was_created) = get_or_create_technician(pool, name).await?;
            if was_created {
                created.push(tech.name);
            }
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Cell;
    use chrono::NaiveDate;

    fn row(cells: &[(Field, Cell)]) -> Row {
        let mut r = Row::default();
        for (f, c) in cells {
            r.set(*f, c.clone());
        }
        r
    }

    fn txt(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn dt(y: i32, m: u32, d: u32) -> Cell {
        Cell::DateTime(
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn builds_a_full_ticket() {
        let r = row(&[
            (Field::TicketId, txt("1001")),
            (Field::ClientName, txt("  Acme  ")),
            (Field::Technician, txt("Joana")),
            (Field::TotalServiceTime, txt("1:30:00")),
            (Field::ExternalService, txt("Sim")),
            (Field::BusinessHours, txt("talvez")),
            (Field::CompletionDate, dt(2025, 3, 10)),
        ]);
        let draft = build_ticket(&r, 1).unwrap();
        assert_eq!(draft.ticket_id.as_deref(), Some("1001"));
        assert_eq!(draft.client_name.as_deref(), Some("Acme"));
        assert_eq!(draft.total_service_time, 1.5);
        assert_eq!(draft.external_service, Some(true));
        assert_eq!(draft.business_hours, None);
        assert!(draft.completion_date.is_some());
    }

    #[test]
    fn void_row_is_skipped_with_index() {
        let r = row(&[(Field::Subject, txt("orphaned note"))]);
        let skip = build_ticket(&r, 7).unwrap_err();
        assert_eq!(skip.row, 7);
    }

    #[test]
    fn unparsable_duration_defaults_to_zero_without_skipping() {
        let r = row(&[
            (Field::TicketId, txt("1")),
            (Field::TotalServiceTime, txt("N/A")),
        ]);
        let draft = build_ticket(&r, 1).unwrap();
        assert_eq!(draft.total_service_time, 0.0);
    }

    #[test]
    fn period_inferred_from_latest_completion_date() {
        let drafts: Vec<TicketDraft> = [
            row(&[(Field::TicketId, txt("1")), (Field::CompletionDate, dt(2025, 2, 28))]),
            row(&[(Field::TicketId, txt("2")), (Field::CompletionDate, dt(2025, 3, 5))]),
            row(&[(Field::TicketId, txt("3"))]),
        ]
        .iter()
        .enumerate()
        .map(|(i, r)| build_ticket(r, i + 1).unwrap())
        .collect();

        assert_eq!(infer_period(&drafts), Some((3, 2025)));
    }

    #[test]
    fn period_unset_without_completion_dates() {
        let drafts = vec![build_ticket(&row(&[(Field::TicketId, txt("1"))]), 1).unwrap()];
        assert_eq!(infer_period(&drafts), None);
    }

    #[test]
    fn statistics_aggregate_by_client_and_technician() {
        let drafts: Vec<TicketDraft> = [
            row(&[
                (Field::TicketId, txt("1")),
                (Field::ClientName, txt("Acme")),
                (Field::Technician, txt("Joana")),
                (Field::TotalServiceTime, txt("2:00")),
                (Field::ExternalService, txt("sim")),
                (Field::PrimaryCategory, txt("Rede")),
            ]),
            row(&[
                (Field::TicketId, txt("2")),
                (Field::ClientName, txt("Acme")),
                (Field::Technician, txt("Pedro")),
                (Field::TotalServiceTime, txt("1:30")),
                (Field::PrimaryCategory, txt("Rede")),
            ]),
            row(&[
                (Field::TicketId, txt("3")),
                (Field::ClientName, txt("Globex")),
                (Field::Technician, txt("Joana")),
                (Field::TotalServiceTime, txt("0:30")),
            ]),
        ]
        .iter()
        .enumerate()
        .map(|(i, r)| build_ticket(r, i + 1).unwrap())
        .collect();

        let stats = compute_statistics(drafts.iter().map(|d| d.stat_input()));
        assert_eq!(stats.total_tickets, 3);
        assert_eq!(stats.total_hours, 4.0);
        assert_eq!(stats.unique_clients, 2);
        assert_eq!(stats.unique_technicians, 2);
        assert_eq!(stats.hours_by_client["Acme"], 3.5);
        assert_eq!(stats.hours_by_technician["Joana"], 2.5);
        assert_eq!(stats.external_services_by_client["Acme"], 1);
        assert_eq!(stats.external_services_by_technician.get("Pedro"), None);
        assert_eq!(stats.primary_categories["Rede"], 2);
    }

    #[test]
    fn batch_ids_are_short_and_distinct() {
        let a = new_batch_id();
        let b = new_batch_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn client_profile_merges_each_field_from_its_first_supplier() {
        let drafts: Vec<TicketDraft> = [
            row(&[
                (Field::TicketId, txt("1")),
                (Field::ClientName, txt("Acme")),
                (Field::Contact, txt("ana@acme.com")),
            ]),
            row(&[
                (Field::TicketId, txt("2")),
                (Field::ClientName, txt(" acme ")),
                (Field::Sector, txt("TI")),
            ]),
            row(&[
                (Field::TicketId, txt("3")),
                (Field::ClientName, txt("ACME")),
                (Field::Contact, txt("outro@acme.com")),
            ]),
        ]
        .iter()
        .enumerate()
        .map(|(i, r)| build_ticket(r, i + 1).unwrap())
        .collect();

        let profiles = client_profiles(&drafts);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "Acme");
        assert_eq!(profiles[0].contact.as_deref(), Some("ana@acme.com"));
        assert_eq!(profiles[0].sector.as_deref(), Some("TI"));
    }

    #[test]
    fn name_variants_collapse_to_one_profile() {
        let drafts: Vec<TicketDraft> = [
            row(&[(Field::TicketId, txt("1")), (Field::ClientName, txt("Acme"))]),
            row(&[(Field::TicketId, txt("2")), (Field::ClientName, txt(" acme "))]),
            row(&[(Field::TicketId, txt("3")), (Field::ClientName, txt("Globex"))]),
        ]
        .iter()
        .enumerate()
        .map(|(i, r)| build_ticket(r, i + 1).unwrap())
        .collect();

        let profiles = client_profiles(&drafts);
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].key, "acme");
        assert_eq!(profiles[1].key, "globex");
    }

    // ─── in-memory sink for the persistence logic ────────────────────────────

    #[derive(Default)]
    struct FakeSink {
        month: Option<i32>,
        year: Option<i32>,
        bad_rows: Vec<usize>,
        stored: Vec<(Option<i32>, Option<i32>, usize)>,
        chunks_committed: usize,
    }

    impl DraftSink for FakeSink {
        async fn delete_period(&mut self, month: i32, year: i32) -> sqlx::Result<u64> {
            let before = self.stored.len();
            self.stored
                .retain(|(m, y, _)| (*m, *y) != (Some(month), Some(year)));
            Ok((before - self.stored.len()) as u64)
        }

        async fn insert_chunk(&mut self, chunk: &[TicketDraft]) -> sqlx::Result<()> {
            if chunk.iter().any(|d| self.bad_rows.contains(&d.row)) {
                return Err(sqlx::Error::Protocol("constraint violation".into()));
            }
            for d in chunk {
                self.stored.push((self.month, self.year, d.row));
            }
            self.chunks_committed += 1;
            Ok(())
        }

        async fn insert_row(&mut self, draft: &TicketDraft) -> sqlx::Result<()> {
            if self.bad_rows.contains(&draft.row) {
                return Err(sqlx::Error::Protocol("constraint violation".into()));
            }
            self.stored.push((self.month, self.year, draft.row));
            Ok(())
        }
    }

    fn numbered_drafts(n: usize) -> Vec<TicketDraft> {
        (1..=n)
            .map(|i| build_ticket(&row(&[(Field::TicketId, txt(&i.to_string()))]), i).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn failing_chunk_degrades_to_row_inserts() {
        let drafts = numbered_drafts(250);
        let mut sink = FakeSink {
            month: Some(3),
            year: Some(2025),
            bad_rows: vec![130],
            ..Default::default()
        };
        let (inserted, skipped) = persist_drafts(&mut sink, &drafts, Some(3), Some(2025))
            .await
            .unwrap();
        assert_eq!(inserted, 249);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].row, 130);
        assert_eq!(sink.stored.len(), 249);
        // chunks 1 and 3 landed whole; chunk 2 fell back to per-row inserts
        assert_eq!(sink.chunks_committed, 2);
    }

    #[tokio::test]
    async fn reingesting_a_period_replaces_it() {
        let batch = numbered_drafts(3);
        let mut sink = FakeSink {
            month: Some(3),
            year: Some(2025),
            ..Default::default()
        };
        persist_drafts(&mut sink, &batch, Some(3), Some(2025)).await.unwrap();
        let (inserted, skipped) = persist_drafts(&mut sink, &batch, Some(3), Some(2025))
            .await
            .unwrap();
        assert_eq!(inserted, 3);
        assert!(skipped.is_empty());
        assert_eq!(sink.stored.len(), 3);
    }

    #[tokio::test]
    async fn unknown_period_appends() {
        let batch = numbered_drafts(2);
        let mut sink = FakeSink::default();
        persist_drafts(&mut sink, &batch, None, None).await.unwrap();
        persist_drafts(&mut sink, &batch, None, None).await.unwrap();
        assert_eq!(sink.stored.len(), 4);
    }
}
