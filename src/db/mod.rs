// src/db/mod.rs

use sqlx::{Pool, Postgres};
use std::env;

pub async fn connect() -> anyhow::Result<Pool<Postgres>> {
    let database_url = env::var("DATABASE_URL")
        .expect("❌ DATABASE_URL must be set in your .env file");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    init_schema(&pool).await?;

    tracing::info!("✅ Connected to PostgreSQL");
    Ok(pool)
}

/// Bootstraps the three tables and the lookup indexes. Statements are
/// idempotent so a restart against an existing database is a no-op.
pub async fn init_schema(pool: &Pool<Postgres>) -> anyhow::Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            id                    BIGSERIAL PRIMARY KEY,
            name                  TEXT NOT NULL,
            contact               TEXT,
            sector                TEXT,
            email                 TEXT,
            phone                 TEXT,
            notes                 TEXT,
            contract_hours        DOUBLE PRECISION NOT NULL DEFAULT 10.0,
            hourly_rate           DOUBLE PRECISION NOT NULL DEFAULT 100.0,
            overtime_rate         DOUBLE PRECISION NOT NULL DEFAULT 115.0,
            external_service_rate DOUBLE PRECISION NOT NULL DEFAULT 88.0,
            active                BOOLEAN NOT NULL DEFAULT TRUE,
            created_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at            TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        // identity is the normalized name, not the raw one
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS clients_name_key
            ON clients (LOWER(TRIM(name)))
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS technicians (
            id                   BIGSERIAL PRIMARY KEY,
            name                 TEXT NOT NULL,
            email                TEXT,
            phone                TEXT,
            department           TEXT,
            monthly_hours_target DOUBLE PRECISION NOT NULL DEFAULT 160.0,
            efficiency_target    DOUBLE PRECISION NOT NULL DEFAULT 85.0,
            active               BOOLEAN NOT NULL DEFAULT TRUE,
            created_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at           TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS technicians_name_key
            ON technicians (LOWER(TRIM(name)))
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS ticket_data (
            id                 BIGSERIAL PRIMARY KEY,
            ticket_id          TEXT,
            client_name        TEXT,
            client_id          BIGINT,
            subject            TEXT,
            technician         TEXT,
            primary_category   TEXT,
            secondary_category TEXT,
            contact            TEXT,
            arrival_date       TIMESTAMP,
            departure_date     TIMESTAMP,
            completion_date    TIMESTAMP,
            workstation        TEXT,
            pause_reason       TEXT,
            sector             TEXT,
            status             TEXT,
            ticket_type        TEXT,
            service            TEXT,
            description        TEXT,
            business_hours     BOOLEAN,
            external_service   BOOLEAN,
            start_date         TIMESTAMP,
            end_date           TIMESTAMP,
            total_service_time DOUBLE PRECISION NOT NULL DEFAULT 0.0,
            processing_month   INTEGER,
            processing_year    INTEGER,
            upload_batch_id    TEXT,
            created_at         TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ticket_data_period_idx
            ON ticket_data (processing_year, processing_month)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ticket_data_batch_idx
            ON ticket_data (upload_batch_id)
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ticket_data_client_idx
            ON ticket_data (LOWER(TRIM(client_name)))
        "#,
    ];

    for stmt in statements {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}
