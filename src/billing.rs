// src/billing.rs
//
// Three-tier billing: hours inside the contract at the base rate, hours
// beyond it at the overtime rate, plus a flat per-ticket surcharge for
// external services. The math is a pure function over (client terms,
// ticket set); the database wrappers only fetch and delegate.

use sqlx::PgPool;
use tracing::info;

use crate::ingest::get_or_create_client;
use crate::models::{BillingRates, Client, InvoiceBreakdown, PeriodSummary, Ticket};
use crate::normalize::name_key;

/// Rounding happens here, at the response boundary; everything upstream
/// keeps full float precision.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn compute_breakdown(client: &Client, tickets: Vec<Ticket>) -> InvoiceBreakdown {
    let total_hours: f64 = tickets.iter().map(|t| t.total_service_time).sum();
    let external_services = tickets
        .iter()
        .filter(|t| t.external_service == Some(true))
        .count() as i64;

    let used_contract_hours = total_hours.min(client.contract_hours);
    let overtime_hours = (total_hours - client.contract_hours).max(0.0);

    let contract_value = used_contract_hours * client.hourly_rate;
    let overtime_value = overtime_hours * client.overtime_rate;
    let external_services_value = external_services as f64 * client.external_service_rate;
    let total_value = contract_value + overtime_value + external_services_value;

    InvoiceBreakdown {
        client_name: client.name.clone(),
        client_id: client.id,
        total_hours: round2(total_hours),
        contract_hours: client.contract_hours,
        used_contract_hours: round2(used_contract_hours),
        overtime_hours: round2(overtime_hours),
        external_services,
        contract_value: round2(contract_value),
        overtime_value: round2(overtime_value),
        external_services_value: round2(external_services_value),
        total_value: round2(total_value),
        rates: BillingRates {
            hourly_rate: client.hourly_rate,
            overtime_rate: client.overtime_rate,
            external_service_rate: client.external_service_rate,
        },
        tickets,
    }
}

pub fn summarize(breakdowns: &[InvoiceBreakdown]) -> PeriodSummary {
    PeriodSummary {
        total_clients: breakdowns.len(),
        total_value: round2(breakdowns.iter().map(|b| b.total_value).sum()),
        total_hours: round2(breakdowns.iter().map(|b| b.total_hours).sum()),
        total_overtime_hours: round2(breakdowns.iter().map(|b| b.overtime_hours).sum()),
        total_external_services: breakdowns.iter().map(|b| b.external_services).sum(),
    }
}

/// Billing for one client-period. An unknown client is created with
/// default terms (mirrors ingestion's auto-create policy); a known client
/// with no tickets gets an all-zero breakdown, never an error. Tickets
/// are matched by normalized client name — the same rule the upsert uses.
pub async fn client_billing(
    pool: &PgPool,
    client_name: &str,
    month: i32,
    year: i32,
) -> sqlx::Result<InvoiceBreakdown> {
    let (client, created) = get_or_create_client(pool, client_name, None, None).await?;
    if created {
        info!(client = %client.name, "client auto-created during billing lookup");
    }

    let tickets = sqlx::query_as::<_, Ticket>(
        r#"
        SELECT * FROM ticket_data
        WHERE LOWER(TRIM(client_name)) = $1
          AND processing_month = $2 AND processing_year = $3
        ORDER BY id
        "#,
    )
    .bind(name_key(client_name))
    .bind(month)
    .bind(year)
    .fetch_all(pool)
    .await?;

    Ok(compute_breakdown(&client, tickets))
}

/// Billing for every client with activity in the period. Enumeration is
/// driven by the ticket data: a registered client with no tickets that
/// month is simply absent. Raw name variants that normalize to the same
/// key are billed once.
pub async fn all_clients_billing(
    pool: &PgPool,
    month: i32,
    year: i32,
) -> sqlx::Result<Vec<InvoiceBreakdown>> {
    let names: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT client_name FROM ticket_data
        WHERE processing_month = $1 AND processing_year = $2
          AND client_name IS NOT NULL AND TRIM(client_name) != ''
        ORDER BY client_name
        "#,
    )
    .bind(month)
    .bind(year)
    .fetch_all(pool)
    .await?;

    let mut seen_keys: Vec<String> = Vec::new();
    let mut breakdowns = Vec::new();
    for (name,) in names {
        let key = name_key(&name);
        if seen_keys.contains(&key) {
            continue;
        }
        seen_keys.push(key);
        breakdowns.push(client_billing(pool, &name, month, year).await?);
    }
    Ok(breakdowns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn client(contract_hours: f64) -> Client {
        Client {
            id: 1,
            name: "Acme".into(),
            contact: None,
            sector: None,
            email: None,
            phone: None,
            notes: None,
            contract_hours,
            hourly_rate: 100.0,
            overtime_rate: 115.0,
            external_service_rate: 88.0,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ticket(hours: f64, external: Option<bool>) -> Ticket {
        Ticket {
            id: 0,
            ticket_id: Some("t".into()),
            client_name: Some("Acme".into()),
            client_id: Some(1),
            subject: None,
            technician: None,
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
            upload_batch_id: Some("abc12345".into()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn overtime_and_external_surcharge() {
        // 12h against a 10h contract, one external ticket
        let b = compute_breakdown(
            &client(10.0),
            vec![
                ticket(5.0, Some(true)),
                ticket(4.0, Some(false)),
                ticket(3.0, None),
            ],
        );
        assert_eq!(b.total_hours, 12.0);
        assert_eq!(b.used_contract_hours, 10.0);
        assert_eq!(b.overtime_hours, 2.0);
        assert_eq!(b.external_services, 1);
        assert_eq!(b.contract_value, 1000.0);
        assert_eq!(b.overtime_value, 230.0);
        assert_eq!(b.external_services_value, 88.0);
        assert_eq!(b.total_value, 1318.0);
    }

    #[test]
    fn under_contract_has_no_overtime() {
        let b = compute_breakdown(&client(10.0), vec![ticket(6.5, None)]);
        assert_eq!(b.used_contract_hours, 6.5);
        assert_eq!(b.overtime_hours, 0.0);
        assert_eq!(b.total_value, 650.0);
    }

    #[test]
    fn zero_tickets_is_a_zero_breakdown() {
        let b = compute_breakdown(&client(10.0), vec![]);
        assert_eq!(b.total_hours, 0.0);
        assert_eq!(b.total_value, 0.0);
        assert_eq!(b.external_services, 0);
        assert!(b.tickets.is_empty());
        assert_eq!(b.contract_hours, 10.0);
    }

    #[test]
    fn unknown_flag_does_not_bill_external() {
        let b = compute_breakdown(&client(10.0), vec![ticket(1.0, None), ticket(1.0, None)]);
        assert_eq!(b.external_services, 0);
        assert_eq!(b.external_services_value, 0.0);
    }

    #[test]
    fn rounds_at_the_boundary_only() {
        // 1:40 twice = 3.333… hours
        let b = compute_breakdown(&client(10.0), vec![ticket(5.0 / 3.0, None), ticket(5.0 / 3.0, None)]);
        assert_eq!(b.total_hours, 3.33);
        assert_eq!(b.contract_value, 333.33);
    }

    #[test]
    fn summary_totals_across_clients() {
        let a = compute_breakdown(&client(10.0), vec![ticket(12.0, Some(true))]);
        let b = compute_breakdown(&client(10.0), vec![ticket(4.0, None)]);
        let s = summarize(&[a, b]);
        assert_eq!(s.total_clients, 2);
        assert_eq!(s.total_hours, 16.0);
        assert_eq!(s.total_overtime_hours, 2.0);
        assert_eq!(s.total_external_services, 1);
        assert_eq!(s.total_value, 1318.0 + 400.0);
    }

    #[test]
    fn round2_behaves() {
        assert_eq!(round2(1.005), 1.0); // 1.005 is 1.00499… in binary
        assert_eq!(round2(1.235), 1.24);
        assert_eq!(round2(0.0), 0.0);
    }
}
