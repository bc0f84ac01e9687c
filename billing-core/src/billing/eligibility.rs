use chrono::{Months, NaiveDate};
use serde::Serialize;

use crate::models::client::Client;
use crate::models::client_session::ClientSession;
use crate::models::invoice::{Invoice, InvoiceStatus};

/// Why a client cannot be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Blocker {
    Active,
    UninvoicedSessions,
    UnpaidInvoices,
    /// Some invoice is inside the retention period of `years`.
    RecentInvoices { years: u32 },
}

impl Blocker {
    pub fn reason(&self) -> String {
        match self {
            Blocker::Active => "client is active".to_string(),
            Blocker::UninvoicedSessions => "uninvoiced sessions".to_string(),
            Blocker::UnpaidInvoices => "unpaid invoices".to_string(),
            Blocker::RecentInvoices { years } => {
                format!("invoices less than {} old", years_in_words(*years))
            }
        }
    }
}

/// `5` -> "five years", `1` -> "one year"; larger counts stay numeric.
fn years_in_words(years: u32) -> String {
    const WORDS: [&str; 11] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    ];
    let count = WORDS
        .get(years as usize)
        .map(|word| word.to_string())
        .unwrap_or_else(|| years.to_string());
    if years == 1 {
        format!("{} year", count)
    } else {
        format!("{} years", count)
    }
}

/// Result of the deletion check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deletability {
    pub deletable: bool,
    pub reason: Option<String>,
}

impl Deletability {
    fn allowed() -> Self {
        Self {
            deletable: true,
            reason: None,
        }
    }

    fn blocked(blocker: Blocker) -> Self {
        Self {
            deletable: false,
            reason: Some(blocker.reason()),
        }
    }
}

/// First failing rule, in priority order, that stops the client being
/// deleted.
///
/// Paid invoices dated within `retention_years` of `today` keep the client
/// on record.
pub fn deletion_blocker(
    client: &Client,
    sessions: &[ClientSession],
    invoices: &[Invoice],
    today: NaiveDate,
    retention_years: u32,
) -> Option<Blocker> {
    if client.active {
        return Some(Blocker::Active);
    }
    if sessions.iter().any(|session| !session.is_invoiced()) {
        return Some(Blocker::UninvoicedSessions);
    }
    if invoices.iter().any(|invoice| invoice.status != InvoiceStatus::Paid) {
        return Some(Blocker::UnpaidInvoices);
    }

    let cutoff = today
        .checked_sub_months(Months::new(retention_years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN);
    if invoices.iter().any(|invoice| invoice.date >= cutoff) {
        return Some(Blocker::RecentInvoices {
            years: retention_years,
        });
    }
    None
}

pub fn deletability(
    client: &Client,
    sessions: &[ClientSession],
    invoices: &[Invoice],
    today: NaiveDate,
    retention_years: u32,
) -> Deletability {
    match deletion_blocker(client, sessions, invoices, today, retention_years) {
        Some(blocker) => Deletability::blocked(blocker),
        None => Deletability::allowed(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::models::contact::Contact;
    use crate::models::money::Money;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn client(active: bool) -> Client {
        Client {
            id: Uuid::new_v4(),
            contact: Contact::default(),
            title: None,
            active,
            paid_by: None,
            payee_reference: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session(invoice_id: Option<Uuid>) -> ClientSession {
        ClientSession {
            id: Uuid::new_v4(),
            client_id: Uuid::nil(),
            invoice_id,
            session_date: date(2019, 1, 1),
            units: Decimal::ONE,
            unit_rate: Money::gbp(6000),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn invoice(status: InvoiceStatus, on: NaiveDate) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            number: 1,
            client_id: Uuid::nil(),
            payee_id: None,
            date: on,
            amount: Money::gbp(6000),
            status,
            text: String::new(),
            document: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    const TODAY: (i32, u32, u32) = (2025, 6, 19);

    fn check(client: &Client, sessions: &[ClientSession], invoices: &[Invoice]) -> Deletability {
        deletability(client, sessions, invoices, date(TODAY.0, TODAY.1, TODAY.2), 5)
    }

    #[test]
    fn test_active_client_is_not_deletable() {
        let result = check(&client(true), &[], &[]);
        assert!(!result.deletable);
        assert_eq!(result.reason.as_deref(), Some("client is active"));
    }

    #[test]
    fn test_uninvoiced_sessions_block_deletion() {
        let result = check(&client(false), &[session(None)], &[]);
        assert_eq!(result.reason.as_deref(), Some("uninvoiced sessions"));
    }

    #[test]
    fn test_unpaid_invoices_block_deletion() {
        let old = invoice(InvoiceStatus::Sent, date(2015, 1, 1));
        let result = check(&client(false), &[session(Some(old.id))], &[old]);
        assert_eq!(result.reason.as_deref(), Some("unpaid invoices"));
    }

    #[test]
    fn test_recent_paid_invoice_blocks_deletion() {
        let recent = invoice(InvoiceStatus::Paid, date(2024, 6, 19));
        let result = check(&client(false), &[], &[recent]);
        assert!(!result.deletable);
        assert_eq!(result.reason.as_deref(), Some("invoices less than five years old"));
    }

    #[test]
    fn test_retention_period_follows_settings() {
        let paid = invoice(InvoiceStatus::Paid, date(2019, 1, 1));
        let today = date(TODAY.0, TODAY.1, TODAY.2);

        let result = deletability(&client(false), &[], &[paid.clone()], today, 7);
        assert_eq!(
            result.reason.as_deref(),
            Some("invoices less than seven years old")
        );
        assert_eq!(
            deletion_blocker(&client(false), &[], &[paid.clone()], today, 7),
            Some(Blocker::RecentInvoices { years: 7 })
        );

        assert!(deletability(&client(false), &[], &[paid.clone()], today, 5).deletable);
        assert_eq!(
            Blocker::RecentInvoices { years: 1 }.reason(),
            "invoices less than one year old"
        );
        assert_eq!(
            Blocker::RecentInvoices { years: 12 }.reason(),
            "invoices less than 12 years old"
        );
    }

    #[test]
    fn test_old_paid_invoices_allow_deletion() {
        let old = invoice(InvoiceStatus::Paid, date(2019, 1, 1));
        let result = check(&client(false), &[session(Some(old.id))], &[old]);
        assert!(result.deletable);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn test_priority_order() {
        // active beats everything else
        let result = check(
            &client(true),
            &[session(None)],
            &[invoice(InvoiceStatus::Created, date(2025, 1, 1))],
        );
        assert_eq!(result.reason.as_deref(), Some("client is active"));
    }
}
