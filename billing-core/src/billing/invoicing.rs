use std::collections::HashSet;

use crate::models::client_session::ClientSession;
use crate::models::invoice::Invoice;
use crate::models::message::Message;
use crate::models::money::{Currency, Money, MoneyError};

/// Sum of the sessions' fees.
pub fn sessions_total(sessions: &[ClientSession], currency: Currency) -> Result<Money, MoneyError> {
    let fees = sessions
        .iter()
        .map(ClientSession::fee)
        .collect::<Result<Vec<_>, _>>()?;
    Money::sum(fees, currency)
}

/// Re-derives an invoice's amount from the sessions it currently claims.
pub fn recompute_amount(invoice: &mut Invoice, claimed: &[ClientSession]) -> Result<(), MoneyError> {
    invoice.amount = sessions_total(claimed, invoice.amount.currency)?;
    Ok(())
}

/// Messages applicable to a client on a given day: global and client
/// specific ones merged, de-duplicated and ordered oldest first.
pub fn merge_messages(global: Vec<Message>, specific: Vec<Message>) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Message> = global
        .into_iter()
        .chain(specific)
        .filter(|message| seen.insert(message.id))
        .collect();
    merged.sort_by_key(|message| (message.created_at, message.id));
    merged
}

fn single_reminder(invoice: &Invoice) -> String {
    format!(
        "Please note that Invoice #{} for {} dated {} appears outstanding.",
        invoice.number,
        invoice.amount.format(),
        invoice.date.format("%d %b %Y")
    )
}

fn reminder_line(invoice: &Invoice) -> String {
    format!(
        "- #{} for {} ({})",
        invoice.number,
        invoice.amount.format(),
        invoice.date.format("%d %b %Y")
    )
}

/// Reminder paragraph for a client's other unpaid invoices, if any.
pub fn unpaid_reminder(unpaid: &[Invoice]) -> Option<String> {
    match unpaid {
        [] => None,
        [only] => Some(single_reminder(only)),
        many => {
            let mut ordered: Vec<&Invoice> = many.iter().collect();
            ordered.sort_by_key(|invoice| (invoice.date, invoice.number));
            let lines = ordered
                .into_iter()
                .map(reminder_line)
                .collect::<Vec<_>>()
                .join("\n");
            Some(format!(
                "Please note that I appear not to have received payment for the following invoices:\n{}",
                lines
            ))
        }
    }
}

/// Initial note for a new invoice.
///
/// Active messages come first, one per line, followed by a blank line and
/// the unpaid-invoice reminder.
pub fn seed_text(messages: &[Message], unpaid: &[Invoice]) -> String {
    let mut parts = Vec::new();

    let message_block = messages
        .iter()
        .map(|message| message.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if !message_block.is_empty() {
        parts.push(message_block);
    }

    if let Some(reminder) = unpaid_reminder(unpaid) {
        parts.push(reminder);
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::models::invoice::InvoiceStatus;

    fn session(units: Decimal, pence: i64) -> ClientSession {
        ClientSession {
            id: Uuid::new_v4(),
            client_id: Uuid::nil(),
            invoice_id: None,
            session_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            units,
            unit_rate: Money::gbp(pence),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn invoice(number: i64, day: u32, pence: i64) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            number,
            client_id: Uuid::nil(),
            payee_id: None,
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            amount: Money::gbp(pence),
            status: InvoiceStatus::Sent,
            text: String::new(),
            document: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message(text: &str, minute: u32) -> Message {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, minute, 0).unwrap();
        Message {
            id: Uuid::new_v4(),
            text: text.into(),
            from_date: None,
            until_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_total_of_sessions() {
        let sessions = vec![
            session(Decimal::new(15, 1), 6000),
            session(Decimal::new(15, 1), 6000),
            session(Decimal::new(15, 1), 6000),
        ];
        assert_eq!(
            sessions_total(&sessions, Currency::Gbp).unwrap(),
            Money::gbp(27000)
        );
    }

    #[test]
    fn test_single_unpaid_reminder() {
        let text = unpaid_reminder(&[invoice(7, 5, 18000)]).unwrap();
        assert_eq!(
            text,
            "Please note that Invoice #7 for £180.00 dated 05 Jan 2025 appears outstanding."
        );
    }

    #[test]
    fn test_plural_reminder_is_ordered_by_date() {
        let text = unpaid_reminder(&[invoice(9, 20, 6000), invoice(8, 3, 12000)]).unwrap();
        assert_eq!(
            text,
            "Please note that I appear not to have received payment for the following invoices:\n\
             - #8 for £120.00 (03 Jan 2025)\n\
             - #9 for £60.00 (20 Jan 2025)"
        );
    }

    #[test]
    fn test_no_reminder_without_unpaid_invoices() {
        assert!(unpaid_reminder(&[]).is_none());
        assert_eq!(seed_text(&[], &[]), "");
    }

    #[test]
    fn test_seed_text_puts_messages_before_reminder() {
        let text = seed_text(
            &[message("Closed over Easter.", 0), message("New address.", 5)],
            &[invoice(3, 5, 6000)],
        );
        assert_eq!(
            text,
            "Closed over Easter.\nNew address.\n\n\
             Please note that Invoice #3 for £60.00 dated 05 Jan 2025 appears outstanding."
        );
    }

    #[test]
    fn test_merge_deduplicates_and_orders_oldest_first() {
        let older = message("older", 0);
        let newer = message("newer", 30);
        let merged = merge_messages(vec![newer.clone(), older.clone()], vec![older.clone()]);
        assert_eq!(
            merged.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["older", "newer"]
        );
    }
}
