use crate::error::ValidationErrors;
use crate::models::credit_note::CreditNote;
use crate::models::invoice::Invoice;
use crate::models::money::Money;

/// Credit notes are always stored negative; positive input is flipped.
pub fn normalize_amount(amount: Money) -> Money {
    if amount.is_positive() {
        // every positive i64 has a negation
        Money::new(-amount.minor_units, amount.currency)
    } else {
        amount
    }
}

/// Checks run on every save of a credit note, creation or update.
///
/// The parent invoice is re-checked each time: a credit note is never valid
/// against an invoice that has not been sent.
pub fn validate(note: &CreditNote, invoice: &Invoice, errors: &mut ValidationErrors) {
    if note.reason.trim().is_empty() {
        errors.add("reason", "can't be blank");
    }

    if note.amount.is_zero() {
        errors.add("amount", "cannot be zero");
    } else if note.amount.currency != invoice.amount.currency {
        errors.add("amount", format!("must be in {}", invoice.amount.currency));
    } else if note.amount.exceeds_in_magnitude(&invoice.amount) {
        errors.add(
            "amount",
            format!("cannot exceed invoice amount of {}", invoice.amount.format()),
        );
    }

    if !invoice.can_issue_credit_note() {
        errors.add("invoice", "must be sent or paid before issuing a credit note");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::credit_note::CreditNoteStatus;
    use crate::models::invoice::InvoiceStatus;
    use crate::models::money::Currency;

    fn invoice(status: InvoiceStatus) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            number: 4,
            client_id: Uuid::nil(),
            payee_id: None,
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            amount: Money::gbp(18000),
            status,
            text: String::new(),
            document: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn note(invoice: &Invoice, pence: i64, reason: &str) -> CreditNote {
        CreditNote {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            invoice_number: invoice.number,
            client_id: invoice.client_id,
            payee_id: invoice.payee_id,
            date: invoice.date,
            amount: normalize_amount(Money::gbp(pence)),
            reason: reason.into(),
            text: String::new(),
            status: CreditNoteStatus::Created,
            document: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn errors_for(note: &CreditNote, invoice: &Invoice) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        validate(note, invoice, &mut errors);
        errors
    }

    #[test]
    fn test_sign_is_normalised() {
        assert_eq!(normalize_amount(Money::gbp(5000)), Money::gbp(-5000));
        assert_eq!(normalize_amount(Money::gbp(-5000)), Money::gbp(-5000));
    }

    #[test]
    fn test_requires_sent_or_paid_invoice() {
        for status in [InvoiceStatus::Sent, InvoiceStatus::Paid] {
            let inv = invoice(status);
            assert!(errors_for(&note(&inv, 5000, "Missed session"), &inv).is_empty());
        }

        let draft = invoice(InvoiceStatus::Created);
        let errors = errors_for(&note(&draft, 5000, "Missed session"), &draft);
        assert_eq!(
            errors.get("invoice"),
            ["must be sent or paid before issuing a credit note".to_string()]
        );
    }

    #[test]
    fn test_amount_bounded_by_invoice() {
        let inv = invoice(InvoiceStatus::Sent);
        assert!(errors_for(&note(&inv, 18000, "Full refund"), &inv).is_empty());

        let errors = errors_for(&note(&inv, 20000, "Too much"), &inv);
        assert_eq!(
            errors.get("amount"),
            ["cannot exceed invoice amount of £180.00".to_string()]
        );
    }

    #[test]
    fn test_most_negative_amount_is_still_bounded() {
        let inv = invoice(InvoiceStatus::Sent);
        let note = note(&inv, i64::MIN, "Refund");
        assert_eq!(note.amount.minor_units, i64::MIN);

        let errors = errors_for(&note, &inv);
        assert_eq!(
            errors.get("amount"),
            ["cannot exceed invoice amount of £180.00".to_string()]
        );
    }

    #[test]
    fn test_zero_amount_and_blank_reason() {
        let inv = invoice(InvoiceStatus::Sent);
        let errors = errors_for(&note(&inv, 0, "  "), &inv);
        assert_eq!(errors.get("amount"), ["cannot be zero".to_string()]);
        assert_eq!(errors.get("reason"), ["can't be blank".to_string()]);
    }

    #[test]
    fn test_currency_must_match_invoice() {
        let inv = invoice(InvoiceStatus::Sent);
        let mut foreign = note(&inv, 100, "Refund");
        foreign.amount = Money::new(-100, Currency::Eur);
        assert!(errors_for(&foreign, &inv).contains("amount"));
    }
}
