use rust_decimal::Decimal;

use crate::error::{BillingError, ValidationErrors};
use crate::models::client_session::ClientSession;
use crate::models::invoice::Invoice;

const ENTITY: &str = "client session";

/// Units are stored as `NUMERIC(10, 2)`.
const UNITS_SCALE: u32 = 2;
const UNITS_LIMIT: i64 = 100_000_000;
const LOCKED_REASON: &str = "cannot change once invoice sent or paid";

/// A session may be edited or deleted while unclaimed, or while its
/// invoice is still `created`.
pub fn is_mutable(session: &ClientSession, invoice: Option<&Invoice>) -> bool {
    match (session.invoice_id, invoice) {
        (None, _) => true,
        (Some(_), Some(invoice)) => invoice.is_created(),
        // claimed by an invoice that no longer exists; treat as released
        (Some(_), None) => true,
    }
}

pub fn ensure_updatable(session: &ClientSession, invoice: Option<&Invoice>) -> Result<(), BillingError> {
    if is_mutable(session, invoice) {
        Ok(())
    } else {
        Err(BillingError::NotUpdatable {
            entity: ENTITY,
            id: session.id,
            reason: LOCKED_REASON.to_string(),
        })
    }
}

pub fn ensure_destroyable(session: &ClientSession, invoice: Option<&Invoice>) -> Result<(), BillingError> {
    if is_mutable(session, invoice) {
        Ok(())
    } else {
        Err(BillingError::NotDestroyable {
            entity: ENTITY,
            id: session.id,
            reason: "cannot delete once invoice sent or paid".to_string(),
        })
    }
}

pub fn validate_units(units: Decimal, errors: &mut ValidationErrors) {
    if units <= Decimal::ZERO {
        errors.add("units", "must be greater than 0");
    }
    if units >= Decimal::from(UNITS_LIMIT) {
        errors.add("units", format!("must be less than {}", UNITS_LIMIT));
    }
    if units.normalize().scale() > UNITS_SCALE {
        errors.add(
            "units",
            format!("must have at most {} decimal places", UNITS_SCALE),
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::invoice::InvoiceStatus;
    use crate::models::money::Money;

    fn invoice(status: InvoiceStatus) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            number: 1,
            client_id: Uuid::nil(),
            payee_id: None,
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            amount: Money::gbp(6000),
            status,
            text: String::new(),
            document: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn session(invoice: Option<&Invoice>) -> ClientSession {
        ClientSession {
            id: Uuid::new_v4(),
            client_id: Uuid::nil(),
            invoice_id: invoice.map(|i| i.id),
            session_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            units: Decimal::ONE,
            unit_rate: Money::gbp(6000),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_guard_follows_invoice_status() {
        assert!(is_mutable(&session(None), None));

        let created = invoice(InvoiceStatus::Created);
        assert!(is_mutable(&session(Some(&created)), Some(&created)));

        for status in [InvoiceStatus::Sent, InvoiceStatus::Paid] {
            let locked = invoice(status);
            let claimed = session(Some(&locked));
            assert!(matches!(
                ensure_updatable(&claimed, Some(&locked)),
                Err(BillingError::NotUpdatable { .. })
            ));
            assert!(matches!(
                ensure_destroyable(&claimed, Some(&locked)),
                Err(BillingError::NotDestroyable { .. })
            ));
        }
    }

    #[test]
    fn test_units_must_be_positive() {
        let mut errors = ValidationErrors::new();
        validate_units(Decimal::ZERO, &mut errors);
        assert!(errors.contains("units"));

        let mut errors = ValidationErrors::new();
        validate_units(Decimal::new(15, 1), &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_units_fit_two_decimal_places() {
        let mut errors = ValidationErrors::new();
        validate_units(Decimal::new(1333, 3), &mut errors);
        assert_eq!(
            errors.get("units"),
            ["must have at most 2 decimal places".to_string()]
        );

        // trailing zeros do not count
        let mut errors = ValidationErrors::new();
        validate_units(Decimal::new(1500, 3), &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_units_have_an_upper_limit() {
        let mut errors = ValidationErrors::new();
        validate_units(Decimal::new(9_999_999_999, 2), &mut errors);
        assert!(errors.is_empty());

        let mut errors = ValidationErrors::new();
        validate_units(Decimal::from(100_000_000), &mut errors);
        assert_eq!(
            errors.get("units"),
            ["must be less than 100000000".to_string()]
        );
    }
}
