use std::fmt;

use crate::error::{BillingError, ValidationErrors};
use crate::models::credit_note::CreditNoteStatus;
use crate::models::invoice::InvoiceStatus;

/// Trait for the one-directional status lifecycles of billing documents.
///
/// Each implementation supplies its transition table; the shared helpers
/// below turn a proposed change into field-scoped errors.
pub trait Lifecycle: Copy + Eq + fmt::Display {
    /// Entity name used in error values.
    const ENTITY: &'static str;

    /// Message recorded against any non-status field edited after the
    /// document has left its initial state.
    const LOCKED_FIELD_MESSAGE: &'static str;

    /// The state every new document starts in.
    fn initial() -> Self;

    /// Checks a move from `from` to `to`. Staying in the same state is
    /// always allowed.
    ///
    /// # Returns
    ///
    /// `Err` with the message to show against the status field when the
    /// move is not in the transition table.
    fn check_transition(from: Self, to: Self) -> Result<(), &'static str>;

    fn is_initial(&self) -> bool {
        *self == Self::initial()
    }
}

impl Lifecycle for InvoiceStatus {
    const ENTITY: &'static str = "invoice";
    const LOCKED_FIELD_MESSAGE: &'static str =
        "cannot be changed once the invoice has been sent or paid";

    fn initial() -> Self {
        InvoiceStatus::Created
    }

    /// - Created -> Sent | Paid
    /// - Sent -> Paid
    /// - Paid is terminal
    fn check_transition(from: Self, to: Self) -> Result<(), &'static str> {
        if from == to {
            return Ok(());
        }
        match (from, to) {
            (InvoiceStatus::Created, InvoiceStatus::Sent | InvoiceStatus::Paid) => Ok(()),
            (InvoiceStatus::Sent, InvoiceStatus::Paid) => Ok(()),
            (InvoiceStatus::Created, _) => Err("invalid status transition"),
            (InvoiceStatus::Sent | InvoiceStatus::Paid, _) => {
                Err("can only be marked as 'paid' after being 'sent'")
            }
        }
    }
}

impl Lifecycle for CreditNoteStatus {
    const ENTITY: &'static str = "credit note";
    const LOCKED_FIELD_MESSAGE: &'static str =
        "cannot be changed once the credit note has been sent";

    fn initial() -> Self {
        CreditNoteStatus::Created
    }

    /// - Created -> Sent
    /// - Sent -> Applied
    /// - Applied is terminal
    fn check_transition(from: Self, to: Self) -> Result<(), &'static str> {
        if from == to {
            return Ok(());
        }
        match (from, to) {
            (CreditNoteStatus::Created, CreditNoteStatus::Sent) => Ok(()),
            (CreditNoteStatus::Sent, CreditNoteStatus::Applied) => Ok(()),
            (CreditNoteStatus::Created, _) => Err("invalid status transition"),
            (CreditNoteStatus::Sent, _) => Err("cannot change status once sent"),
            (CreditNoteStatus::Applied, _) => Err("cannot change status once applied"),
        }
    }
}

/// Validates a proposed edit against the lifecycle.
///
/// `changed` lists the non-status fields whose value actually differs from
/// the stored record. When the stored status is past its initial state,
/// every one of them is rejected individually; the status move itself is
/// checked against the transition table either way.
pub fn review_edit<S: Lifecycle>(
    was: S,
    proposed: Option<S>,
    changed: &[&str],
    errors: &mut ValidationErrors,
) {
    if !was.is_initial() {
        for field in changed {
            errors.add(*field, S::LOCKED_FIELD_MESSAGE);
        }
    }

    if let Some(to) = proposed {
        if let Err(message) = S::check_transition(was, to) {
            errors.add("status", message);
        }
    }
}

/// Converts the errors from `review_edit` into a `BillingError`.
///
/// A rejection that consists solely of a status error is reported as an
/// `IllegalTransition`; anything else stays a `Validation` failure so every
/// field is reported together.
pub fn into_outcome<S: Lifecycle>(
    was: S,
    proposed: Option<S>,
    errors: ValidationErrors,
) -> Result<(), BillingError> {
    if errors.is_empty() {
        return Ok(());
    }
    let only_status = errors.fields().all(|field| field == "status");
    match (only_status, proposed) {
        (true, Some(to)) => Err(BillingError::IllegalTransition {
            entity: S::ENTITY,
            from: was.to_string(),
            to: to.to_string(),
            message: errors.get("status").join("; "),
        }),
        _ => Err(BillingError::Validation(errors)),
    }
}

/// Checks a bare status move, as made by the `mark_*` operations.
pub fn transition<S: Lifecycle>(was: S, to: S) -> Result<(), BillingError> {
    let mut errors = ValidationErrors::new();
    review_edit(was, Some(to), &[], &mut errors);
    into_outcome(was, Some(to), errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    use InvoiceStatus::{Created, Paid, Sent};

    #[test]
    fn test_invoice_transition_table() {
        let allowed = [
            (Created, Created),
            (Created, Sent),
            (Created, Paid),
            (Sent, Sent),
            (Sent, Paid),
            (Paid, Paid),
        ];
        let rejected = [(Sent, Created), (Paid, Sent), (Paid, Created)];

        for (from, to) in allowed {
            assert!(transition(from, to).is_ok(), "{from} -> {to} should be allowed");
        }
        for (from, to) in rejected {
            let err = transition(from, to).unwrap_err();
            assert!(
                matches!(err, BillingError::IllegalTransition { .. }),
                "{from} -> {to} should be rejected"
            );
            assert!(err.field_errors().contains("status"));
        }
    }

    #[test]
    fn test_credit_note_transition_table() {
        use CreditNoteStatus::{Applied, Created as New, Sent as Issued};

        assert!(transition(New, Issued).is_ok());
        assert!(transition(Issued, Applied).is_ok());
        assert!(transition(Issued, New).is_err());
        assert!(transition(New, Applied).is_err());
        assert!(transition(Applied, Issued).is_err());
        assert!(transition(Applied, New).is_err());
    }

    #[test]
    fn test_locked_fields_are_reported_per_field() {
        let mut errors = ValidationErrors::new();
        review_edit(Sent, Some(Paid), &["date", "text"], &mut errors);

        assert_eq!(
            errors.get("date"),
            ["cannot be changed once the invoice has been sent or paid".to_string()]
        );
        assert!(errors.contains("text"));
        assert!(!errors.contains("status"));
        assert!(matches!(
            into_outcome(Sent, Some(Paid), errors),
            Err(BillingError::Validation(_))
        ));
    }

    #[test]
    fn test_created_documents_accept_field_edits() {
        let mut errors = ValidationErrors::new();
        review_edit(Created, None, &["date", "text"], &mut errors);
        assert!(errors.is_empty());
    }
}
