use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::money::MoneyError;

/// Result alias used throughout the billing core.
pub type Result<T, E = BillingError> = std::result::Result<T, E>;

/// Field-scoped validation messages.
///
/// Messages are collected rather than returned on the first failure so the
/// caller can report every offending field in a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message against a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Moves every message from `other` into this collection.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Messages recorded against `field`, empty if none.
    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Turns a non-empty collection into a `BillingError::Validation`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BillingError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{} {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors raised by the billing core.
///
/// Domain-rule violations (`Validation`, `IllegalTransition`,
/// `NotDestroyable`, `NotUpdatable`, `NotFound`) are distinguishable from
/// collaborator and storage failures so the surrounding layer can render
/// them as user-facing messages.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("{entity} status cannot change from {from} to {to}: {message}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        to: String,
        message: String,
    },

    #[error("{entity} {id} cannot be deleted: {reason}")]
    NotDestroyable {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("{entity} {id} cannot be updated: {reason}")]
    NotUpdatable {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl BillingError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Shorthand for a validation failure on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// True when the failure was caused by a business rule rather than by
    /// storage or a collaborator.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::IllegalTransition { .. }
                | Self::NotDestroyable { .. }
                | Self::NotUpdatable { .. }
                | Self::Money(_)
        )
    }

    /// Per-field view of a rule violation, as shown next to form fields.
    pub fn field_errors(&self) -> ValidationErrors {
        match self {
            Self::Validation(errors) => errors.clone(),
            Self::IllegalTransition { message, .. } => {
                let mut errors = ValidationErrors::new();
                errors.add("status", message.clone());
                errors
            }
            Self::Money(err) => {
                let mut errors = ValidationErrors::new();
                errors.add("amount", err.to_string());
                errors
            }
            _ => ValidationErrors::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_messages_per_field() {
        let mut errors = ValidationErrors::new();
        errors.add("date", "cannot be changed");
        errors.add("text", "cannot be changed");
        errors.add("date", "must be present");

        assert_eq!(errors.get("date").len(), 2);
        assert_eq!(errors.get("text"), ["cannot be changed".to_string()]);
        assert!(errors.get("amount").is_empty());
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["date", "text"]);
    }

    #[test]
    fn test_empty_errors_are_ok() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn test_illegal_transition_renders_as_status_error() {
        let err = BillingError::IllegalTransition {
            entity: "invoice",
            from: "paid".into(),
            to: "sent".into(),
            message: "can only be marked as 'paid' after being 'sent'".into(),
        };

        assert!(err.is_rule_violation());
        assert!(err.field_errors().contains("status"));
    }
}
