use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::billing::{Attachment, Billing};
use crate::models::money::Money;

/// Credit note status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum CreditNoteStatus {
    #[sqlx(rename = "created")]
    Created,
    #[sqlx(rename = "sent")]
    Sent,
    /// Reconciled against the client's balance
    #[sqlx(rename = "applied")]
    Applied,
}

impl fmt::Display for CreditNoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreditNoteStatus::Created => write!(f, "created"),
            CreditNoteStatus::Sent => write!(f, "sent"),
            CreditNoteStatus::Applied => write!(f, "applied"),
        }
    }
}

/// A negative adjustment against a sent or paid invoice.
///
/// `amount` is always stored negative. Client and payee are copied from the
/// parent invoice when the note is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditNote {
    pub id: Uuid,

    /// Invoice being credited; fixed at creation
    pub invoice_id: Uuid,

    /// Number of the invoice being credited
    pub invoice_number: i64,

    pub client_id: Uuid,
    pub payee_id: Option<Uuid>,
    pub date: NaiveDate,
    pub amount: Money,
    pub reason: String,
    pub text: String,
    pub status: CreditNoteStatus,
    pub document: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditNote {
    pub fn is_created(&self) -> bool {
        self.status == CreditNoteStatus::Created
    }
}

impl Billing for CreditNote {
    const KIND: &'static str = "credit_note";

    fn id(&self) -> Uuid {
        self.id
    }

    fn client_id(&self) -> Uuid {
        self.client_id
    }

    fn payee_id(&self) -> Option<Uuid> {
        self.payee_id
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn amount(&self) -> Money {
        self.amount
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn document(&self) -> Option<&Attachment> {
        self.document.as_ref()
    }

    fn attach(&mut self, document: Attachment) {
        self.document = Some(document);
    }

    fn detach(&mut self) -> Option<Attachment> {
        self.document.take()
    }

    fn summary(&self, _client_name: &str) -> String {
        format!("Credit Note for Invoice #{}", self.invoice_number)
    }

    fn document_filename(&self) -> String {
        format!("credit_note_{}.txt", self.id)
    }
}

/// Credit note creation request; the invoice comes from the route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCreditNote {
    pub amount: Money,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Credit note update request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCreditNote {
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub status: Option<CreditNoteStatus>,
}
