use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::billing::{Attachment, Billing};
use crate::models::double_option;
use crate::models::money::Money;

/// Invoice status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[sqlx(rename = "created")]
    Created,
    #[sqlx(rename = "sent")]
    Sent,
    #[sqlx(rename = "paid")]
    Paid,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Created => write!(f, "created"),
            InvoiceStatus::Sent => write!(f, "sent"),
            InvoiceStatus::Paid => write!(f, "paid"),
        }
    }
}

/// Invoice model representing a bill for a set of client sessions.
///
/// `amount` is always derived from the claimed sessions and is re-summed
/// every time the invoice is saved while still `created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier for the invoice
    pub id: Uuid,

    /// Sequential number shown to clients
    pub number: i64,

    pub client_id: Uuid,

    /// Payee billed instead of the client, if any
    pub payee_id: Option<Uuid>,

    /// Date the invoice is issued
    pub date: NaiveDate,

    /// Sum of the claimed sessions' fees
    pub amount: Money,

    pub status: InvoiceStatus,

    /// Note printed on the invoice
    pub text: String,

    /// Rendered document, once generated
    pub document: Option<Attachment>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_created(&self) -> bool {
        self.status == InvoiceStatus::Created
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// Credit notes may only be raised against invoices the client has seen.
    pub fn can_issue_credit_note(&self) -> bool {
        matches!(self.status, InvoiceStatus::Sent | InvoiceStatus::Paid)
    }
}

impl Billing for Invoice {
    const KIND: &'static str = "invoice";

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

    fn summary(&self, client_name: &str) -> String {
        format!("Invoice #{} for {}", self.number, client_name)
    }

    fn document_filename(&self) -> String {
        format!("invoice_{}.txt", self.number)
    }
}

/// Invoice creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    #[serde(default)]
    pub session_ids: Vec<Uuid>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub payee_id: Option<Uuid>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Invoice update request.
///
/// There is deliberately no `amount`: it is only ever derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInvoice {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub payee_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,

    /// Exact set of sessions the invoice should claim
    #[serde(default)]
    pub session_ids: Option<Vec<Uuid>>,
}
