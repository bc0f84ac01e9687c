use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::money::Money;

/// A rendered document attached to an invoice or credit note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Resolved recipient of a billing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BillTo {
    Payee(Uuid),
    Client(Uuid),
}

/// Behaviour shared by invoices and credit notes.
pub trait Billing {
    /// Lower-case document kind, used in file names and log lines.
    const KIND: &'static str;

    fn id(&self) -> Uuid;
    fn client_id(&self) -> Uuid;
    fn payee_id(&self) -> Option<Uuid>;
    fn date(&self) -> NaiveDate;
    fn amount(&self) -> Money;
    fn text(&self) -> &str;
    fn document(&self) -> Option<&Attachment>;
    fn attach(&mut self, document: Attachment);

    /// Drops the attached document, returning it.
    fn detach(&mut self) -> Option<Attachment>;

    /// Human-readable title such as `Invoice #12 for Jo Bloggs`.
    fn summary(&self, client_name: &str) -> String;

    /// Name given to the rendered document.
    fn document_filename(&self) -> String;

    /// The payee when one is set, otherwise the client.
    fn bill_to(&self) -> BillTo {
        match self.payee_id() {
            Some(payee) => BillTo::Payee(payee),
            None => BillTo::Client(self.client_id()),
        }
    }

    fn self_paid(&self) -> bool {
        self.payee_id().is_none()
    }

    fn has_document(&self) -> bool {
        self.document().is_some()
    }
}
