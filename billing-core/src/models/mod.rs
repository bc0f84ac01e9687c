pub mod billing;
pub mod client;
pub mod client_session;
pub mod contact;
pub mod credit_note;
pub mod fee;
pub mod invoice;
pub mod message;
pub mod money;

pub use billing::{Attachment, BillTo, Billing};
pub use client::{Client, Payee};
pub use client_session::ClientSession;
pub use contact::Contact;
pub use credit_note::{CreditNote, CreditNoteStatus};
pub use fee::Fee;
pub use invoice::{Invoice, InvoiceStatus};
pub use message::{AssignmentTarget, Message, MessageAssignment};
pub use money::{Currency, Money};

use serde::{Deserialize, Deserializer};

/// Distinguishes "field absent" (`None`) from "field explicitly null"
/// (`Some(None)`) in update requests.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
