//! Persistence seam for the billing graph.
//!
//! Every service operation runs inside one [`StoreTx`] and commits at the
//! end, so readers never observe a half-applied change (for example sessions
//! claimed but the invoice amount not yet re-summed). Dropping a `StoreTx`
//! without calling [`StoreTx::commit`] discards its writes.

pub mod memory;
pub mod postgres;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Client, ClientSession, CreditNote, Fee, Invoice, Message, MessageAssignment, Payee,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A backend able to open units of work.
#[async_trait]
pub trait BillingStore: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Opens a unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Cheap connectivity check for health endpoints.
    async fn ping(&self) -> Result<()>;
}

/// One atomic unit of work against the store.
///
/// Lookups by id used ahead of a mutation lock the row where the backend
/// supports it, so the state validated is the state committed.
#[async_trait]
pub trait StoreTx: Send {
    async fn commit(self) -> Result<()>;

    // Payees
    async fn insert_payee(&mut self, payee: &Payee) -> Result<()>;
    async fn update_payee(&mut self, payee: &Payee) -> Result<()>;
    async fn payee(&mut self, id: Uuid) -> Result<Option<Payee>>;
    async fn payees(&mut self) -> Result<Vec<Payee>>;

    // Clients
    async fn insert_client(&mut self, client: &Client) -> Result<()>;
    async fn update_client(&mut self, client: &Client) -> Result<()>;
    async fn client(&mut self, id: Uuid) -> Result<Option<Client>>;
    /// Clients ordered by name.
    async fn clients(&mut self, active_only: bool) -> Result<Vec<Client>>;
    /// Removes the client with its fees, sessions, invoices, credit notes
    /// and message assignments.
    async fn delete_client(&mut self, id: Uuid) -> Result<()>;

    // Fees
    /// Rate history ordered by `from`, every entry marked persisted.
    async fn fees(&mut self, client_id: Uuid) -> Result<Vec<Fee>>;
    /// Inserts the fee when it is not yet persisted, updates it otherwise.
    async fn save_fee(&mut self, fee: &Fee) -> Result<()>;

    // Sessions
    async fn insert_session(&mut self, session: &ClientSession) -> Result<()>;
    async fn update_session(&mut self, session: &ClientSession) -> Result<()>;
    async fn session(&mut self, id: Uuid) -> Result<Option<ClientSession>>;
    async fn delete_session(&mut self, id: Uuid) -> Result<()>;
    /// Sessions ordered by date.
    async fn sessions_for_client(&mut self, client_id: Uuid) -> Result<Vec<ClientSession>>;
    /// Sessions claimed by the invoice, ordered by date.
    async fn sessions_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<ClientSession>>;

    // Invoices
    async fn next_invoice_number(&mut self) -> Result<i64>;
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()>;
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<()>;
    async fn invoice(&mut self, id: Uuid) -> Result<Option<Invoice>>;
    async fn delete_invoice(&mut self, id: Uuid) -> Result<()>;
    /// Invoices for one client ordered by date.
    async fn invoices_for_client(&mut self, client_id: Uuid) -> Result<Vec<Invoice>>;
    /// Every invoice, newest date first.
    async fn invoices(&mut self) -> Result<Vec<Invoice>>;

    // Credit notes
    async fn insert_credit_note(&mut self, note: &CreditNote) -> Result<()>;
    async fn update_credit_note(&mut self, note: &CreditNote) -> Result<()>;
    async fn credit_note(&mut self, id: Uuid) -> Result<Option<CreditNote>>;
    async fn delete_credit_note(&mut self, id: Uuid) -> Result<()>;
    /// Credit notes for one invoice ordered by date.
    async fn credit_notes_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<CreditNote>>;

    // Messages
    async fn insert_message(&mut self, message: &Message) -> Result<()>;
    async fn update_message(&mut self, message: &Message) -> Result<()>;
    async fn message(&mut self, id: Uuid) -> Result<Option<Message>>;
    /// Messages ordered by creation time.
    async fn messages(&mut self) -> Result<Vec<Message>>;
    /// Removes the message and its assignment rows.
    async fn delete_message(&mut self, id: Uuid) -> Result<()>;
    async fn assignments(&mut self, message_id: Uuid) -> Result<Vec<MessageAssignment>>;
    async fn insert_assignment(&mut self, row: &MessageAssignment) -> Result<()>;
    async fn delete_assignment(&mut self, row: &MessageAssignment) -> Result<()>;
    /// Messages carrying the "all clients" row.
    async fn global_messages(&mut self) -> Result<Vec<Message>>;
    /// Messages assigned to this client specifically.
    async fn messages_for_client(&mut self, client_id: Uuid) -> Result<Vec<Message>>;
}
