use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Client, ClientSession, CreditNote, Fee, Invoice, Message, MessageAssignment, Payee,
};
use crate::store::{BillingStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    payees: BTreeMap<Uuid, Payee>,
    clients: BTreeMap<Uuid, Client>,
    fees: BTreeMap<Uuid, Fee>,
    sessions: BTreeMap<Uuid, ClientSession>,
    invoices: BTreeMap<Uuid, Invoice>,
    credit_notes: BTreeMap<Uuid, CreditNote>,
    messages: BTreeMap<Uuid, Message>,
    assignments: BTreeSet<MessageAssignment>,
    invoice_sequence: i64,
}

/// In-process store.
///
/// A unit of work holds the store-wide lock for its whole lifetime and
/// works on a private copy of the tables, which replaces the shared copy on
/// commit. Units of work are therefore fully serialised.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl BillingStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx { guard, work })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn sorted<T, K: Ord>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn commit(self) -> Result<()> {
        let MemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }

    async fn insert_payee(&mut self, payee: &Payee) -> Result<()> {
        self.work.payees.insert(payee.id, payee.clone());
        Ok(())
    }

    async fn update_payee(&mut self, payee: &Payee) -> Result<()> {
        self.work.payees.insert(payee.id, payee.clone());
        Ok(())
    }

    async fn payee(&mut self, id: Uuid) -> Result<Option<Payee>> {
        Ok(self.work.payees.get(&id).cloned())
    }

    async fn payees(&mut self) -> Result<Vec<Payee>> {
        Ok(sorted(self.work.payees.values().cloned(), |p| p.contact.name.clone()))
    }

    async fn insert_client(&mut self, client: &Client) -> Result<()> {
        self.work.clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn update_client(&mut self, client: &Client) -> Result<()> {
        self.work.clients.insert(client.id, client.clone());
        Ok(())
    }

    async fn client(&mut self, id: Uuid) -> Result<Option<Client>> {
        Ok(self.work.clients.get(&id).cloned())
    }

    async fn clients(&mut self, active_only: bool) -> Result<Vec<Client>> {
        Ok(sorted(
            self.work
                .clients
                .values()
                .filter(|c| !active_only || c.active)
                .cloned(),
            |c| c.contact.name.clone(),
        ))
    }

    async fn delete_client(&mut self, id: Uuid) -> Result<()> {
        let tables = &mut self.work;
        tables.clients.remove(&id);
        tables.fees.retain(|_, fee| fee.client_id != id);
        tables.sessions.retain(|_, session| session.client_id != id);
        tables.credit_notes.retain(|_, note| note.client_id != id);
        tables.invoices.retain(|_, invoice| invoice.client_id != id);
        tables.assignments.retain(|row| row.client_id != Some(id));
        Ok(())
    }

    async fn fees(&mut self, client_id: Uuid) -> Result<Vec<Fee>> {
        Ok(sorted(
            self.work
                .fees
                .values()
                .filter(|fee| fee.client_id == client_id)
                .cloned()
                .map(|mut fee| {
                    fee.persisted = true;
                    fee
                }),
            |fee| fee.from,
        ))
    }

    async fn save_fee(&mut self, fee: &Fee) -> Result<()> {
        let mut stored = fee.clone();
        stored.persisted = true;
        self.work.fees.insert(fee.id, stored);
        Ok(())
    }

    async fn insert_session(&mut self, session: &ClientSession) -> Result<()> {
        self.work.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn update_session(&mut self, session: &ClientSession) -> Result<()> {
        self.work.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn session(&mut self, id: Uuid) -> Result<Option<ClientSession>> {
        Ok(self.work.sessions.get(&id).cloned())
    }

    async fn delete_session(&mut self, id: Uuid) -> Result<()> {
        self.work.sessions.remove(&id);
        Ok(())
    }

    async fn sessions_for_client(&mut self, client_id: Uuid) -> Result<Vec<ClientSession>> {
        Ok(sorted(
            self.work
                .sessions
                .values()
                .filter(|s| s.client_id == client_id)
                .cloned(),
            |s| (s.session_date, s.created_at),
        ))
    }

    async fn sessions_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<ClientSession>> {
        Ok(sorted(
            self.work
                .sessions
                .values()
                .filter(|s| s.invoice_id == Some(invoice_id))
                .cloned(),
            |s| (s.session_date, s.created_at),
        ))
    }

    async fn next_invoice_number(&mut self) -> Result<i64> {
        self.work.invoice_sequence += 1;
        Ok(self.work.invoice_sequence)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        self.work.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        self.work.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn invoice(&mut self, id: Uuid) -> Result<Option<Invoice>> {
        Ok(self.work.invoices.get(&id).cloned())
    }

    async fn delete_invoice(&mut self, id: Uuid) -> Result<()> {
        self.work.invoices.remove(&id);
        Ok(())
    }

    async fn invoices_for_client(&mut self, client_id: Uuid) -> Result<Vec<Invoice>> {
        Ok(sorted(
            self.work
                .invoices
                .values()
                .filter(|i| i.client_id == client_id)
                .cloned(),
            |i| (i.date, i.number),
        ))
    }

    async fn invoices(&mut self) -> Result<Vec<Invoice>> {
        let mut invoices = sorted(self.work.invoices.values().cloned(), |i| (i.date, i.number));
        invoices.reverse();
        Ok(invoices)
    }

    async fn insert_credit_note(&mut self, note: &CreditNote) -> Result<()> {
        self.work.credit_notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn update_credit_note(&mut self, note: &CreditNote) -> Result<()> {
        self.work.credit_notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn credit_note(&mut self, id: Uuid) -> Result<Option<CreditNote>> {
        Ok(self.work.credit_notes.get(&id).cloned())
    }

    async fn delete_credit_note(&mut self, id: Uuid) -> Result<()> {
        self.work.credit_notes.remove(&id);
        Ok(())
    }

    async fn credit_notes_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<CreditNote>> {
        Ok(sorted(
            self.work
                .credit_notes
                .values()
                .filter(|n| n.invoice_id == invoice_id)
                .cloned(),
            |n| (n.date, n.created_at),
        ))
    }

    async fn insert_message(&mut self, message: &Message) -> Result<()> {
        self.work.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn update_message(&mut self, message: &Message) -> Result<()> {
        self.work.messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn message(&mut self, id: Uuid) -> Result<Option<Message>> {
        Ok(self.work.messages.get(&id).cloned())
    }

    async fn messages(&mut self) -> Result<Vec<Message>> {
        Ok(sorted(self.work.messages.values().cloned(), |m| (m.created_at, m.id)))
    }

    async fn delete_message(&mut self, id: Uuid) -> Result<()> {
        self.work.messages.remove(&id);
        self.work.assignments.retain(|row| row.message_id != id);
        Ok(())
    }

    async fn assignments(&mut self, message_id: Uuid) -> Result<Vec<MessageAssignment>> {
        Ok(self
            .work
            .assignments
            .iter()
            .filter(|row| row.message_id == message_id)
            .copied()
            .collect())
    }

    async fn insert_assignment(&mut self, row: &MessageAssignment) -> Result<()> {
        self.work.assignments.insert(*row);
        Ok(())
    }

    async fn delete_assignment(&mut self, row: &MessageAssignment) -> Result<()> {
        self.work.assignments.remove(row);
        Ok(())
    }

    async fn global_messages(&mut self) -> Result<Vec<Message>> {
        Ok(self.assigned_to(None))
    }

    async fn messages_for_client(&mut self, client_id: Uuid) -> Result<Vec<Message>> {
        Ok(self.assigned_to(Some(client_id)))
    }
}

impl MemoryTx {
    fn assigned_to(&self, client_id: Option<Uuid>) -> Vec<Message> {
        let ids: BTreeSet<Uuid> = self
            .work
            .assignments
            .iter()
            .filter(|row| row.client_id == client_id)
            .map(|row| row.message_id)
            .collect();
        sorted(
            ids.into_iter()
                .filter_map(|id| self.work.messages.get(&id).cloned()),
            |m| (m.created_at, m.id),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn message() -> Message {
        Message {
            id: Uuid::new_v4(),
            text: "Closed on Friday".into(),
            from_date: None,
            until_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded() {
        let store = MemoryStore::new();
        let msg = message();

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_message(&msg).await.unwrap();
            // dropped without commit
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.message(msg.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_work_is_visible() {
        let store = MemoryStore::new();
        let msg = message();

        let mut tx = store.begin().await.unwrap();
        tx.insert_message(&msg).await.unwrap();
        tx.insert_assignment(&MessageAssignment {
            message_id: msg.id,
            client_id: None,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.global_messages().await.unwrap(), vec![msg.clone()]);
        assert!(tx.messages_for_client(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invoice_numbers_are_sequential() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.next_invoice_number().await.unwrap(), 1);
        assert_eq!(tx.next_invoice_number().await.unwrap(), 2);
    }
}
