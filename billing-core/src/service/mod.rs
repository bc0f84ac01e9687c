//! Transactional billing operations.
//!
//! Each public method opens one unit of work, applies the rules from
//! [`crate::billing`] and commits, so callers never observe a half-applied
//! change. Send flows are the one exception: they split rendering, delivery
//! and the status move into separate steps so a failed delivery never marks
//! a document as sent.

mod clients;
mod credit_notes;
mod invoices;
mod messages;
mod payees;
mod sessions;


use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::billing::invoicing::recompute_amount;
use crate::clock::{Clock, SystemClock};
use crate::config::BillingSettings;
use crate::delivery::{
    BillingDocument, DocumentGenerator, LogNotifier, Notification, Notifier, TextDocumentGenerator,
};
use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::{
    Attachment, Billing, Client, ClientSession, Contact, CreditNote, Invoice, Message, Money, Payee,
};
use crate::store::{BillingStore, StoreTx};

pub use clients::ClientRate;
pub use invoices::BillingEntry;

/// Entry point for every billing operation.
pub struct BillingService<S: BillingStore> {
    store: S,
    clock: Arc<dyn Clock>,
    documents: Arc<dyn DocumentGenerator>,
    notifier: Arc<dyn Notifier>,
    settings: BillingSettings,
}

impl<S: BillingStore> BillingService<S> {
    /// Service using the system clock, plain-text documents and the logging
    /// notifier.
    pub fn new(store: S, settings: BillingSettings) -> Self {
        let notifier = LogNotifier::new(settings.sender_email.clone());
        Self {
            store,
            clock: Arc::new(SystemClock),
            documents: Arc::new(TextDocumentGenerator),
            notifier: Arc::new(notifier),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentGenerator>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &BillingSettings {
        &self.settings
    }

    fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Amounts entered by operators must be in the practice currency.
    fn check_currency(&self, field: &str, amount: Money, errors: &mut ValidationErrors) {
        if amount.currency != self.settings.currency {
            errors.add(field, format!("must be in {}", self.settings.currency));
        }
    }

    /// Renders a document for attachment.
    async fn render(&self, filename: String, document: &BillingDocument) -> Result<Attachment> {
        let bytes = self.documents.render(document).await.map_err(|e| {
            error!("Rendering {} failed: {:#}", filename, e);
            BillingError::Delivery(e)
        })?;
        Ok(Attachment {
            filename,
            content_type: self.documents.content_type().to_string(),
            bytes,
        })
    }

    /// Hands a notification to the notifier.
    async fn deliver(&self, notification: Notification) -> Result<()> {
        match self.notifier.send(&notification).await {
            Ok(()) => {
                info!("Delivered \"{}\" to {}", notification.subject, notification.to);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Delivering \"{}\" to {} failed: {:#}",
                    notification.subject, notification.to, e
                );
                Err(BillingError::Delivery(e))
            }
        }
    }

    fn notification(&self, to: &Contact, subject: String, document: &BillingDocument) -> Notification {
        let body = format!(
            "Dear {},\n\nPlease find attached {} dated {} for {}.\n\n{}",
            to.name,
            document.title,
            document.date.format("%d %b %Y"),
            document.amount,
            self.settings.sender_name
        );
        Notification {
            to: to.email.clone(),
            subject,
            body,
            attachment: None,
        }
    }
}

pub(crate) async fn require_client<T: StoreTx>(tx: &mut T, id: Uuid) -> Result<Client> {
    tx.client(id)
        .await?
        .ok_or_else(|| BillingError::not_found("client", id))
}

pub(crate) async fn require_payee<T: StoreTx>(tx: &mut T, id: Uuid) -> Result<Payee> {
    tx.payee(id)
        .await?
        .ok_or_else(|| BillingError::not_found("payee", id))
}

pub(crate) async fn require_session<T: StoreTx>(tx: &mut T, id: Uuid) -> Result<ClientSession> {
    tx.session(id)
        .await?
        .ok_or_else(|| BillingError::not_found("client session", id))
}

pub(crate) async fn require_invoice<T: StoreTx>(tx: &mut T, id: Uuid) -> Result<Invoice> {
    tx.invoice(id)
        .await?
        .ok_or_else(|| BillingError::not_found("invoice", id))
}

pub(crate) async fn require_credit_note<T: StoreTx>(tx: &mut T, id: Uuid) -> Result<CreditNote> {
    tx.credit_note(id)
        .await?
        .ok_or_else(|| BillingError::not_found("credit note", id))
}

pub(crate) async fn require_message<T: StoreTx>(tx: &mut T, id: Uuid) -> Result<Message> {
    tx.message(id)
        .await?
        .ok_or_else(|| BillingError::not_found("message", id))
}

/// Records a field error when a referenced payee does not exist.
async fn check_payee_exists<T: StoreTx>(
    tx: &mut T,
    field: &str,
    payee_id: Option<Uuid>,
    errors: &mut ValidationErrors,
) -> Result<()> {
    if let Some(id) = payee_id {
        if tx.payee(id).await?.is_none() {
            errors.add(field, "does not exist");
        }
    }
    Ok(())
}

/// Re-sums a created invoice from the sessions it claims and saves it.
/// Sent or paid invoices are saved untouched.
///
/// Callers have changed what a created invoice bills for, so any document
/// attached by an earlier failed send is dropped.
async fn save_invoice<T: StoreTx>(tx: &mut T, invoice: &mut Invoice, now: DateTime<Utc>) -> Result<()> {
    if invoice.is_created() {
        let claimed = tx.sessions_for_invoice(invoice.id).await?;
        recompute_amount(invoice, &claimed)?;
        discard_document(invoice);
    }
    invoice.updated_at = now;
    tx.update_invoice(invoice).await
}

/// Drops a document that no longer matches its invoice or credit note.
fn discard_document<B: Billing>(billing: &mut B) {
    if let Some(stale) = billing.detach() {
        info!("Discarded {} after {} {} changed", stale.filename, B::KIND, billing.id());
    }
}

/// Contact details of whoever a document is addressed to.
async fn bill_to_contact<T: StoreTx>(
    tx: &mut T,
    client: &Client,
    payee_id: Option<Uuid>,
) -> Result<Contact> {
    match payee_id {
        Some(id) => Ok(require_payee(tx, id).await?.contact),
        None => Ok(client.contact.clone()),
    }
}
