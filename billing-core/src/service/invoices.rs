use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::invoicing::{recompute_amount, seed_text};
use crate::billing::lifecycle::{into_outcome, review_edit, transition, Lifecycle};
use crate::billing::messages::active_for;
use crate::delivery::{BillingDocument, DocumentLine};
use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::invoice::{CreateInvoice, UpdateInvoice};
use crate::models::{
    Billing, Client, ClientSession, Contact, CreditNote, Invoice, InvoiceStatus, Money,
};
use crate::service::{
    bill_to_contact, check_payee_exists, discard_document, require_client, require_invoice, save_invoice,
    BillingService,
};
use crate::store::{BillingStore, StoreTx};

/// An invoice with the credit notes raised against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingEntry {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub credit_notes: Vec<CreditNote>,
}

impl<S: BillingStore> BillingService<S> {
    /// Opening note for a new invoice: active messages for the client, then
    /// a reminder about its unpaid invoices.
    async fn seed_invoice_text(&self, tx: &mut S::Tx, client_id: Uuid) -> Result<String> {
        let global = tx.global_messages().await?;
        let specific = tx.messages_for_client(client_id).await?;
        let messages = active_for(global, specific, self.today());

        let unpaid: Vec<Invoice> = tx
            .invoices_for_client(client_id)
            .await?
            .into_iter()
            .filter(|invoice| !invoice.is_paid())
            .collect();

        Ok(seed_text(&messages, &unpaid))
    }

    /// Loads the sessions in `ids` that `invoice` may claim, recording an
    /// error for each one it may not. Sessions it already claims are skipped.
    async fn claimable(
        tx: &mut S::Tx,
        invoice: &Invoice,
        ids: &[Uuid],
        errors: &mut ValidationErrors,
    ) -> Result<Vec<ClientSession>> {
        let mut sessions = Vec::new();
        for &id in ids {
            match tx.session(id).await? {
                None => errors.add("sessions", format!("{} does not exist", id)),
                Some(session) if session.client_id != invoice.client_id => {
                    errors.add("sessions", format!("{} belongs to another client", id))
                }
                Some(session) if session.invoice_id == Some(invoice.id) => {}
                Some(session) if session.is_invoiced() => {
                    errors.add("sessions", format!("{} is already invoiced", id))
                }
                Some(session) => sessions.push(session),
            }
        }
        Ok(sessions)
    }

    async fn attach_sessions(
        tx: &mut S::Tx,
        invoice_id: Uuid,
        sessions: Vec<ClientSession>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        for mut session in sessions {
            session.invoice_id = Some(invoice_id);
            session.updated_at = now;
            tx.update_session(&session).await?;
        }
        Ok(())
    }

    async fn release(
        tx: &mut S::Tx,
        sessions: Vec<ClientSession>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        for mut session in sessions {
            session.invoice_id = None;
            session.updated_at = now;
            tx.update_session(&session).await?;
        }
        Ok(())
    }

    fn sessions_locked(invoice: &Invoice, errors: &mut ValidationErrors) -> bool {
        if invoice.is_created() {
            false
        } else {
            errors.add("sessions", InvoiceStatus::LOCKED_FIELD_MESSAGE);
            true
        }
    }

    /// Creates an invoice for a client, claiming the given sessions.
    ///
    /// Date defaults to today, payee to the client's `paid_by`, and the
    /// text to the seeded messages and reminder.
    pub async fn create_invoice(&self, input: CreateInvoice) -> Result<Invoice> {
        let mut tx = self.store.begin().await?;
        let client = require_client(&mut tx, input.client_id).await?;
        let mut errors = ValidationErrors::new();

        check_payee_exists(&mut tx, "payee_id", input.payee_id, &mut errors).await?;

        let text = match input.text {
            Some(text) => text,
            None => self.seed_invoice_text(&mut tx, client.id).await?,
        };

        let now = self.now();
        let mut invoice = Invoice {
            id: Uuid::new_v4(),
            number: 0,
            client_id: client.id,
            payee_id: input.payee_id.or(client.paid_by),
            date: input.date.unwrap_or_else(|| self.today()),
            amount: Money::zero(self.settings.currency),
            status: InvoiceStatus::initial(),
            text,
            document: None,
            created_at: now,
            updated_at: now,
        };

        let sessions = Self::claimable(&mut tx, &invoice, &input.session_ids, &mut errors).await?;
        if !errors.is_empty() {
            warn!("Rejected new invoice for client {}: {}", client.summary(), errors);
            return Err(BillingError::Validation(errors));
        }

        invoice.number = tx.next_invoice_number().await?;
        tx.insert_invoice(&invoice).await?;
        let claimed = sessions.len();
        Self::attach_sessions(&mut tx, invoice.id, sessions, now).await?;
        save_invoice(&mut tx, &mut invoice, now).await?;
        tx.commit().await?;

        info!(
            "Created {} claiming {} sessions for {}",
            invoice.summary(client.name()),
            claimed,
            invoice.amount
        );
        Ok(invoice)
    }

    /// Applies an invoice form.
    ///
    /// Once the invoice has been sent or paid every changed field is rejected
    /// individually; a legal status move in the same form is still checked.
    pub async fn update_invoice(&self, id: Uuid, input: UpdateInvoice) -> Result<Invoice> {
        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(&mut tx, id).await?;
        let was = invoice.status;

        let claimed_sessions = tx.sessions_for_invoice(id).await?;
        let claimed: BTreeSet<Uuid> = claimed_sessions.iter().map(|s| s.id).collect();
        let wanted: Option<BTreeSet<Uuid>> =
            input.session_ids.map(|ids| ids.into_iter().collect());

        let mut changed = Vec::new();
        if input.date.map_or(false, |date| date != invoice.date) {
            changed.push("date");
        }
        if input.text.as_ref().map_or(false, |text| *text != invoice.text) {
            changed.push("text");
        }
        if input.payee_id.map_or(false, |payee| payee != invoice.payee_id) {
            changed.push("payee_id");
        }
        if wanted.as_ref().map_or(false, |wanted| *wanted != claimed) {
            changed.push("sessions");
        }

        let mut errors = ValidationErrors::new();
        review_edit(was, input.status, &changed, &mut errors);
        if let Some(payee) = input.payee_id {
            check_payee_exists(&mut tx, "payee_id", payee, &mut errors).await?;
        }

        let mut to_claim = Vec::new();
        let mut to_release = Vec::new();
        if let (true, Some(wanted)) = (invoice.is_created(), &wanted) {
            let added: Vec<Uuid> = wanted.difference(&claimed).copied().collect();
            to_claim = Self::claimable(&mut tx, &invoice, &added, &mut errors).await?;
            to_release = claimed_sessions
                .into_iter()
                .filter(|s| !wanted.contains(&s.id))
                .collect();
        }

        if let Err(e) = into_outcome(was, input.status, errors) {
            warn!("Rejected update to invoice #{}: {}", invoice.number, e);
            return Err(e);
        }

        if let Some(date) = input.date {
            invoice.date = date;
        }
        if let Some(text) = input.text {
            invoice.text = text;
        }
        if let Some(payee) = input.payee_id {
            invoice.payee_id = payee;
        }

        let now = self.now();
        let (claiming, releasing) = (to_claim.len(), to_release.len());
        Self::attach_sessions(&mut tx, id, to_claim, now).await?;
        Self::release(&mut tx, to_release, now).await?;

        if invoice.is_created() {
            let claimed = tx.sessions_for_invoice(id).await?;
            recompute_amount(&mut invoice, &claimed)?;
            if !changed.is_empty() {
                discard_document(&mut invoice);
            }
        }
        if let Some(status) = input.status {
            invoice.status = status;
        }
        invoice.updated_at = now;
        tx.update_invoice(&invoice).await?;
        tx.commit().await?;

        if invoice.status != was {
            info!("Invoice #{} moved from {} to {}", invoice.number, was, invoice.status);
        }
        info!(
            "Updated invoice #{} (claimed {}, released {}, amount {})",
            invoice.number, claiming, releasing, invoice.amount
        );
        Ok(invoice)
    }

    /// Attaches more sessions to a created invoice.
    pub async fn claim_sessions(&self, id: Uuid, session_ids: &[Uuid]) -> Result<Invoice> {
        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(&mut tx, id).await?;
        let mut errors = ValidationErrors::new();

        let mut sessions = Vec::new();
        if !Self::sessions_locked(&invoice, &mut errors) {
            sessions = Self::claimable(&mut tx, &invoice, session_ids, &mut errors).await?;
        }
        if !errors.is_empty() {
            warn!("Rejected claim on invoice #{}: {}", invoice.number, errors);
            return Err(BillingError::Validation(errors));
        }

        let now = self.now();
        let count = sessions.len();
        Self::attach_sessions(&mut tx, id, sessions, now).await?;
        save_invoice(&mut tx, &mut invoice, now).await?;
        tx.commit().await?;

        info!(
            "Invoice #{} claimed {} sessions, amount now {}",
            invoice.number, count, invoice.amount
        );
        Ok(invoice)
    }

    /// Detaches sessions from a created invoice, leaving them unclaimed.
    pub async fn release_sessions(&self, id: Uuid, session_ids: &[Uuid]) -> Result<Invoice> {
        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(&mut tx, id).await?;
        let mut errors = ValidationErrors::new();

        let mut sessions = Vec::new();
        if !Self::sessions_locked(&invoice, &mut errors) {
            for &session_id in session_ids {
                match tx.session(session_id).await? {
                    Some(session) if session.invoice_id == Some(id) => sessions.push(session),
                    _ => errors.add(
                        "sessions",
                        format!("{} is not claimed by this invoice", session_id),
                    ),
                }
            }
        }
        if !errors.is_empty() {
            warn!("Rejected release on invoice #{}: {}", invoice.number, errors);
            return Err(BillingError::Validation(errors));
        }

        let now = self.now();
        let count = sessions.len();
        Self::release(&mut tx, sessions, now).await?;
        save_invoice(&mut tx, &mut invoice, now).await?;
        tx.commit().await?;

        info!(
            "Invoice #{} released {} sessions, amount now {}",
            invoice.number, count, invoice.amount
        );
        Ok(invoice)
    }

    async fn move_invoice(&self, id: Uuid, to: InvoiceStatus) -> Result<Invoice> {
        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(&mut tx, id).await?;
        let was = invoice.status;

        if let Err(e) = transition(was, to) {
            warn!("Refused to move invoice #{} from {} to {}", invoice.number, was, to);
            return Err(e);
        }
        if was == to {
            return Ok(invoice);
        }

        // Final re-sum while the invoice is still created.
        let now = self.now();
        if invoice.is_created() {
            let claimed = tx.sessions_for_invoice(id).await?;
            recompute_amount(&mut invoice, &claimed)?;
        }
        invoice.status = to;
        invoice.updated_at = now;
        tx.update_invoice(&invoice).await?;
        tx.commit().await?;

        info!("Invoice #{} moved from {} to {}", invoice.number, was, to);
        Ok(invoice)
    }

    /// Marks the invoice sent without delivering it.
    pub async fn mark_invoice_sent(&self, id: Uuid) -> Result<Invoice> {
        self.move_invoice(id, InvoiceStatus::Sent).await
    }

    pub async fn mark_invoice_paid(&self, id: Uuid) -> Result<Invoice> {
        self.move_invoice(id, InvoiceStatus::Paid).await
    }

    fn invoice_document(
        &self,
        invoice: &Invoice,
        client: &Client,
        bill_to: Contact,
        sessions: &[ClientSession],
    ) -> Result<BillingDocument> {
        let lines = sessions
            .iter()
            .map(|session| -> Result<DocumentLine> {
                Ok(DocumentLine {
                    date: session.session_date,
                    description: session.description.clone(),
                    units: session.units,
                    unit_rate: session.unit_rate,
                    fee: session.fee()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BillingDocument {
            kind: Invoice::KIND,
            title: invoice.summary(client.name()),
            date: invoice.date,
            amount: invoice.amount,
            bill_to,
            client_name: client.name().to_string(),
            payee_reference: client.payee_reference.clone(),
            lines,
            reason: None,
            text: invoice.text.clone(),
        })
    }

    /// Renders, attaches and emails the invoice, then marks it sent.
    ///
    /// The document is only rendered when none is attached yet. If delivery
    /// fails the status is left alone, so the send can simply be retried.
    /// Sending an invoice that is already sent or paid re-delivers it
    /// without a status change.
    pub async fn send_invoice(&self, id: Uuid) -> Result<Invoice> {
        let (invoice, recipient, document) = {
            let mut tx = self.store.begin().await?;
            let invoice = require_invoice(&mut tx, id).await?;
            let client = require_client(&mut tx, invoice.client_id).await?;
            let recipient = bill_to_contact(&mut tx, &client, invoice.payee_id).await?;
            let sessions = tx.sessions_for_invoice(id).await?;
            let document = self.invoice_document(&invoice, &client, recipient.clone(), &sessions)?;
            (invoice, recipient, document)
        };

        let attachment = match invoice.document.clone() {
            Some(attached) => attached,
            None => {
                let rendered = self.render(invoice.document_filename(), &document).await?;
                let mut tx = self.store.begin().await?;
                let mut current = require_invoice(&mut tx, id).await?;
                match current.document.clone() {
                    Some(attached) => attached,
                    None => {
                        current.attach(rendered.clone());
                        current.updated_at = self.now();
                        tx.update_invoice(&current).await?;
                        tx.commit().await?;
                        info!("Attached {} to invoice #{}", rendered.filename, current.number);
                        rendered
                    }
                }
            }
        };

        let subject = format!("Invoice #{} from {}", invoice.number, self.settings.sender_name);
        let mut notification = self.notification(&recipient, subject, &document);
        notification.attachment = Some(attachment.clone());
        self.deliver(notification).await?;

        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(&mut tx, id).await?;
        if !invoice.is_created() {
            info!("Re-sent invoice #{} ({})", invoice.number, invoice.status);
            return Ok(invoice);
        }
        if invoice.document.as_ref() != Some(&attachment) {
            warn!("Invoice #{} changed while it was being sent", invoice.number);
            return Err(BillingError::invalid("document", "changed while being sent; send it again"));
        }

        transition(invoice.status, InvoiceStatus::Sent)?;
        let claimed = tx.sessions_for_invoice(id).await?;
        recompute_amount(&mut invoice, &claimed)?;
        invoice.status = InvoiceStatus::Sent;
        invoice.updated_at = self.now();
        tx.update_invoice(&invoice).await?;
        tx.commit().await?;

        info!("Invoice #{} sent to {}", invoice.number, recipient.email);
        Ok(invoice)
    }

    /// Deletes a created invoice. Its sessions are released, never deleted.
    pub async fn delete_invoice(&self, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let invoice = require_invoice(&mut tx, id).await?;

        if !invoice.is_created() {
            warn!("Refused to delete invoice #{} ({})", invoice.number, invoice.status);
            return Err(BillingError::NotDestroyable {
                entity: "invoice",
                id,
                reason: "cannot delete once invoice sent or paid".to_string(),
            });
        }

        let claimed = tx.sessions_for_invoice(id).await?;
        let released = claimed.len();
        Self::release(&mut tx, claimed, self.now()).await?;
        tx.delete_invoice(id).await?;
        tx.commit().await?;

        info!("Deleted invoice #{}, released {} sessions", invoice.number, released);
        Ok(())
    }

    pub async fn invoice(&self, id: Uuid) -> Result<Invoice> {
        let mut tx = self.store.begin().await?;
        require_invoice(&mut tx, id).await
    }

    pub async fn invoice_sessions(&self, id: Uuid) -> Result<Vec<ClientSession>> {
        let mut tx = self.store.begin().await?;
        require_invoice(&mut tx, id).await?;
        tx.sessions_for_invoice(id).await
    }

    pub async fn invoices_for_client(&self, client_id: Uuid) -> Result<Vec<Invoice>> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, client_id).await?;
        tx.invoices_for_client(client_id).await
    }

    /// Every invoice, newest first, with its credit notes.
    pub async fn list_billings(&self) -> Result<Vec<BillingEntry>> {
        let mut tx = self.store.begin().await?;
        let invoices = tx.invoices().await?;
        let mut entries = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            let credit_notes = tx.credit_notes_for_invoice(invoice.id).await?;
            entries.push(BillingEntry {
                invoice,
                credit_notes,
            });
        }
        Ok(entries)
    }
}
