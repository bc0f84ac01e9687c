use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::crediting::{self, normalize_amount};
use crate::billing::lifecycle::{into_outcome, review_edit, transition, Lifecycle};
use crate::delivery::BillingDocument;
use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::credit_note::{CreateCreditNote, UpdateCreditNote};
use crate::models::{Billing, Client, Contact, CreditNote, CreditNoteStatus, Invoice};
use crate::service::{
    bill_to_contact, discard_document, require_client, require_credit_note, require_invoice, BillingService,
};
use crate::store::{BillingStore, StoreTx};

impl<S: BillingStore> BillingService<S> {
    /// Raises a credit note against a sent or paid invoice.
    ///
    /// Client and payee are copied from the invoice; a positive amount is
    /// stored negative.
    pub async fn create_credit_note(&self, invoice_id: Uuid, input: CreateCreditNote) -> Result<CreditNote> {
        let mut tx = self.store.begin().await?;
        let invoice = require_invoice(&mut tx, invoice_id).await?;

        let now = self.now();
        let note = CreditNote {
            id: Uuid::new_v4(),
            invoice_id,
            invoice_number: invoice.number,
            client_id: invoice.client_id,
            payee_id: invoice.payee_id,
            date: input.date.unwrap_or_else(|| self.today()),
            amount: normalize_amount(input.amount),
            reason: input.reason,
            text: input.text.unwrap_or_default(),
            status: CreditNoteStatus::initial(),
            document: None,
            created_at: now,
            updated_at: now,
        };

        let mut errors = ValidationErrors::new();
        crediting::validate(&note, &invoice, &mut errors);
        if !errors.is_empty() {
            warn!("Rejected credit note for invoice #{}: {}", invoice.number, errors);
            return Err(BillingError::Validation(errors));
        }

        tx.insert_credit_note(&note).await?;
        tx.commit().await?;

        info!("Raised {} of {}", note.summary(""), note.amount);
        Ok(note)
    }

    /// Applies a credit note form, re-checking it against its invoice.
    pub async fn update_credit_note(&self, id: Uuid, input: UpdateCreditNote) -> Result<CreditNote> {
        let mut tx = self.store.begin().await?;
        let mut note = require_credit_note(&mut tx, id).await?;
        let invoice = require_invoice(&mut tx, note.invoice_id).await?;
        let was = note.status;

        let amount = input.amount.map(normalize_amount);
        let mut changed = Vec::new();
        if amount.map_or(false, |amount| amount != note.amount) {
            changed.push("amount");
        }
        if input.reason.as_ref().map_or(false, |reason| *reason != note.reason) {
            changed.push("reason");
        }
        if input.date.map_or(false, |date| date != note.date) {
            changed.push("date");
        }
        if input.text.as_ref().map_or(false, |text| *text != note.text) {
            changed.push("text");
        }

        let mut errors = ValidationErrors::new();
        review_edit(was, input.status, &changed, &mut errors);

        if let Some(amount) = amount {
            note.amount = amount;
        }
        if let Some(reason) = input.reason {
            note.reason = reason;
        }
        if let Some(date) = input.date {
            note.date = date;
        }
        if let Some(text) = input.text {
            note.text = text;
        }
        crediting::validate(&note, &invoice, &mut errors);

        if let Err(e) = into_outcome(was, input.status, errors) {
            warn!("Rejected update to credit note {}: {}", id, e);
            return Err(e);
        }

        if note.is_created() && !changed.is_empty() {
            discard_document(&mut note);
        }
        if let Some(status) = input.status {
            note.status = status;
        }
        note.updated_at = self.now();
        tx.update_credit_note(&note).await?;
        tx.commit().await?;

        if note.status != was {
            info!("Credit note {} moved from {} to {}", id, was, note.status);
        }
        info!("Updated credit note {}", id);
        Ok(note)
    }

    async fn move_credit_note(&self, id: Uuid, to: CreditNoteStatus) -> Result<CreditNote> {
        let mut tx = self.store.begin().await?;
        let mut note = require_credit_note(&mut tx, id).await?;
        let invoice = require_invoice(&mut tx, note.invoice_id).await?;
        let was = note.status;

        if let Err(e) = transition(was, to) {
            warn!("Refused to move credit note {} from {} to {}", id, was, to);
            return Err(e);
        }
        let mut errors = ValidationErrors::new();
        crediting::validate(&note, &invoice, &mut errors);
        errors.into_result()?;

        if was == to {
            return Ok(note);
        }

        note.status = to;
        note.updated_at = self.now();
        tx.update_credit_note(&note).await?;
        tx.commit().await?;

        info!("Credit note {} moved from {} to {}", id, was, to);
        Ok(note)
    }

    /// Marks the credit note sent without delivering it.
    pub async fn mark_credit_note_sent(&self, id: Uuid) -> Result<CreditNote> {
        self.move_credit_note(id, CreditNoteStatus::Sent).await
    }

    /// Records the credit as reconciled against the client's balance.
    pub async fn mark_credit_note_applied(&self, id: Uuid) -> Result<CreditNote> {
        self.move_credit_note(id, CreditNoteStatus::Applied).await
    }

    fn credit_note_document(
        note: &CreditNote,
        client: &Client,
        bill_to: Contact,
    ) -> BillingDocument {
        BillingDocument {
            kind: CreditNote::KIND,
            title: note.summary(client.name()),
            date: note.date,
            amount: note.amount,
            bill_to,
            client_name: client.name().to_string(),
            payee_reference: client.payee_reference.clone(),
            lines: Vec::new(),
            reason: Some(note.reason.clone()),
            text: note.text.clone(),
        }
    }

    /// Renders, attaches and emails a created credit note, then marks it
    /// sent. A delivery failure leaves it created.
    pub async fn send_credit_note(&self, id: Uuid) -> Result<CreditNote> {
        let (note, recipient, document) = {
            let mut tx = self.store.begin().await?;
            let note = require_credit_note(&mut tx, id).await?;
            if !note.is_created() {
                warn!("Refused to send credit note {} ({})", id, note.status);
                return Err(BillingError::IllegalTransition {
                    entity: CreditNoteStatus::ENTITY,
                    from: note.status.to_string(),
                    to: CreditNoteStatus::Sent.to_string(),
                    message: "can only be sent while created".to_string(),
                });
            }
            let invoice: Invoice = require_invoice(&mut tx, note.invoice_id).await?;
            let mut errors = ValidationErrors::new();
            crediting::validate(&note, &invoice, &mut errors);
            errors.into_result()?;

            let client = require_client(&mut tx, note.client_id).await?;
            let recipient = bill_to_contact(&mut tx, &client, note.payee_id).await?;
            let document = Self::credit_note_document(&note, &client, recipient.clone());
            (note, recipient, document)
        };

        let attachment = match note.document.clone() {
            Some(attached) => attached,
            None => {
                let rendered = self.render(note.document_filename(), &document).await?;
                let mut tx = self.store.begin().await?;
                let mut current = require_credit_note(&mut tx, id).await?;
                match current.document.clone() {
                    Some(attached) => attached,
                    None => {
                        current.attach(rendered.clone());
                        current.updated_at = self.now();
                        tx.update_credit_note(&current).await?;
                        tx.commit().await?;
                        info!("Attached {} to credit note {}", rendered.filename, id);
                        rendered
                    }
                }
            }
        };

        let subject = format!(
            "Credit Note for Invoice #{} from {}",
            note.invoice_number, self.settings.sender_name
        );
        let mut notification = self.notification(&recipient, subject, &document);
        notification.attachment = Some(attachment.clone());
        self.deliver(notification).await?;

        let mut tx = self.store.begin().await?;
        let mut note = require_credit_note(&mut tx, id).await?;
        transition(note.status, CreditNoteStatus::Sent)?;
        if note.is_created() && note.document.as_ref() != Some(&attachment) {
            warn!("Credit note {} changed while it was being sent", id);
            return Err(BillingError::invalid("document", "changed while being sent; send it again"));
        }
        if note.is_created() {
            note.status = CreditNoteStatus::Sent;
            note.updated_at = self.now();
            tx.update_credit_note(&note).await?;
            tx.commit().await?;
        }

        info!("Credit note {} sent to {}", id, recipient.email);
        Ok(note)
    }

    /// Deletes a credit note that has not been sent.
    pub async fn delete_credit_note(&self, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let note = require_credit_note(&mut tx, id).await?;

        if !note.is_created() {
            warn!("Refused to delete credit note {} ({})", id, note.status);
            return Err(BillingError::NotDestroyable {
                entity: "credit note",
                id,
                reason: "cannot delete once credit note sent".to_string(),
            });
        }

        tx.delete_credit_note(id).await?;
        tx.commit().await?;

        info!("Deleted credit note {}", id);
        Ok(())
    }

    pub async fn credit_note(&self, id: Uuid) -> Result<CreditNote> {
        let mut tx = self.store.begin().await?;
        require_credit_note(&mut tx, id).await
    }

    pub async fn credit_notes_for_invoice(&self, invoice_id: Uuid) -> Result<Vec<CreditNote>> {
        let mut tx = self.store.begin().await?;
        require_invoice(&mut tx, invoice_id).await?;
        tx.credit_notes_for_invoice(invoice_id).await
    }
}
