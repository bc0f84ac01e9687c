use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::rate_history::RateHistory;
use crate::billing::sessions::{ensure_destroyable, ensure_updatable, validate_units};
use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::client_session::{CreateSession, UpdateSession};
use crate::models::{ClientSession, Invoice};
use crate::service::{require_client, require_session, save_invoice, BillingService};
use crate::store::{BillingStore, StoreTx};

impl<S: BillingStore> BillingService<S> {
    async fn claiming_invoice(tx: &mut S::Tx, session: &ClientSession) -> Result<Option<Invoice>> {
        match session.invoice_id {
            Some(invoice_id) => tx.invoice(invoice_id).await,
            None => Ok(None),
        }
    }

    /// Records a session at the client's current rate.
    ///
    /// Units default to one and the date to today.
    pub async fn create_session(&self, input: CreateSession) -> Result<ClientSession> {
        let mut tx = self.store.begin().await?;
        let client = require_client(&mut tx, input.client_id).await?;
        let mut errors = ValidationErrors::new();

        let units = input.units.unwrap_or(Decimal::ONE);
        validate_units(units, &mut errors);

        let history = RateHistory::new(client.id, tx.fees(client.id).await?);
        let Some(unit_rate) = history.current_rate() else {
            errors.add("unit_rate", "client has no current rate");
            return Err(BillingError::Validation(errors));
        };
        errors.into_result()?;

        let now = self.now();
        let session = ClientSession {
            id: Uuid::new_v4(),
            client_id: client.id,
            invoice_id: None,
            session_date: input.session_date.unwrap_or_else(|| self.today()),
            units,
            unit_rate,
            description: input.description,
            created_at: now,
            updated_at: now,
        };

        tx.insert_session(&session).await?;
        tx.commit().await?;

        info!(
            "Recorded session {} for client {} ({} x {})",
            session.id,
            client.summary(),
            session.units,
            session.unit_rate
        );
        Ok(session)
    }

    /// Edits a session while it is unclaimed or its invoice is still
    /// `created`. The claiming invoice is re-summed and loses any document
    /// rendered before the edit.
    pub async fn update_session(&self, id: Uuid, input: UpdateSession) -> Result<ClientSession> {
        let mut tx = self.store.begin().await?;
        let mut session = require_session(&mut tx, id).await?;
        let invoice = Self::claiming_invoice(&mut tx, &session).await?;

        if let Err(e) = ensure_updatable(&session, invoice.as_ref()) {
            warn!("Refused to update session {}: {}", id, e);
            return Err(e);
        }

        let touches_fee = input.touches_fee();
        let mut errors = ValidationErrors::new();
        if let Some(date) = input.session_date {
            session.session_date = date;
        }
        if let Some(units) = input.units {
            validate_units(units, &mut errors);
            session.units = units;
        }
        if let Some(rate) = input.unit_rate {
            self.check_currency("unit_rate", rate, &mut errors);
            if rate.is_negative() {
                errors.add("unit_rate", "cannot be negative");
            }
            session.unit_rate = rate;
        }
        if let Some(description) = input.description {
            session.description = description;
        }
        errors.into_result()?;

        let now = self.now();
        session.updated_at = now;
        tx.update_session(&session).await?;

        if let Some(mut invoice) = invoice {
            save_invoice(&mut tx, &mut invoice, now).await?;
            if touches_fee {
                info!(
                    "Invoice #{} re-summed to {} after session {} changed",
                    invoice.number, invoice.amount, id
                );
            }
        }
        tx.commit().await?;

        info!("Updated session {}", id);
        Ok(session)
    }

    /// Deletes a session under the same guard as updates. A created invoice
    /// that claimed it is re-summed.
    pub async fn delete_session(&self, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let session = require_session(&mut tx, id).await?;
        let invoice = Self::claiming_invoice(&mut tx, &session).await?;

        if let Err(e) = ensure_destroyable(&session, invoice.as_ref()) {
            warn!("Refused to delete session {}: {}", id, e);
            return Err(e);
        }

        tx.delete_session(id).await?;
        if let Some(mut invoice) = invoice {
            save_invoice(&mut tx, &mut invoice, self.now()).await?;
        }
        tx.commit().await?;

        info!("Deleted session {}", id);
        Ok(())
    }

    pub async fn session(&self, id: Uuid) -> Result<ClientSession> {
        let mut tx = self.store.begin().await?;
        require_session(&mut tx, id).await
    }

    pub async fn sessions_for_client(&self, client_id: Uuid) -> Result<Vec<ClientSession>> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, client_id).await?;
        tx.sessions_for_client(client_id).await
    }
}
