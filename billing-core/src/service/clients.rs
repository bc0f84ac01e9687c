use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::eligibility::{deletability, deletion_blocker, Deletability};
use crate::billing::rate_history::{RateChange, RateHistory};
use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::client::{CreateClient, UpdateClient};
use crate::models::fee::AmendFee;
use crate::models::{Client, ClientSession, Fee, Money};
use crate::service::{check_payee_exists, require_client, BillingService};
use crate::store::{BillingStore, StoreTx};

/// A client's open rate and the day it took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClientRate {
    pub rate: Money,
    pub since: NaiveDate,
}

impl<S: BillingStore> BillingService<S> {
    fn check_rate(&self, field: &str, rate: Money, errors: &mut ValidationErrors) {
        self.check_currency(field, rate, errors);
        if rate.is_negative() {
            errors.add(field, "cannot be negative");
        }
    }

    /// Saves every entry of a rate history that is new or changed.
    async fn save_history(tx: &mut S::Tx, before: &[Fee], history: &RateHistory) -> Result<()> {
        for fee in history.fees() {
            if !before.contains(fee) {
                tx.save_fee(fee).await?;
            }
        }
        Ok(())
    }

    /// Creates a client with an opening rate.
    ///
    /// The rate defaults to the practice rate and takes effect today unless
    /// the form says otherwise.
    pub async fn create_client(&self, input: CreateClient) -> Result<Client> {
        let mut tx = self.store.begin().await?;
        let now = self.now();
        let mut errors = ValidationErrors::new();

        input.contact.validate(&mut errors);
        check_payee_exists(&mut tx, "paid_by", input.paid_by, &mut errors).await?;

        let rate = input.new_rate.unwrap_or(self.settings.default_rate);
        let from = input.new_rate_from.unwrap_or_else(|| self.today());
        self.check_rate("new_rate", rate, &mut errors);

        let client = Client {
            id: Uuid::new_v4(),
            contact: input.contact,
            title: input.title,
            active: input.active.unwrap_or(true),
            paid_by: input.paid_by,
            payee_reference: input.payee_reference,
            created_at: now,
            updated_at: now,
        };

        let mut history = RateHistory::new(client.id, Vec::new());
        history.apply_new_rate(rate, from);
        history.validate(&mut errors);

        if !errors.is_empty() {
            warn!("Rejected new client {}: {}", client.contact.name, errors);
            return Err(BillingError::Validation(errors));
        }

        tx.insert_client(&client).await?;
        Self::save_history(&mut tx, &[], &history).await?;
        tx.commit().await?;

        info!("Created client {} at {} from {}", client.summary(), rate, from);
        Ok(client)
    }

    /// Applies a client form.
    ///
    /// `new_rate` and `new_rate_from` must be given together; when the rate
    /// differs from the current one the open entry is closed the day before
    /// `new_rate_from`.
    pub async fn update_client(&self, id: Uuid, input: UpdateClient) -> Result<Client> {
        let mut tx = self.store.begin().await?;
        let mut client = require_client(&mut tx, id).await?;
        let mut errors = ValidationErrors::new();

        if let Some(contact) = input.contact {
            client.contact = contact;
        }
        if let Some(title) = input.title {
            client.title = title;
        }
        if let Some(active) = input.active {
            client.active = active;
        }
        if let Some(paid_by) = input.paid_by {
            check_payee_exists(&mut tx, "paid_by", paid_by, &mut errors).await?;
            client.paid_by = paid_by;
        }
        if let Some(reference) = input.payee_reference {
            client.payee_reference = reference;
        }
        client.contact.validate(&mut errors);

        let before = tx.fees(id).await?;
        let mut history = RateHistory::new(id, before.clone());
        match (input.new_rate, input.new_rate_from) {
            (Some(rate), Some(from)) => {
                self.check_rate("new_rate", rate, &mut errors);
                match history.apply_new_rate(rate, from) {
                    RateChange::Unchanged => {}
                    change => info!("Rate change for client {}: {:?}", id, change),
                }
            }
            (Some(_), None) => errors.add("new_rate_from", "cannot be blank if New Rate is set"),
            (None, Some(_)) => errors.add("new_rate", "cannot be blank if New Rate From is set"),
            (None, None) => {}
        }
        history.validate(&mut errors);

        if !errors.is_empty() {
            warn!("Rejected update to client {}: {}", id, errors);
            return Err(BillingError::Validation(errors));
        }

        client.updated_at = self.now();
        tx.update_client(&client).await?;
        Self::save_history(&mut tx, &before, &history).await?;
        tx.commit().await?;

        info!("Updated client {}", client.summary());
        Ok(client)
    }

    pub async fn deactivate_client(&self, id: Uuid) -> Result<Client> {
        self.update_client(
            id,
            UpdateClient {
                active: Some(false),
                ..UpdateClient::default()
            },
        )
        .await
    }

    pub async fn client(&self, id: Uuid) -> Result<Client> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, id).await
    }

    pub async fn clients(&self, active_only: bool) -> Result<Vec<Client>> {
        let mut tx = self.store.begin().await?;
        tx.clients(active_only).await
    }

    /// Rate history ordered by start date.
    pub async fn fee_history(&self, client_id: Uuid) -> Result<Vec<Fee>> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, client_id).await?;
        tx.fees(client_id).await
    }

    /// The open-ended rate, if the client has one.
    pub async fn current_rate(&self, client_id: Uuid) -> Result<Option<ClientRate>> {
        let fees = self.fee_history(client_id).await?;
        let history = RateHistory::new(client_id, fees);
        Ok(history
            .current()
            .map(|fee| ClientRate { rate: fee.rate, since: fee.from }))
    }

    pub async fn current_rate_since(&self, client_id: Uuid) -> Result<Option<NaiveDate>> {
        Ok(self.current_rate(client_id).await?.map(|rate| rate.since))
    }

    /// Edits one historical rate entry, re-checking the whole history.
    pub async fn amend_fee(&self, client_id: Uuid, fee_id: Uuid, amendment: AmendFee) -> Result<Vec<Fee>> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, client_id).await?;

        let before = tx.fees(client_id).await?;
        let mut history = RateHistory::new(client_id, before.clone());
        history.amend(fee_id, &amendment)?;

        let mut errors = ValidationErrors::new();
        if let Some(rate) = amendment.rate {
            self.check_rate("rate", rate, &mut errors);
        }
        history.validate(&mut errors);
        if !errors.is_empty() {
            warn!("Rejected amendment to fee {}: {}", fee_id, errors);
            return Err(BillingError::Validation(errors));
        }

        Self::save_history(&mut tx, &before, &history).await?;
        tx.commit().await?;

        info!("Amended fee {} for client {}", fee_id, client_id);
        Ok(history.into_fees())
    }

    /// Sessions not yet claimed by any invoice, oldest first.
    pub async fn uninvoiced_sessions(&self, client_id: Uuid) -> Result<Vec<ClientSession>> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, client_id).await?;
        let sessions = tx.sessions_for_client(client_id).await?;
        Ok(sessions.into_iter().filter(|s| !s.is_invoiced()).collect())
    }

    pub async fn uninvoiced_amount(&self, client_id: Uuid) -> Result<Money> {
        let sessions = self.uninvoiced_sessions(client_id).await?;
        let fees = sessions
            .iter()
            .map(ClientSession::fee)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Money::sum(fees, self.settings.currency)?)
    }

    pub async fn deletable(&self, client_id: Uuid) -> Result<Deletability> {
        let mut tx = self.store.begin().await?;
        let client = require_client(&mut tx, client_id).await?;
        let sessions = tx.sessions_for_client(client_id).await?;
        let invoices = tx.invoices_for_client(client_id).await?;
        Ok(deletability(
            &client,
            &sessions,
            &invoices,
            self.today(),
            self.settings.retention_years,
        ))
    }

    /// Deletes a client and everything recorded against it.
    ///
    /// Eligibility is re-checked inside the same unit of work as the delete.
    pub async fn delete_client(&self, client_id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let client = require_client(&mut tx, client_id).await?;
        let sessions = tx.sessions_for_client(client_id).await?;
        let invoices = tx.invoices_for_client(client_id).await?;

        if let Some(blocker) = deletion_blocker(
            &client,
            &sessions,
            &invoices,
            self.today(),
            self.settings.retention_years,
        ) {
            warn!("Refused to delete client {}: {}", client.summary(), blocker.reason());
            return Err(BillingError::NotDestroyable {
                entity: "client",
                id: client_id,
                reason: blocker.reason(),
            });
        }

        tx.delete_client(client_id).await?;
        tx.commit().await?;

        info!("Deleted client {}", client.summary());
        Ok(())
    }
}
