use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::client::{CreatePayee, UpdatePayee};
use crate::models::Payee;
use crate::service::{require_payee, BillingService};
use crate::store::{BillingStore, StoreTx};

impl<S: BillingStore> BillingService<S> {
    pub async fn create_payee(&self, input: CreatePayee) -> Result<Payee> {
        let mut errors = ValidationErrors::new();
        input.contact.validate(&mut errors);
        if !errors.is_empty() {
            warn!("Rejected new payee {}: {}", input.contact.name, errors);
            return Err(BillingError::Validation(errors));
        }

        let now = self.now();
        let payee = Payee {
            id: Uuid::new_v4(),
            contact: input.contact,
            organisation: input.organisation,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.store.begin().await?;
        tx.insert_payee(&payee).await?;
        tx.commit().await?;

        info!("Created payee {}", payee.summary());
        Ok(payee)
    }

    pub async fn update_payee(&self, id: Uuid, input: UpdatePayee) -> Result<Payee> {
        let mut tx = self.store.begin().await?;
        let mut payee = require_payee(&mut tx, id).await?;

        if let Some(contact) = input.contact {
            payee.contact = contact;
        }
        if let Some(organisation) = input.organisation {
            payee.organisation = organisation;
        }
        if let Some(active) = input.active {
            payee.active = active;
        }

        let mut errors = ValidationErrors::new();
        payee.contact.validate(&mut errors);
        errors.into_result()?;

        payee.updated_at = self.now();
        tx.update_payee(&payee).await?;
        tx.commit().await?;

        info!("Updated payee {}", payee.summary());
        Ok(payee)
    }

    pub async fn payee(&self, id: Uuid) -> Result<Payee> {
        let mut tx = self.store.begin().await?;
        require_payee(&mut tx, id).await
    }

    pub async fn payees(&self) -> Result<Vec<Payee>> {
        let mut tx = self.store.begin().await?;
        tx.payees().await
    }
}
