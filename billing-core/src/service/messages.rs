use std::collections::BTreeSet;

use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::messages::{active_for, plan_assignment};
use crate::error::{BillingError, Result, ValidationErrors};
use crate::models::message::{AssignedMessage, CreateMessage, UpdateMessage};
use crate::models::{AssignmentTarget, Message};
use crate::service::{require_client, require_message, BillingService};
use crate::store::{BillingStore, StoreTx};

impl<S: BillingStore> BillingService<S> {
    async fn check_message(
        tx: &mut S::Tx,
        message: &Message,
        target: Option<&AssignmentTarget>,
        errors: &mut ValidationErrors,
    ) -> Result<()> {
        if message.text.trim().is_empty() {
            errors.add("text", "can't be blank");
        }
        if let (Some(from), Some(until)) = (message.from_date, message.until_date) {
            if until < from {
                errors.add("until_date", "must be on or after the from date");
            }
        }
        if let Some(AssignmentTarget::SpecificClients(clients)) = target {
            for &client_id in clients {
                if tx.client(client_id).await?.is_none() {
                    errors.add("client_ids", format!("{} does not exist", client_id));
                }
            }
        }
        Ok(())
    }

    /// Brings a message's assignment rows in line with `target`.
    async fn reconcile_assignment(
        tx: &mut S::Tx,
        message_id: Uuid,
        target: &AssignmentTarget,
    ) -> Result<()> {
        let current = tx.assignments(message_id).await?;
        let plan = plan_assignment(message_id, &current, target);
        if plan.is_empty() {
            return Ok(());
        }
        for row in &plan.delete {
            tx.delete_assignment(row).await?;
        }
        for row in &plan.insert {
            tx.insert_assignment(row).await?;
        }
        info!(
            "Message {} assignment: +{} -{}",
            message_id,
            plan.insert.len(),
            plan.delete.len()
        );
        Ok(())
    }

    async fn assigned(tx: &mut S::Tx, message: Message) -> Result<AssignedMessage> {
        let rows = tx.assignments(message.id).await?;
        let target = AssignmentTarget::from_assignments(&rows);
        Ok(AssignedMessage { message, target })
    }

    pub async fn create_message(&self, input: CreateMessage) -> Result<AssignedMessage> {
        let mut tx = self.store.begin().await?;
        let now = self.now();
        let message = Message {
            id: Uuid::new_v4(),
            text: input.text,
            from_date: input.from_date,
            until_date: input.until_date,
            created_at: now,
            updated_at: now,
        };

        let mut errors = ValidationErrors::new();
        Self::check_message(&mut tx, &message, Some(&input.target), &mut errors).await?;
        if !errors.is_empty() {
            warn!("Rejected new message: {}", errors);
            return Err(BillingError::Validation(errors));
        }

        tx.insert_message(&message).await?;
        Self::reconcile_assignment(&mut tx, message.id, &input.target).await?;
        tx.commit().await?;

        info!("Created message {}", message.id);
        Ok(AssignedMessage {
            message,
            target: input.target,
        })
    }

    pub async fn update_message(&self, id: Uuid, input: UpdateMessage) -> Result<AssignedMessage> {
        let mut tx = self.store.begin().await?;
        let mut message = require_message(&mut tx, id).await?;

        if let Some(text) = input.text {
            message.text = text;
        }
        if let Some(from) = input.from_date {
            message.from_date = from;
        }
        if let Some(until) = input.until_date {
            message.until_date = until;
        }

        let mut errors = ValidationErrors::new();
        Self::check_message(&mut tx, &message, input.target.as_ref(), &mut errors).await?;
        if !errors.is_empty() {
            warn!("Rejected update to message {}: {}", id, errors);
            return Err(BillingError::Validation(errors));
        }

        message.updated_at = self.now();
        tx.update_message(&message).await?;
        if let Some(target) = &input.target {
            Self::reconcile_assignment(&mut tx, id, target).await?;
        }
        let assigned = Self::assigned(&mut tx, message).await?;
        tx.commit().await?;

        info!("Updated message {}", id);
        Ok(assigned)
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<()> {
        let mut tx = self.store.begin().await?;
        require_message(&mut tx, id).await?;
        tx.delete_message(id).await?;
        tx.commit().await?;

        info!("Deleted message {}", id);
        Ok(())
    }

    /// Replaces who a message is shown to.
    pub async fn set_assignment(&self, id: Uuid, target: AssignmentTarget) -> Result<AssignedMessage> {
        let mut tx = self.store.begin().await?;
        let message = require_message(&mut tx, id).await?;

        let mut errors = ValidationErrors::new();
        Self::check_message(&mut tx, &message, Some(&target), &mut errors).await?;
        errors.into_result()?;

        Self::reconcile_assignment(&mut tx, id, &target).await?;
        tx.commit().await?;

        Ok(AssignedMessage { message, target })
    }

    pub async fn assign_to_all(&self, id: Uuid) -> Result<AssignedMessage> {
        self.set_assignment(id, AssignmentTarget::AllClients).await
    }

    pub async fn assign_to_clients(&self, id: Uuid, client_ids: &[Uuid]) -> Result<AssignedMessage> {
        let clients: BTreeSet<Uuid> = client_ids.iter().copied().collect();
        self.set_assignment(id, AssignmentTarget::SpecificClients(clients))
            .await
    }

    pub async fn message(&self, id: Uuid) -> Result<AssignedMessage> {
        let mut tx = self.store.begin().await?;
        let message = require_message(&mut tx, id).await?;
        Self::assigned(&mut tx, message).await
    }

    pub async fn messages(&self) -> Result<Vec<AssignedMessage>> {
        let mut tx = self.store.begin().await?;
        let messages = tx.messages().await?;
        let mut assigned = Vec::with_capacity(messages.len());
        for message in messages {
            assigned.push(Self::assigned(&mut tx, message).await?);
        }
        Ok(assigned)
    }

    /// Messages shown to the client today, oldest first.
    pub async fn active_messages_for(&self, client_id: Uuid) -> Result<Vec<Message>> {
        let mut tx = self.store.begin().await?;
        require_client(&mut tx, client_id).await?;
        let global = tx.global_messages().await?;
        let specific = tx.messages_for_client(client_id).await?;
        Ok(active_for(global, specific, self.today()))
    }
}
