use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::double_option;

/// A time-windowed announcement folded into new invoice text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub from_date: Option<NaiveDate>,
    pub until_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Open-ended on either side when the bound is unset.
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.from_date.map_or(true, |from| from <= day)
            && self.until_date.map_or(true, |until| until >= day)
    }
}

/// Join row linking a message to a client. `client_id == None` is the
/// sentinel meaning "every client".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageAssignment {
    pub message_id: Uuid,
    pub client_id: Option<Uuid>,
}

/// Who a message is shown to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "client_ids", rename_all = "snake_case")]
pub enum AssignmentTarget {
    AllClients,
    SpecificClients(BTreeSet<Uuid>),
}

impl Default for AssignmentTarget {
    fn default() -> Self {
        AssignmentTarget::SpecificClients(BTreeSet::new())
    }
}

impl AssignmentTarget {
    /// Derives the target from a message's assignment rows.
    pub fn from_assignments<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a MessageAssignment>,
    {
        let mut clients = BTreeSet::new();
        for row in rows {
            match row.client_id {
                None => return AssignmentTarget::AllClients,
                Some(client) => {
                    clients.insert(client);
                }
            }
        }
        AssignmentTarget::SpecificClients(clients)
    }

    pub fn applies_to_all(&self) -> bool {
        matches!(self, AssignmentTarget::AllClients)
    }
}

/// A message together with its assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub target: AssignmentTarget,
}

/// Message creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub text: String,
    #[serde(default)]
    pub from_date: Option<NaiveDate>,
    #[serde(default)]
    pub until_date: Option<NaiveDate>,
    #[serde(default)]
    pub target: AssignmentTarget,
}

/// Message update request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub from_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub until_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub target: Option<AssignmentTarget>,
}
