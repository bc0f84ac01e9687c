use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::contact::Contact;
use crate::models::double_option;
use crate::models::money::Money;

/// A client of the practice.
///
/// Clients are never hard-deleted while anything billable is outstanding;
/// day-to-day retirement goes through the `active` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique identifier for the client
    pub id: Uuid,

    /// Name, email and address
    #[serde(flatten)]
    pub contact: Contact,

    /// Optional salutation
    pub title: Option<String>,

    /// Whether the client is currently seen
    pub active: bool,

    /// Payee who settles this client's invoices, if not self-paying
    pub paid_by: Option<Uuid>,

    /// Reference the payee uses for this client
    pub payee_reference: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn summary(&self) -> String {
        format!("{} ({})", self.contact.name, self.id)
    }

    pub fn name(&self) -> &str {
        &self.contact.name
    }
}

/// A third party who pays on behalf of one or more clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payee {
    pub id: Uuid,

    #[serde(flatten)]
    pub contact: Contact,

    pub organisation: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payee {
    pub fn summary(&self) -> String {
        format!("{} ({})", self.contact.name, self.id)
    }
}

/// Client creation request.
///
/// `new_rate`/`new_rate_from` seed the rate history; both default when
/// omitted (configured default rate, today).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClient {
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub paid_by: Option<Uuid>,
    #[serde(default)]
    pub payee_reference: Option<String>,
    #[serde(default)]
    pub new_rate: Option<Money>,
    #[serde(default)]
    pub new_rate_from: Option<NaiveDate>,
}

/// Client update request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClient {
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default, deserialize_with = "double_option")]
    pub title: Option<Option<String>>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub paid_by: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub payee_reference: Option<Option<String>>,
    #[serde(default)]
    pub new_rate: Option<Money>,
    #[serde(default)]
    pub new_rate_from: Option<NaiveDate>,
}

/// Payee creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayee {
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(default)]
    pub organisation: Option<String>,
}

/// Payee update request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePayee {
    #[serde(default)]
    pub contact: Option<Contact>,
    #[serde(default, deserialize_with = "double_option")]
    pub organisation: Option<Option<String>>,
    #[serde(default)]
    pub active: Option<bool>,
}
