use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::double_option;
use crate::models::money::{Money, MoneyError};

/// One billable unit of work for a client.
///
/// `unit_rate` is a snapshot of the client's rate when the session was
/// recorded and is never re-derived from the rate history afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub id: Uuid,
    pub client_id: Uuid,

    /// Invoice that has claimed this session, if any
    pub invoice_id: Option<Uuid>,

    pub session_date: NaiveDate,

    /// Billable quantity, always positive
    pub units: Decimal,

    pub unit_rate: Money,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientSession {
    /// `unit_rate * units`, rounded onto the minor unit.
    pub fn fee(&self) -> Result<Money, MoneyError> {
        self.unit_rate.times(self.units)
    }

    pub fn is_invoiced(&self) -> bool {
        self.invoice_id.is_some()
    }
}

/// Session creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSession {
    pub client_id: Uuid,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub units: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Session update request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSession {
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub units: Option<Decimal>,
    #[serde(default)]
    pub unit_rate: Option<Money>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

impl UpdateSession {
    /// Whether the update can change the session's fee.
    pub fn touches_fee(&self) -> bool {
        self.units.is_some() || self.unit_rate.is_some()
    }
}
