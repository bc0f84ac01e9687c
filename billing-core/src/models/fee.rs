use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::double_option;
use crate::models::money::Money;

/// The unit charge rate applying to one client over a date range.
///
/// `to == None` marks the open-ended, current entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub id: Uuid,
    pub client_id: Uuid,
    pub from: NaiveDate,
    pub to: Option<NaiveDate>,
    pub rate: Money,

    /// Whether the entry already exists in the store.
    #[serde(skip)]
    pub persisted: bool,
}

impl Fee {
    /// A new, not yet persisted, open-ended entry.
    pub fn open(client_id: Uuid, from: NaiveDate, rate: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            from,
            to: None,
            rate,
            persisted: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.to.is_none()
    }

    /// Whether `date` falls inside this entry's range.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.from <= date && self.to.map_or(true, |to| date <= to)
    }
}

/// Edit to a historical fee entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmendFee {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub to: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub rate: Option<Money>,
}
