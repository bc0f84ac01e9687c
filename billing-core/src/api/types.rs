use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ClientSession, Money};

/// Query for `GET /api/clients`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientsQuery {
    /// Only list active clients
    #[serde(default)]
    pub active_only: bool,
}

/// Query for `GET /api/invoices`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoicesQuery {
    pub client_id: Option<Uuid>,
}

/// Body for claiming or releasing sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIds {
    pub session_ids: Vec<Uuid>,
}

/// A client's unclaimed work.
#[derive(Debug, Clone, Serialize)]
pub struct UninvoicedResponse {
    pub sessions: Vec<ClientSession>,
    pub amount: Money,
}
