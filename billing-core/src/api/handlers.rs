use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::Extension;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ClientsQuery, InvoicesQuery, SessionIds, UninvoicedResponse};
use crate::api::AppState;
use crate::auth::CurrentOperator;
use crate::billing::Deletability;
use crate::models::client::{CreateClient, CreatePayee, UpdateClient, UpdatePayee};
use crate::models::client_session::{CreateSession, UpdateSession};
use crate::models::credit_note::{CreateCreditNote, UpdateCreditNote};
use crate::models::fee::AmendFee;
use crate::models::invoice::{CreateInvoice, UpdateInvoice};
use crate::models::message::{AssignedMessage, CreateMessage, UpdateMessage};
use crate::models::{
    AssignmentTarget, Client, ClientSession, CreditNote, Fee, Invoice, Message, Payee,
};
use crate::service::{BillingEntry, ClientRate};
use crate::store::BillingStore;

type ApiResult<T> = Result<Json<T>, ApiError>;
type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

/// Health check endpoint.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "billing-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Database health check endpoint.
pub async fn db_health_check<S: BillingStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<Value>, StatusCode> {
    state.billing.store().ping().await.map_err(|e| {
        error!("Database health check failed: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(json!({
        "status": "ok",
        "database": "connected"
    })))
}

// Payees

pub async fn list_payees<S: BillingStore>(State(state): State<AppState<S>>) -> ApiResult<Vec<Payee>> {
    Ok(Json(state.billing.payees().await?))
}

pub async fn create_payee<S: BillingStore>(
    State(state): State<AppState<S>>,
    Json(input): Json<CreatePayee>,
) -> Created<Payee> {
    let payee = state.billing.create_payee(input).await?;
    Ok((StatusCode::CREATED, Json(payee)))
}

pub async fn get_payee<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Payee> {
    Ok(Json(state.billing.payee(id).await?))
}

pub async fn update_payee<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePayee>,
) -> ApiResult<Payee> {
    Ok(Json(state.billing.update_payee(id, input).await?))
}

// Clients

pub async fn list_clients<S: BillingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<ClientsQuery>,
) -> ApiResult<Vec<Client>> {
    Ok(Json(state.billing.clients(query.active_only).await?))
}

pub async fn create_client<S: BillingStore>(
    State(state): State<AppState<S>>,
    Json(input): Json<CreateClient>,
) -> Created<Client> {
    let client = state.billing.create_client(input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Client> {
    Ok(Json(state.billing.client(id).await?))
}

pub async fn update_client<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateClient>,
) -> ApiResult<Client> {
    Ok(Json(state.billing.update_client(id, input).await?))
}

pub async fn delete_client<S: BillingStore>(
    State(state): State<AppState<S>>,
    Extension(operator): Extension<CurrentOperator>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    info!("Operator {} deleting client {}", operator.0, id);
    state.billing.delete_client(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn client_rate<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Option<ClientRate>> {
    Ok(Json(state.billing.current_rate(id).await?))
}

pub async fn client_fees<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Fee>> {
    Ok(Json(state.billing.fee_history(id).await?))
}

pub async fn amend_fee<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path((id, fee_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<AmendFee>,
) -> ApiResult<Vec<Fee>> {
    Ok(Json(state.billing.amend_fee(id, fee_id, input).await?))
}

pub async fn client_deletable<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deletability> {
    Ok(Json(state.billing.deletable(id).await?))
}

pub async fn uninvoiced_sessions<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<UninvoicedResponse> {
    let sessions = state.billing.uninvoiced_sessions(id).await?;
    let amount = state.billing.uninvoiced_amount(id).await?;
    Ok(Json(UninvoicedResponse { sessions, amount }))
}

pub async fn client_messages<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(state.billing.active_messages_for(id).await?))
}

// Sessions

pub async fn create_session<S: BillingStore>(
    State(state): State<AppState<S>>,
    Json(input): Json<CreateSession>,
) -> Created<ClientSession> {
    let session = state.billing.create_session(input).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn update_session<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSession>,
) -> ApiResult<ClientSession> {
    Ok(Json(state.billing.update_session(id, input).await?))
}

pub async fn delete_session<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.billing.delete_session(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Invoices

pub async fn list_invoices<S: BillingStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<InvoicesQuery>,
) -> ApiResult<Vec<Invoice>> {
    let invoices = match query.client_id {
        Some(client_id) => state.billing.invoices_for_client(client_id).await?,
        None => state
            .billing
            .list_billings()
            .await?
            .into_iter()
            .map(|entry| entry.invoice)
            .collect(),
    };
    Ok(Json(invoices))
}

pub async fn create_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Json(input): Json<CreateInvoice>,
) -> Created<Invoice> {
    let invoice = state.billing.create_invoice(input).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invoice> {
    Ok(Json(state.billing.invoice(id).await?))
}

pub async fn update_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateInvoice>,
) -> ApiResult<Invoice> {
    Ok(Json(state.billing.update_invoice(id, input).await?))
}

pub async fn delete_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Extension(operator): Extension<CurrentOperator>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    info!("Operator {} deleting invoice {}", operator.0, id);
    state.billing.delete_invoice(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn claim_sessions<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SessionIds>,
) -> ApiResult<Invoice> {
    Ok(Json(state.billing.claim_sessions(id, &body.session_ids).await?))
}

pub async fn release_sessions<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(body): Json<SessionIds>,
) -> ApiResult<Invoice> {
    Ok(Json(state.billing.release_sessions(id, &body.session_ids).await?))
}

pub async fn send_invoice<S: BillingStore>(
    State(state): State<AppState<S>>,
    Extension(operator): Extension<CurrentOperator>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invoice> {
    info!("Operator {} sending invoice {}", operator.0, id);
    Ok(Json(state.billing.send_invoice(id).await?))
}

pub async fn mark_invoice_paid<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Invoice> {
    Ok(Json(state.billing.mark_invoice_paid(id).await?))
}

pub async fn create_credit_note<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(invoice_id): Path<Uuid>,
    Json(input): Json<CreateCreditNote>,
) -> Created<CreditNote> {
    let note = state.billing.create_credit_note(invoice_id, input).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

// Credit notes

pub async fn get_credit_note<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<CreditNote> {
    Ok(Json(state.billing.credit_note(id).await?))
}

pub async fn update_credit_note<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCreditNote>,
) -> ApiResult<CreditNote> {
    Ok(Json(state.billing.update_credit_note(id, input).await?))
}

pub async fn delete_credit_note<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.billing.delete_credit_note(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_credit_note<S: BillingStore>(
    State(state): State<AppState<S>>,
    Extension(operator): Extension<CurrentOperator>,
    Path(id): Path<Uuid>,
) -> ApiResult<CreditNote> {
    info!("Operator {} sending credit note {}", operator.0, id);
    Ok(Json(state.billing.send_credit_note(id).await?))
}

pub async fn mark_credit_note_applied<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> ApiResult<CreditNote> {
    Ok(Json(state.billing.mark_credit_note_applied(id).await?))
}

// Messages

pub async fn list_messages<S: BillingStore>(
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<AssignedMessage>> {
    Ok(Json(state.billing.messages().await?))
}

pub async fn create_message<S: BillingStore>(
    State(state): State<AppState<S>>,
    Json(input): Json<CreateMessage>,
) -> Created<AssignedMessage> {
    let message = state.billing.create_message(input).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn update_message<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateMessage>,
) -> ApiResult<AssignedMessage> {
    Ok(Json(state.billing.update_message(id, input).await?))
}

pub async fn delete_message<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.billing.delete_message(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_assignment<S: BillingStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(target): Json<AssignmentTarget>,
) -> ApiResult<AssignedMessage> {
    Ok(Json(state.billing.set_assignment(id, target).await?))
}

// Overview

pub async fn list_billings<S: BillingStore>(
    State(state): State<AppState<S>>,
) -> ApiResult<Vec<BillingEntry>> {
    Ok(Json(state.billing.list_billings().await?))
}
