//! JSON HTTP surface over [`BillingService`].
//!
//! Handlers are thin adapters; every rule lives in the service.

pub mod error;
pub mod handlers;
pub mod types;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{jwt_middleware, JwtAuth};
use crate::service::BillingService;
use crate::store::BillingStore;

use handlers::*;

/// Application state shared with every handler.
pub struct AppState<S: BillingStore> {
    pub billing: Arc<BillingService<S>>,
    pub auth: Arc<JwtAuth>,
}

impl<S: BillingStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            billing: Arc::clone(&self.billing),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<S: BillingStore> AppState<S> {
    pub fn new(billing: BillingService<S>, auth: JwtAuth) -> Self {
        Self {
            billing: Arc::new(billing),
            auth: Arc::new(auth),
        }
    }
}

fn api_routes<S: BillingStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/payees", get(list_payees::<S>).post(create_payee::<S>))
        .route("/payees/:id", get(get_payee::<S>).patch(update_payee::<S>))
        .route("/clients", get(list_clients::<S>).post(create_client::<S>))
        .route(
            "/clients/:id",
            get(get_client::<S>)
                .patch(update_client::<S>)
                .delete(delete_client::<S>),
        )
        .route("/clients/:id/rate", get(client_rate::<S>))
        .route("/clients/:id/fees", get(client_fees::<S>))
        .route("/clients/:id/fees/:fee_id", patch(amend_fee::<S>))
        .route("/clients/:id/deletable", get(client_deletable::<S>))
        .route("/clients/:id/sessions/uninvoiced", get(uninvoiced_sessions::<S>))
        .route("/clients/:id/messages", get(client_messages::<S>))
        .route("/sessions", post(create_session::<S>))
        .route(
            "/sessions/:id",
            patch(update_session::<S>).delete(delete_session::<S>),
        )
        .route("/invoices", get(list_invoices::<S>).post(create_invoice::<S>))
        .route(
            "/invoices/:id",
            get(get_invoice::<S>)
                .patch(update_invoice::<S>)
                .delete(delete_invoice::<S>),
        )
        .route("/invoices/:id/claim", post(claim_sessions::<S>))
        .route("/invoices/:id/release", post(release_sessions::<S>))
        .route("/invoices/:id/send", post(send_invoice::<S>))
        .route("/invoices/:id/paid", post(mark_invoice_paid::<S>))
        .route("/invoices/:id/credit-notes", post(create_credit_note::<S>))
        .route(
            "/credit-notes/:id",
            get(get_credit_note::<S>)
                .patch(update_credit_note::<S>)
                .delete(delete_credit_note::<S>),
        )
        .route("/credit-notes/:id/send", post(send_credit_note::<S>))
        .route("/credit-notes/:id/applied", post(mark_credit_note_applied::<S>))
        .route("/messages", get(list_messages::<S>).post(create_message::<S>))
        .route(
            "/messages/:id",
            patch(update_message::<S>).delete(delete_message::<S>),
        )
        .route("/messages/:id/assignment", put(set_assignment::<S>))
        .route("/billings", get(list_billings::<S>))
}

/// Creates the main application router.
///
/// `/health` is public; everything else requires an operator token.
pub fn create_router<S: BillingStore>(state: AppState<S>) -> Router {
    let protected = Router::new()
        .route("/health/db", get(db_health_check::<S>))
        .nest("/api", api_routes::<S>())
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            jwt_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
