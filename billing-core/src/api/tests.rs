use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{create_router, AppState};
use crate::auth::JwtAuth;
use crate::clock::{Clock, FixedClock};
use crate::config::BillingSettings;
use crate::service::BillingService;
use crate::store::MemoryStore;

const SECRET: &str = "test-secret";

fn app() -> (Router, String) {
    let clock = FixedClock::on(NaiveDate::from_ymd_opt(2025, 6, 19).unwrap());
    let billing = BillingService::new(MemoryStore::new(), BillingSettings::default())
        .with_clock(Arc::new(clock));
    let auth = JwtAuth::new(SECRET);
    let token = auth
        .issue("reception", clock.now() + Duration::days(3650))
        .unwrap();
    (create_router(AppState::new(billing, auth)), token)
}

async fn call(app: &Router, token: &str, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn client_body() -> Value {
    json!({
        "name": "Jane Smith",
        "email": "jane@example.com",
        "address1": "1 High Street",
        "town": "Bath",
        "postcode": "BA1 1AA",
        "new_rate": { "minor_units": 6000, "currency": "GBP" },
        "new_rate_from": "2025-01-01"
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let (app, _) = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_requires_token() {
    let (app, _) = app();

    let missing = app
        .clone()
        .oneshot(Request::builder().uri("/api/clients").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, "not-a-token", Method::GET, "/api/clients", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invoice_flow_over_http() {
    let (app, token) = app();

    let (status, client) = call(&app, &token, Method::POST, "/api/clients", Some(client_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    let client_id = client["id"].as_str().unwrap().to_string();

    let mut session_ids = Vec::new();
    for day in ["2025-06-02", "2025-06-09", "2025-06-16"] {
        let (status, session) = call(
            &app,
            &token,
            Method::POST,
            "/api/sessions",
            Some(json!({ "client_id": client_id, "session_date": day })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        session_ids.push(session["id"].as_str().unwrap().to_string());
    }

    let (status, invoice) = call(
        &app,
        &token,
        Method::POST,
        "/api/invoices",
        Some(json!({ "client_id": client_id, "session_ids": session_ids })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["amount"]["minor_units"], 18000);
    assert_eq!(invoice["status"], "created");
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let (status, sent) = call(
        &app,
        &token,
        Method::POST,
        &format!("/api/invoices/{}/send", invoice_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["status"], "sent");
    assert_eq!(sent["document"]["filename"], "invoice_1.txt");

    let (status, body) = call(
        &app,
        &token,
        Method::PATCH,
        &format!("/api/sessions/{}", session_ids[0]),
        Some(json!({ "units": "4.0" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("cannot change once invoice sent or paid"));

    let (status, body) = call(
        &app,
        &token,
        Method::POST,
        &format!("/api/invoices/{}/credit-notes", invoice_id),
        Some(json!({
            "amount": { "minor_units": 20000, "currency": "GBP" },
            "reason": "Overcharged"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["fields"]["amount"][0], "cannot exceed invoice amount of £180.00");

    let (status, note) = call(
        &app,
        &token,
        Method::POST,
        &format!("/api/invoices/{}/credit-notes", invoice_id),
        Some(json!({
            "amount": { "minor_units": 5000, "currency": "GBP" },
            "reason": "Missed session"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["amount"]["minor_units"], -5000);

    let (status, billings) = call(&app, &token, Method::GET, "/api/billings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(billings[0]["credit_notes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_illegal_transition_is_a_status_field_error() {
    let (app, token) = app();

    let (_, client) = call(&app, &token, Method::POST, "/api/clients", Some(client_body())).await;
    let (_, invoice) = call(
        &app,
        &token,
        Method::POST,
        "/api/invoices",
        Some(json!({ "client_id": client["id"] })),
    )
    .await;
    let uri = format!("/api/invoices/{}", invoice["id"].as_str().unwrap());

    let (status, _) = call(&app, &token, Method::PATCH, &uri, Some(json!({ "status": "paid" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, &token, Method::PATCH, &uri, Some(json!({ "status": "sent" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["fields"]["status"][0],
        "can only be marked as 'paid' after being 'sent'"
    );
}

#[tokio::test]
async fn test_active_client_cannot_be_deleted() {
    let (app, token) = app();

    let (_, client) = call(&app, &token, Method::POST, "/api/clients", Some(client_body())).await;
    let id = client["id"].as_str().unwrap();

    let (status, body) = call(&app, &token, Method::GET, &format!("/api/clients/{}/deletable", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "deletable": false, "reason": "client is active" }));

    let (status, _) = call(&app, &token, Method::DELETE, &format!("/api/clients/{}", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_invoice_is_not_found() {
    let (app, token) = app();
    let (status, _) = call(
        &app,
        &token,
        Method::GET,
        &format!("/api/invoices/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
