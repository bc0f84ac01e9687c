use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::BillingSettings;
use crate::db;
use crate::models::client::CreateClient;
use crate::models::client_session::CreateSession;
use crate::models::credit_note::CreateCreditNote;
use crate::models::invoice::CreateInvoice;
use crate::models::{Contact, InvoiceStatus, Money, Payee};
use crate::service::BillingService;
use crate::store::{BillingStore, PgStore, StoreTx};

/// Connects to the database named by `DATABASE_URL` and migrates it.
async fn create_test_pool() -> Result<PgPool, anyhow::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL not set for tests"))?;

    let pool = db::create_pool(&database_url, 2).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

fn contact(name: &str) -> Contact {
    Contact {
        name: name.into(),
        email: "test@example.com".into(),
        address1: "1 High Street".into(),
        address2: None,
        town: "Bath".into(),
        county: None,
        postcode: "BA1 1AA".into(),
    }
}

fn payee(name: &str) -> Payee {
    let now = Utc::now();
    Payee {
        id: Uuid::new_v4(),
        contact: contact(name),
        organisation: None,
        active: true,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_rolled_back_work_is_not_visible() {
    let store = PgStore::new(create_test_pool().await.expect("Failed to create test pool"));
    let payee = payee("Rolled Back Ltd");

    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_payee(&payee).await.unwrap();
        // dropped without commit
    }

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.payee(payee.id).await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_committed_payee_round_trips() {
    let store = PgStore::new(create_test_pool().await.expect("Failed to create test pool"));
    let payee = payee("Acme Insurance");

    let mut tx = store.begin().await.unwrap();
    tx.insert_payee(&payee).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let stored = tx.payee(payee.id).await.unwrap().unwrap();
    assert_eq!(stored.contact, payee.contact);
    assert_eq!(stored.id, payee.id);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_invoice_numbers_increase() {
    let store = PgStore::new(create_test_pool().await.expect("Failed to create test pool"));

    let mut tx = store.begin().await.unwrap();
    let first = tx.next_invoice_number().await.unwrap();
    let second = tx.next_invoice_number().await.unwrap();
    assert!(second > first);
}

/// Bills a client against Postgres and checks the rows survive each
/// unit of work.
#[tokio::test]
#[ignore] // Requires database setup
async fn test_bill_and_credit_client_in_postgres() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let service = BillingService::new(PgStore::new(pool), BillingSettings::default());
    let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    let client = service
        .create_client(CreateClient {
            contact: contact("Jane Smith"),
            title: None,
            active: None,
            paid_by: None,
            payee_reference: None,
            new_rate: Some(Money::gbp(6000)),
            new_rate_from: Some(from),
        })
        .await
        .unwrap();

    let mut session_ids = Vec::new();
    for _ in 0..3 {
        let session = service
            .create_session(CreateSession {
                client_id: client.id,
                session_date: None,
                units: Some(Decimal::ONE),
                description: None,
            })
            .await
            .unwrap();
        session_ids.push(session.id);
    }

    let invoice = service
        .create_invoice(CreateInvoice {
            client_id: client.id,
            session_ids,
            date: None,
            payee_id: None,
            text: None,
        })
        .await
        .unwrap();
    assert_eq!(invoice.amount, Money::gbp(18000));

    let sent = service.send_invoice(invoice.id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);
    assert!(sent.document.is_some());

    let note = service
        .create_credit_note(
            invoice.id,
            CreateCreditNote {
                amount: Money::gbp(5000),
                reason: "Missed session".into(),
                date: None,
                text: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(note.amount, Money::gbp(-5000));

    let stored = service.invoice(invoice.id).await.unwrap();
    assert_eq!(stored.document, sent.document);
    assert_eq!(
        service.credit_notes_for_invoice(invoice.id).await.unwrap(),
        vec![note]
    );
}
