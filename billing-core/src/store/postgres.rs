use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Attachment, Client, ClientSession, Contact, CreditNote, CreditNoteStatus, Currency, Fee,
    Invoice, InvoiceStatus, Message, MessageAssignment, Money, Payee,
};
use crate::store::{BillingStore, StoreTx};

/// PostgreSQL-backed store.
///
/// Row lookups by id take `FOR UPDATE` locks, so two units of work touching
/// the same invoice or session are serialised by the database.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl BillingStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        let tx = self.pool.begin().await?;
        Ok(PgTx { tx })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Row shapes. Money is split into pence + currency columns, documents into
// three nullable columns.

#[derive(Debug, FromRow)]
struct PayeeRow {
    id: Uuid,
    name: String,
    email: String,
    address1: String,
    address2: Option<String>,
    town: String,
    county: Option<String>,
    postcode: String,
    organisation: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PayeeRow> for Payee {
    fn from(row: PayeeRow) -> Self {
        Payee {
            id: row.id,
            contact: Contact {
                name: row.name,
                email: row.email,
                address1: row.address1,
                address2: row.address2,
                town: row.town,
                county: row.county,
                postcode: row.postcode,
            },
            organisation: row.organisation,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ClientRow {
    id: Uuid,
    name: String,
    email: String,
    address1: String,
    address2: Option<String>,
    town: String,
    county: Option<String>,
    postcode: String,
    title: Option<String>,
    active: bool,
    paid_by_id: Option<Uuid>,
    payee_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: row.id,
            contact: Contact {
                name: row.name,
                email: row.email,
                address1: row.address1,
                address2: row.address2,
                town: row.town,
                county: row.county,
                postcode: row.postcode,
            },
            title: row.title,
            active: row.active,
            paid_by: row.paid_by_id,
            payee_reference: row.payee_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FeeRow {
    id: Uuid,
    client_id: Uuid,
    from_date: NaiveDate,
    to_date: Option<NaiveDate>,
    rate_pence: i64,
    rate_currency: Currency,
}

impl From<FeeRow> for Fee {
    fn from(row: FeeRow) -> Self {
        Fee {
            id: row.id,
            client_id: row.client_id,
            from: row.from_date,
            to: row.to_date,
            rate: Money::new(row.rate_pence, row.rate_currency),
            persisted: true,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    client_id: Uuid,
    invoice_id: Option<Uuid>,
    session_date: NaiveDate,
    units: Decimal,
    unit_rate_pence: i64,
    unit_rate_currency: Currency,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for ClientSession {
    fn from(row: SessionRow) -> Self {
        ClientSession {
            id: row.id,
            client_id: row.client_id,
            invoice_id: row.invoice_id,
            session_date: row.session_date,
            units: row.units,
            unit_rate: Money::new(row.unit_rate_pence, row.unit_rate_currency),
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn document(
    filename: Option<String>,
    content_type: Option<String>,
    bytes: Option<Vec<u8>>,
) -> Option<Attachment> {
    filename.map(|filename| Attachment {
        filename,
        content_type: content_type.unwrap_or_else(|| "text/plain".to_string()),
        bytes: bytes.unwrap_or_default(),
    })
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: Uuid,
    number: i64,
    client_id: Uuid,
    payee_id: Option<Uuid>,
    date: NaiveDate,
    amount_pence: i64,
    amount_currency: Currency,
    status: InvoiceStatus,
    text: String,
    document_filename: Option<String>,
    document_content_type: Option<String>,
    document_bytes: Option<Vec<u8>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Invoice {
            id: row.id,
            number: row.number,
            client_id: row.client_id,
            payee_id: row.payee_id,
            date: row.date,
            amount: Money::new(row.amount_pence, row.amount_currency),
            status: row.status,
            text: row.text,
            document: document(
                row.document_filename,
                row.document_content_type,
                row.document_bytes,
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CreditNoteRow {
    id: Uuid,
    invoice_id: Uuid,
    invoice_number: i64,
    client_id: Uuid,
    payee_id: Option<Uuid>,
    date: NaiveDate,
    amount_pence: i64,
    amount_currency: Currency,
    reason: String,
    text: String,
    status: CreditNoteStatus,
    document_filename: Option<String>,
    document_content_type: Option<String>,
    document_bytes: Option<Vec<u8>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CreditNoteRow> for CreditNote {
    fn from(row: CreditNoteRow) -> Self {
        CreditNote {
            id: row.id,
            invoice_id: row.invoice_id,
            invoice_number: row.invoice_number,
            client_id: row.client_id,
            payee_id: row.payee_id,
            date: row.date,
            amount: Money::new(row.amount_pence, row.amount_currency),
            reason: row.reason,
            text: row.text,
            status: row.status,
            document: document(
                row.document_filename,
                row.document_content_type,
                row.document_bytes,
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    text: String,
    from_date: Option<NaiveDate>,
    until_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            text: row.text,
            from_date: row.from_date,
            until_date: row.until_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    message_id: Uuid,
    client_id: Option<Uuid>,
}

const PAYEE_COLUMNS: &str = "id, name, email, address1, address2, town, county, postcode, \
     organisation, active, created_at, updated_at";

const CLIENT_COLUMNS: &str = "id, name, email, address1, address2, town, county, postcode, \
     title, active, paid_by_id, payee_reference, created_at, updated_at";

const FEE_COLUMNS: &str = "id, client_id, from_date, to_date, rate_pence, rate_currency";

const SESSION_COLUMNS: &str = "id, client_id, invoice_id, session_date, units, \
     unit_rate_pence, unit_rate_currency, description, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, number, client_id, payee_id, date, amount_pence, \
     amount_currency, status, text, document_filename, document_content_type, \
     document_bytes, created_at, updated_at";

const CREDIT_NOTE_COLUMNS: &str = "id, invoice_id, invoice_number, client_id, payee_id, \
     date, amount_pence, amount_currency, reason, text, status, document_filename, \
     document_content_type, document_bytes, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "m.id, m.text, m.from_date, m.until_date, m.created_at, m.updated_at";

#[async_trait]
impl StoreTx for PgTx {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn insert_payee(&mut self, payee: &Payee) -> Result<()> {
        let c = &payee.contact;
        sqlx::query(
            r#"
            INSERT INTO payees (id, name, email, address1, address2, town, county, postcode,
                                organisation, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payee.id)
        .bind(&c.name)
        .bind(&c.email)
        .bind(&c.address1)
        .bind(&c.address2)
        .bind(&c.town)
        .bind(&c.county)
        .bind(&c.postcode)
        .bind(&payee.organisation)
        .bind(payee.active)
        .bind(payee.created_at)
        .bind(payee.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_payee(&mut self, payee: &Payee) -> Result<()> {
        let c = &payee.contact;
        sqlx::query(
            r#"
            UPDATE payees
            SET name = $2, email = $3, address1 = $4, address2 = $5, town = $6,
                county = $7, postcode = $8, organisation = $9, active = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(payee.id)
        .bind(&c.name)
        .bind(&c.email)
        .bind(&c.address1)
        .bind(&c.address2)
        .bind(&c.town)
        .bind(&c.county)
        .bind(&c.postcode)
        .bind(&payee.organisation)
        .bind(payee.active)
        .bind(payee.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn payee(&mut self, id: Uuid) -> Result<Option<Payee>> {
        let sql = format!("SELECT {} FROM payees WHERE id = $1", PAYEE_COLUMNS);
        let row = sqlx::query_as::<_, PayeeRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Payee::from))
    }

    async fn payees(&mut self) -> Result<Vec<Payee>> {
        let sql = format!("SELECT {} FROM payees ORDER BY name", PAYEE_COLUMNS);
        let rows = sqlx::query_as::<_, PayeeRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Payee::from).collect())
    }

    async fn insert_client(&mut self, client: &Client) -> Result<()> {
        let c = &client.contact;
        sqlx::query(
            r#"
            INSERT INTO clients (id, name, email, address1, address2, town, county, postcode,
                                 title, active, paid_by_id, payee_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(client.id)
        .bind(&c.name)
        .bind(&c.email)
        .bind(&c.address1)
        .bind(&c.address2)
        .bind(&c.town)
        .bind(&c.county)
        .bind(&c.postcode)
        .bind(&client.title)
        .bind(client.active)
        .bind(client.paid_by)
        .bind(&client.payee_reference)
        .bind(client.created_at)
        .bind(client.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_client(&mut self, client: &Client) -> Result<()> {
        let c = &client.contact;
        sqlx::query(
            r#"
            UPDATE clients
            SET name = $2, email = $3, address1 = $4, address2 = $5, town = $6, county = $7,
                postcode = $8, title = $9, active = $10, paid_by_id = $11,
                payee_reference = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(client.id)
        .bind(&c.name)
        .bind(&c.email)
        .bind(&c.address1)
        .bind(&c.address2)
        .bind(&c.town)
        .bind(&c.county)
        .bind(&c.postcode)
        .bind(&client.title)
        .bind(client.active)
        .bind(client.paid_by)
        .bind(&client.payee_reference)
        .bind(client.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn client(&mut self, id: Uuid) -> Result<Option<Client>> {
        let sql = format!("SELECT {} FROM clients WHERE id = $1 FOR UPDATE", CLIENT_COLUMNS);
        let row = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Client::from))
    }

    async fn clients(&mut self, active_only: bool) -> Result<Vec<Client>> {
        let sql = format!(
            "SELECT {} FROM clients WHERE ($1 = FALSE OR active) ORDER BY name",
            CLIENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ClientRow>(&sql)
            .bind(active_only)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Client::from).collect())
    }

    async fn delete_client(&mut self, id: Uuid) -> Result<()> {
        // Fees, sessions, invoices, credit notes and assignments cascade.
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn fees(&mut self, client_id: Uuid) -> Result<Vec<Fee>> {
        let sql = format!(
            "SELECT {} FROM fees WHERE client_id = $1 ORDER BY from_date FOR UPDATE",
            FEE_COLUMNS
        );
        let rows = sqlx::query_as::<_, FeeRow>(&sql)
            .bind(client_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Fee::from).collect())
    }

    async fn save_fee(&mut self, fee: &Fee) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fees (id, client_id, from_date, to_date, rate_pence, rate_currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET from_date = EXCLUDED.from_date,
                to_date = EXCLUDED.to_date,
                rate_pence = EXCLUDED.rate_pence,
                rate_currency = EXCLUDED.rate_currency
            "#,
        )
        .bind(fee.id)
        .bind(fee.client_id)
        .bind(fee.from)
        .bind(fee.to)
        .bind(fee.rate.minor_units)
        .bind(fee.rate.currency)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_session(&mut self, session: &ClientSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO client_sessions (id, client_id, invoice_id, session_date, units,
                                         unit_rate_pence, unit_rate_currency, description,
                                         created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session.id)
        .bind(session.client_id)
        .bind(session.invoice_id)
        .bind(session.session_date)
        .bind(session.units)
        .bind(session.unit_rate.minor_units)
        .bind(session.unit_rate.currency)
        .bind(&session.description)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_session(&mut self, session: &ClientSession) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE client_sessions
            SET invoice_id = $2, session_date = $3, units = $4, unit_rate_pence = $5,
                unit_rate_currency = $6, description = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.invoice_id)
        .bind(session.session_date)
        .bind(session.units)
        .bind(session.unit_rate.minor_units)
        .bind(session.unit_rate.currency)
        .bind(&session.description)
        .bind(session.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn session(&mut self, id: Uuid) -> Result<Option<ClientSession>> {
        let sql = format!(
            "SELECT {} FROM client_sessions WHERE id = $1 FOR UPDATE",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(ClientSession::from))
    }

    async fn delete_session(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM client_sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn sessions_for_client(&mut self, client_id: Uuid) -> Result<Vec<ClientSession>> {
        let sql = format!(
            "SELECT {} FROM client_sessions WHERE client_id = $1 ORDER BY session_date, created_at",
            SESSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(client_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(ClientSession::from).collect())
    }

    async fn sessions_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<ClientSession>> {
        let sql = format!(
            "SELECT {} FROM client_sessions WHERE invoice_id = $1 \
             ORDER BY session_date, created_at FOR UPDATE",
            SESSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(ClientSession::from).collect())
    }

    async fn next_invoice_number(&mut self) -> Result<i64> {
        let number: i64 = sqlx::query_scalar("SELECT nextval('invoice_numbers')")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(number)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        let doc = invoice.document.as_ref();
        sqlx::query(
            r#"
            INSERT INTO invoices (id, number, client_id, payee_id, date, amount_pence,
                                  amount_currency, status, text, document_filename,
                                  document_content_type, document_bytes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.number)
        .bind(invoice.client_id)
        .bind(invoice.payee_id)
        .bind(invoice.date)
        .bind(invoice.amount.minor_units)
        .bind(invoice.amount.currency)
        .bind(invoice.status)
        .bind(&invoice.text)
        .bind(doc.map(|d| d.filename.clone()))
        .bind(doc.map(|d| d.content_type.clone()))
        .bind(doc.map(|d| d.bytes.clone()))
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        let doc = invoice.document.as_ref();
        sqlx::query(
            r#"
            UPDATE invoices
            SET payee_id = $2, date = $3, amount_pence = $4, amount_currency = $5,
                status = $6, text = $7, document_filename = $8, document_content_type = $9,
                document_bytes = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.payee_id)
        .bind(invoice.date)
        .bind(invoice.amount.minor_units)
        .bind(invoice.amount.currency)
        .bind(invoice.status)
        .bind(&invoice.text)
        .bind(doc.map(|d| d.filename.clone()))
        .bind(doc.map(|d| d.content_type.clone()))
        .bind(doc.map(|d| d.bytes.clone()))
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn invoice(&mut self, id: Uuid) -> Result<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE id = $1 FOR UPDATE", INVOICE_COLUMNS);
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Invoice::from))
    }

    async fn delete_invoice(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn invoices_for_client(&mut self, client_id: Uuid) -> Result<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE client_id = $1 ORDER BY date, number",
            INVOICE_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(client_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Invoice::from).collect())
    }

    async fn invoices(&mut self) -> Result<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices ORDER BY date DESC, number DESC",
            INVOICE_COLUMNS
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Invoice::from).collect())
    }

    async fn insert_credit_note(&mut self, note: &CreditNote) -> Result<()> {
        let doc = note.document.as_ref();
        sqlx::query(
            r#"
            INSERT INTO credit_notes (id, invoice_id, invoice_number, client_id, payee_id, date,
                                      amount_pence, amount_currency, reason, text, status,
                                      document_filename, document_content_type, document_bytes,
                                      created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(note.id)
        .bind(note.invoice_id)
        .bind(note.invoice_number)
        .bind(note.client_id)
        .bind(note.payee_id)
        .bind(note.date)
        .bind(note.amount.minor_units)
        .bind(note.amount.currency)
        .bind(&note.reason)
        .bind(&note.text)
        .bind(note.status)
        .bind(doc.map(|d| d.filename.clone()))
        .bind(doc.map(|d| d.content_type.clone()))
        .bind(doc.map(|d| d.bytes.clone()))
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_credit_note(&mut self, note: &CreditNote) -> Result<()> {
        let doc = note.document.as_ref();
        sqlx::query(
            r#"
            UPDATE credit_notes
            SET date = $2, amount_pence = $3, amount_currency = $4, reason = $5, text = $6,
                status = $7, document_filename = $8, document_content_type = $9,
                document_bytes = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(note.id)
        .bind(note.date)
        .bind(note.amount.minor_units)
        .bind(note.amount.currency)
        .bind(&note.reason)
        .bind(&note.text)
        .bind(note.status)
        .bind(doc.map(|d| d.filename.clone()))
        .bind(doc.map(|d| d.content_type.clone()))
        .bind(doc.map(|d| d.bytes.clone()))
        .bind(note.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn credit_note(&mut self, id: Uuid) -> Result<Option<CreditNote>> {
        let sql = format!(
            "SELECT {} FROM credit_notes WHERE id = $1 FOR UPDATE",
            CREDIT_NOTE_COLUMNS
        );
        let row = sqlx::query_as::<_, CreditNoteRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(CreditNote::from))
    }

    async fn delete_credit_note(&mut self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM credit_notes WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn credit_notes_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<CreditNote>> {
        let sql = format!(
            "SELECT {} FROM credit_notes WHERE invoice_id = $1 ORDER BY date, created_at",
            CREDIT_NOTE_COLUMNS
        );
        let rows = sqlx::query_as::<_, CreditNoteRow>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(CreditNote::from).collect())
    }

    async fn insert_message(&mut self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, text, from_date, until_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(&message.text)
        .bind(message.from_date)
        .bind(message.until_date)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_message(&mut self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE messages
            SET text = $2, from_date = $3, until_date = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(message.id)
        .bind(&message.text)
        .bind(message.from_date)
        .bind(message.until_date)
        .bind(message.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn message(&mut self, id: Uuid) -> Result<Option<Message>> {
        let sql = format!("SELECT {} FROM messages m WHERE m.id = $1 FOR UPDATE", MESSAGE_COLUMNS);
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Message::from))
    }

    async fn messages(&mut self) -> Result<Vec<Message>> {
        let sql = format!("SELECT {} FROM messages m ORDER BY m.created_at, m.id", MESSAGE_COLUMNS);
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn delete_message(&mut self, id: Uuid) -> Result<()> {
        // Assignment rows cascade.
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn assignments(&mut self, message_id: Uuid) -> Result<Vec<MessageAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT message_id, client_id FROM messages_for_clients WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| MessageAssignment {
                message_id: row.message_id,
                client_id: row.client_id,
            })
            .collect())
    }

    async fn insert_assignment(&mut self, row: &MessageAssignment) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages_for_clients (message_id, client_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(row.message_id)
        .bind(row.client_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_assignment(&mut self, row: &MessageAssignment) -> Result<()> {
        sqlx::query(
            "DELETE FROM messages_for_clients \
             WHERE message_id = $1 AND client_id IS NOT DISTINCT FROM $2",
        )
        .bind(row.message_id)
        .bind(row.client_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn global_messages(&mut self) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM messages m \
             JOIN messages_for_clients mc ON mc.message_id = m.id \
             WHERE mc.client_id IS NULL ORDER BY m.created_at, m.id",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn messages_for_client(&mut self, client_id: Uuid) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT DISTINCT {} FROM messages m \
             JOIN messages_for_clients mc ON mc.message_id = m.id \
             WHERE mc.client_id = $1 ORDER BY m.created_at, m.id",
            MESSAGE_COLUMNS
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(client_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }
}
