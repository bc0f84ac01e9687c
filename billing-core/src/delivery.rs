//! Document rendering and delivery collaborators.
//!
//! The core only decides *when* a document is rendered and sent; how it is
//! laid out and how it reaches the recipient is up to these traits.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::models::{Attachment, Contact, Money};

/// One line of an invoice document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLine {
    pub date: NaiveDate,
    pub description: Option<String>,
    pub units: Decimal,
    pub unit_rate: Money,
    pub fee: Money,
}

/// Everything needed to lay out an invoice or credit note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingDocument {
    /// `"invoice"` or `"credit_note"`
    pub kind: &'static str,
    /// e.g. "Invoice #12 for Jane Smith"
    pub title: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub bill_to: Contact,
    pub client_name: String,
    pub payee_reference: Option<String>,
    pub lines: Vec<DocumentLine>,
    pub reason: Option<String>,
    pub text: String,
}

/// Renders a billing document into bytes for attachment.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn render(&self, document: &BillingDocument) -> anyhow::Result<Vec<u8>>;

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}

/// Plain-text rendition of a billing document.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDocumentGenerator;

#[async_trait]
impl DocumentGenerator for TextDocumentGenerator {
    async fn render(&self, document: &BillingDocument) -> anyhow::Result<Vec<u8>> {
        let mut out = String::new();
        writeln!(out, "{}", document.title)?;
        writeln!(out, "Date: {}", document.date.format("%d %b %Y"))?;
        writeln!(out)?;
        writeln!(out, "To:")?;
        writeln!(out, "{}", document.bill_to.name)?;
        writeln!(out, "{}", document.bill_to.address_multi_line())?;
        if let Some(reference) = &document.payee_reference {
            writeln!(out, "Reference: {}", reference)?;
        }
        if document.bill_to.name != document.client_name {
            writeln!(out, "Client: {}", document.client_name)?;
        }
        writeln!(out)?;

        for line in &document.lines {
            writeln!(
                out,
                "{}  {} x {}  {}{}",
                line.date.format("%d %b %Y"),
                line.units,
                line.unit_rate,
                line.fee,
                line.description
                    .as_deref()
                    .map(|d| format!("  {}", d))
                    .unwrap_or_default()
            )?;
        }
        if let Some(reason) = &document.reason {
            writeln!(out, "Reason: {}", reason)?;
        }
        writeln!(out, "Total: {}", document.amount)?;

        if !document.text.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", document.text)?;
        }

        Ok(out.into_bytes())
    }
}

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Attachment>,
}

/// Delivers notifications to billing recipients.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Notifier that records each delivery in the log instead of sending it.
///
/// In production this would hand the message to an email provider.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    pub from: String,
}

impl LogNotifier {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            "Email from {} to {}: {}",
            self.from, notification.to, notification.subject
        );
        info!(
            "Body preview: {}...",
            notification.body.chars().take(100).collect::<String>()
        );
        if let Some(attachment) = &notification.attachment {
            info!(
                "Attachment: {} ({} bytes)",
                attachment.filename,
                attachment.bytes.len()
            );
        }
        Ok(())
    }
}
