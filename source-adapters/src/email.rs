//! Remittance email adapter
//!
//! The mail transport (IMAP relay) is a trait boundary; the adapter owns the
//! parsing policy: first decodable attachment wins, undecodable emails are
//! flagged `manual_review` with no line items, and a parse failure never
//! fails the batch.

use crate::parser::{agency_from_sender, parse_attachment};
use crate::retry::RetryPolicy;
use crate::types::{FetchWindow, ParsedEmail, SourceKind};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recon_core::{CachedEmail, RemittanceSource};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One message as returned by the transport
#[derive(Debug, Clone)]
pub struct RawEmail {
    /// Source-stable message id
    pub id: String,
    /// Subject line
    pub subject: String,
    /// Sender (display name and address)
    pub sender: String,
    /// Message date
    pub email_date: DateTime<Utc>,
    /// Attachments with decoded bodies
    pub attachments: Vec<RawAttachment>,
}

/// One attachment payload
#[derive(Debug, Clone)]
pub struct RawAttachment {
    /// File name
    pub name: String,
    /// Raw body
    pub content: Vec<u8>,
}

/// Mail transport boundary (the fetching side is out of scope)
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Messages for one feed inside the window
    async fn list_messages(
        &self,
        source: RemittanceSource,
        window: &FetchWindow,
    ) -> Result<Vec<RawEmail>>;
}

/// Email adapter: transport + remittance parser
pub struct EmailAdapter {
    transport: Arc<dyn EmailTransport>,
    sources: Vec<RemittanceSource>,
    retry: RetryPolicy,
}

impl EmailAdapter {
    /// New adapter over the given transport and enabled feeds
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        sources: Vec<RemittanceSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            sources,
            retry,
        }
    }

    /// Fetch and parse all feeds for the window
    ///
    /// Idempotent: the same window yields the same parsed emails.
    pub async fn fetch(&self, window: &FetchWindow) -> Result<Vec<ParsedEmail>> {
        let mut out = Vec::new();
        for source in &self.sources {
            let messages = self
                .retry
                .run(SourceKind::Email, || {
                    self.transport.list_messages(*source, window)
                })
                .await?;
            debug!(source = %source, count = messages.len(), "fetched remittance emails");
            for message in messages {
                out.push(self.parse_message(*source, message));
            }
        }
        Ok(out)
    }

    /// Parse one message; failures degrade to `manual_review`
    fn parse_message(&self, source: RemittanceSource, message: RawEmail) -> ParsedEmail {
        let now = Utc::now();
        let agency_name = agency_from_sender(&message.sender);
        let attachment_names: Vec<String> =
            message.attachments.iter().map(|a| a.name.clone()).collect();

        let mut parsed = None;
        for attachment in &message.attachments {
            match parse_attachment(source, &attachment.name, &attachment.content) {
                Ok(p) => {
                    parsed = Some(p);
                    break;
                }
                Err(err) => {
                    debug!(email_id = %message.id, attachment = %attachment.name,
                           error = %err, "attachment did not decode");
                }
            }
        }

        let manual_review = parsed.is_none();
        if manual_review {
            warn!(email_id = %message.id, source = %source,
                  "no attachment decoded, flagging for manual review");
        }

        let (lines, total) = match parsed {
            Some(p) => (p.lines, Some(p.total)),
            None => (Vec::new(), None),
        };

        ParsedEmail {
            email: CachedEmail {
                id: message.id,
                source,
                subject: message.subject,
                sender: message.sender,
                email_date: message.email_date,
                fetched_at: now,
                attachment_names,
                remittance_total: total,
                agency_name,
                manual_review,
                received_payment_id: None,
                match_confidence: None,
                match_method: None,
            },
            lines,
        }
    }
}

/// HTTP/JSON reference transport against the internal mail relay
pub struct HttpEmailTransport {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct WireEmail {
    id: String,
    subject: String,
    sender: String,
    email_date: DateTime<Utc>,
    #[serde(default)]
    attachments: Vec<WireAttachment>,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    name: String,
    /// Body as text; the relay has already decoded the MIME part
    content: String,
}

impl HttpEmailTransport {
    /// New transport against the relay base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let timeout_secs = timeout.as_secs();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unavailable {
                source_kind: SourceKind::Email,
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_secs,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn list_messages(
        &self,
        source: RemittanceSource,
        window: &FetchWindow,
    ) -> Result<Vec<RawEmail>> {
        let url = format!("{}/sources/{}/messages", self.base_url, source.as_str());
        let response = self
            .client
            .get(&url)
            .query(&[
                ("since", window.start.to_rfc3339()),
                ("until", window.end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(SourceKind::Email, e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(SourceKind::Email, status.as_u16(), body));
        }

        let wire: Vec<WireEmail> =
            response
                .json()
                .await
                .map_err(|e| Error::Malformed {
                    source_kind: SourceKind::Email,
                    detail: e.to_string(),
                })?;

        Ok(wire
            .into_iter()
            .map(|w| RawEmail {
                id: w.id,
                subject: w.subject,
                sender: w.sender,
                email_date: w.email_date,
                attachments: w
                    .attachments
                    .into_iter()
                    .map(|a| RawAttachment {
                        name: a.name,
                        content: a.content.into_bytes(),
                    })
                    .collect(),
            })
            .collect())
    }
}
