//! Payment processor HTTP client
//!
//! Reference transport for both processor-side adapters (received payments
//! and outbound payments). Read-only: the engine never instructs payments.

use crate::inbound::{InboundTransport, WireReceivedPayment};
use crate::outbound::{OutboundTransport, WirePayment};
use crate::types::{FetchWindow, SourceKind};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Processor API client configuration
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// API base URL
    pub base_url: String,
    /// API key (bearer)
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
}

/// HTTP/JSON processor client
pub struct HttpProcessorClient {
    config: ProcessorConfig,
    client: Client,
}

impl HttpProcessorClient {
    /// New client; the underlying connection pool is long-lived
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Unavailable {
                source_kind: SourceKind::InboundFunding,
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        source: SourceKind,
        path: &str,
        window: &FetchWindow,
    ) -> Result<T> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .query(&[
                ("since", window.start.to_rfc3339()),
                ("until", window.end.to_rfc3339()),
            ])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(source, e, self.config.timeout.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(source, status.as_u16(), body));
        }

        response.json().await.map_err(|e| Error::Malformed {
            source_kind: source,
            detail: e.to_string(),
        })
    }
}

#[async_trait]
impl InboundTransport for HttpProcessorClient {
    async fn list_received(&self, window: &FetchWindow) -> Result<Vec<WireReceivedPayment>> {
        self.get_json(SourceKind::InboundFunding, "/received-payments", window)
            .await
    }
}

#[async_trait]
impl OutboundTransport for HttpProcessorClient {
    async fn list_payments(&self, window: &FetchWindow) -> Result<Vec<WirePayment>> {
        self.get_json(SourceKind::OutboundPayment, "/payments", window)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> ProcessorConfig {
        ProcessorConfig {
            base_url,
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn fetches_received_payments_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/received-payments"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "RP-1",
                "sub_account": "ACCT-01",
                "amount": "4500.00",
                "currency": "USD",
                "payment_date": "2024-01-15",
                "status": "booked",
                "infoToAccountOwner": "BBDO USA LLC DES:ACH"
            }])))
            .mount(&server)
            .await;

        let client = HttpProcessorClient::new(config(server.uri())).unwrap();
        let window = FetchWindow::lookback(30, Utc::now());
        let rows = client.list_received(&window).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "RP-1");
        assert_eq!(rows[0].info_to_account_owner, "BBDO USA LLC DES:ACH");
    }

    #[tokio::test]
    async fn server_errors_are_transient_and_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = HttpProcessorClient::new(config(server.uri())).unwrap();
        let window = FetchWindow::lookback(30, Utc::now());

        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            factor: 2.0,
            deadline: None,
        };
        let rows = policy
            .run(SourceKind::OutboundPayment, || client.list_payments(&window))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/received-payments"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = HttpProcessorClient::new(config(server.uri())).unwrap();
        let window = FetchWindow::lookback(30, Utc::now());
        let err = client.list_received(&window).await.unwrap_err();
        assert!(matches!(err, Error::Unavailable { .. }));
        assert!(!err.is_transient());
    }
}
