//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Document sources backing the poller."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nanogrid_common::config::DeviceConfig;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::catalog::Endpoint;
use crate::error::PollError;

/// Supplies the decoded JSON document behind an endpoint.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a fresh document. Every call performs one attempt; there are no retries.
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, PollError>;
}

/// Request URL for an endpoint. The trailing slash is required by the device's router.
pub fn endpoint_url(device: &DeviceConfig, endpoint: &Endpoint) -> String {
    format!("{}{}/", device.base_url(), endpoint)
}

/// HTTP source talking to a Nanogrid Air with basic authentication.
///
/// One pooled [`reqwest::Client`] is shared by every reading on the device.
#[derive(Debug, Clone)]
pub struct HttpDocumentSource {
    client: reqwest::Client,
    device: DeviceConfig,
    timeout: Duration,
}

impl HttpDocumentSource {
    pub fn new(device: DeviceConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("nanogrid-core/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, device, timeout))
    }

    pub fn with_client(client: reqwest::Client, device: DeviceConfig, timeout: Duration) -> Self {
        Self {
            client,
            device,
            timeout,
        }
    }

    pub fn device(&self) -> &DeviceConfig {
        &self.device
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn classify(err: reqwest::Error, url: &str) -> PollError {
    if err.is_timeout() {
        PollError::Timeout {
            url: url.to_owned(),
        }
    } else if err.is_decode() {
        PollError::decode(err)
    } else {
        PollError::transport(err)
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, PollError> {
        let url = endpoint_url(&self.device, endpoint);
        debug!(url = %url, "requesting document");
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.device.username, Some(&self.device.password))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| classify(err, &url))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PollError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await.map_err(|err| classify(err, &url))?;
        serde_json::from_slice(&body).map_err(PollError::decode)
    }
}

/// In-memory source holding canned documents or failures per endpoint.
#[derive(Debug, Default)]
pub struct InMemoryDocumentSource {
    documents: RwLock<HashMap<Endpoint, Result<Value, PollError>>>,
    fetches: AtomicUsize,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_document(&self, endpoint: impl Into<String>, document: Value) {
        self.documents
            .write()
            .insert(Endpoint::new(endpoint), Ok(document));
    }

    pub fn set_failure(&self, endpoint: impl Into<String>, error: PollError) {
        self.documents
            .write()
            .insert(Endpoint::new(endpoint), Err(error));
    }

    /// Number of fetch calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Value, PollError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.documents
            .read()
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| {
                Err(PollError::Status {
                    status: 404,
                    url: format!("memory://{endpoint}/"),
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_keeps_trailing_slash() {
        let device = DeviceConfig::new("192.168.1.50", 8080, "admin", "pw");
        assert_eq!(
            endpoint_url(&device, &Endpoint::new("/meter")),
            "http://192.168.1.50:8080/meter/"
        );
    }

    #[tokio::test]
    async fn in_memory_source_serves_documents_and_failures() {
        let source = InMemoryDocumentSource::new();
        source.set_document("/meter", json!({"activePowerIn": 1200}));
        source.set_failure("/evse", PollError::transport("connection refused"));

        let meter = source.fetch(&Endpoint::new("/meter")).await.unwrap();
        assert_eq!(meter["activePowerIn"], 1200);
        assert_eq!(
            source.fetch(&Endpoint::new("/evse")).await.unwrap_err().kind(),
            "transport"
        );
        assert_eq!(
            source.fetch(&Endpoint::new("/status")).await.unwrap_err().kind(),
            "status"
        );
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn http_source_reports_refused_connection_as_transport() {
        // Bind then drop a listener so the port is very likely closed.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let device = DeviceConfig::new("127.0.0.1", port, "admin", "pw");
        let source = HttpDocumentSource::new(device, Duration::from_secs(2)).unwrap();
        let err = source.fetch(&Endpoint::new("/status")).await.unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
