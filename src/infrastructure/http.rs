use crate::domain::ports::{SettlementClient, SettlementReceipt, SettlementRequest};
use crate::error::SettlementError;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// Settlement client that POSTs each request as JSON to `{base_url}/{operation}`.
///
/// A 2xx response must carry a [`SettlementReceipt`]. Other statuses become
/// settlement errors: 5xx means the provider is unavailable, anything else is a
/// rejection.
#[derive(Clone)]
pub struct HttpSettlementClient {
    client: Client,
    base_url: String,
}

impl HttpSettlementClient {
    /// Fails when the TLS backend cannot be initialised.
    pub fn new(base_url: impl Into<String>) -> Result<Self, SettlementError> {
        let client = Client::builder()
            .build()
            .map_err(|e| SettlementError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, request: &SettlementRequest) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            request.operation.path()
        )
    }
}

#[async_trait]
impl SettlementClient for HttpSettlementClient {
    async fn call(&self, request: SettlementRequest) -> Result<SettlementReceipt, SettlementError> {
        let url = self.url_for(&request);
        debug!(%url, transaction_id = %request.transaction_id, "Calling settlement provider");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SettlementError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SettlementError::Unavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::Rejected(format!("HTTP {status}: {body}")));
        }

        response
            .json::<SettlementReceipt>()
            .await
            .map_err(|e| SettlementError::Transport(format!("invalid receipt: {e}")))
    }
}

/// Used when no settlement provider is configured. Every call fails, so
/// provider-backed categories are recorded as failed attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineSettlementClient;

#[async_trait]
impl SettlementClient for OfflineSettlementClient {
    async fn call(&self, request: SettlementRequest) -> Result<SettlementReceipt, SettlementError> {
        Err(SettlementError::Unavailable(format!(
            "no settlement provider configured for {}",
            request.operation.path()
        )))
    }
}
