//! Submission transport: how claims reach the purchase orchestrator.
//!
//! Behind a trait so tests and single-process deployments can wire the
//! orchestrator in directly, while devices talk HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use storeproof_core::{PurchaseOrchestrator, SubmitPurchaseRequest, SubmitPurchaseResponse};

/// Errors from the submission transport itself.
///
/// A transport error means the server's decision is unknown: the claim is
/// still un-finalized and may be retried with the same transaction id.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the server, or it answered too late.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with something unintelligible.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Sends purchase submissions to the orchestrator.
#[async_trait]
pub trait PurchaseSubmitter: Send + Sync {
    /// Submit a claim and return the server's decision.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no decision was obtained.
    async fn submit(
        &self,
        request: SubmitPurchaseRequest,
    ) -> Result<SubmitPurchaseResponse, TransportError>;
}

/// HTTP transport for device builds.
pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubmitter {
    /// Create a transport posting to `endpoint` (the submission URL).
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(3))
            .user_agent(format!("storeproof-client/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PurchaseSubmitter for HttpSubmitter {
    async fn submit(
        &self,
        request: SubmitPurchaseRequest,
    ) -> Result<SubmitPurchaseResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "purchase submission request failed");
                TransportError::Network(format!("submission request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Protocol(format!(
                "HTTP {status} from submission endpoint"
            )));
        }

        response
            .json::<SubmitPurchaseResponse>()
            .await
            .map_err(|e| TransportError::Protocol(format!("failed to parse response: {e}")))
    }
}

/// In-process transport wrapping the orchestrator directly.
///
/// Used by tests and by deployments that co-locate client and server.
pub struct LocalSubmitter {
    orchestrator: Arc<PurchaseOrchestrator>,
}

impl LocalSubmitter {
    /// Wrap an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<PurchaseOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl PurchaseSubmitter for LocalSubmitter {
    async fn submit(
        &self,
        request: SubmitPurchaseRequest,
    ) -> Result<SubmitPurchaseResponse, TransportError> {
        Ok(self.orchestrator.submit(request).await)
    }
}
