//! Commerce SDK abstraction.
//!
//! The platform SDK is callback-based; adapters translate its callbacks
//! into [`PurchaseEvent`]s on a channel so the controller can process them
//! as a serial event stream. The SDK connection itself is an explicitly
//! passed handle with a clear lifecycle — initialized at process start,
//! dropped at shutdown — never a singleton reached through ambient state.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use storeproof_core::PurchaseClaim;

/// The commerce SDK reported a failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SdkError {
    /// Error message from the SDK.
    pub message: String,
}

impl SdkError {
    /// Create an error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An event delivered by the platform commerce SDK.
#[derive(Debug, Clone)]
pub enum PurchaseEvent {
    /// The platform reports a completed purchase; the claim carries the
    /// raw proof for server-side verification.
    Completed(PurchaseClaim),
    /// The user dismissed the purchase UI. Not an error; produces no claim.
    Canceled {
        /// Product the user backed out of.
        product_id: String,
    },
    /// The platform could not complete the purchase.
    Failed {
        /// Product the purchase was for.
        product_id: String,
        /// Platform-reported reason.
        message: String,
    },
}

/// Handle to the platform commerce SDK.
#[async_trait]
pub trait CommerceSdk: Send + Sync {
    /// Open the platform purchase UI for a product. Results arrive later
    /// as [`PurchaseEvent`]s.
    async fn begin_purchase(&self, product_id: &str) -> Result<(), SdkError>;

    /// Finalize (acknowledge) a delivered transaction so the platform
    /// stops redelivering it. Idempotent at the platform.
    async fn finalize(&self, transaction_id: &str) -> Result<(), SdkError>;

    /// Enumerate every purchase the platform currently attributes to this
    /// device/account.
    async fn held_purchases(&self) -> Result<Vec<PurchaseClaim>, SdkError>;
}

/// Create the event channel an SDK adapter feeds and the controller drains.
#[must_use]
pub fn event_channel(capacity: usize) -> (mpsc::Sender<PurchaseEvent>, mpsc::Receiver<PurchaseEvent>) {
    mpsc::channel(capacity)
}
