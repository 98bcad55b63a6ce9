//! Error types for purchase submission.

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::receipt::ReceiptError;
use crate::types::ErrorKind;
use storeproof_ledger::StoreError;

/// Errors that can end a purchase submission.
///
/// Every variant maps onto a wire-level [`ErrorKind`]; `AlreadyRecorded`
/// has no variant here because redelivery is an idempotent success, not an
/// error.
#[derive(Debug, Error)]
pub enum PurchaseError {
    /// The caller presented no valid session.
    #[error("caller is not authenticated")]
    Unauthorized,

    /// No purchasable catalog item carries the claimed product id.
    #[error("no purchasable catalog item for product '{product_id}'")]
    ProductNotFound {
        /// The product id that failed to resolve.
        product_id: String,
    },

    /// The verified proof names a different product than the claim.
    #[error("product mismatch: claim says '{claimed}', proof says '{verified}'")]
    ProductMismatch {
        /// Product id the caller claimed.
        claimed: String,
        /// Product id recovered from the verified proof.
        verified: String,
    },

    /// The proof failed verification: bad signature, wrong application
    /// identity, wrong environment, or a non-completed platform state.
    #[error("verification failed: {reason}")]
    Verification {
        /// Reason verification failed.
        reason: String,
    },

    /// A network or storage fault; the claim may be retried as-is.
    #[error("transient failure: {message}")]
    Transient {
        /// Error message.
        message: String,
    },
}

impl PurchaseError {
    /// The machine-readable kind carried on the wire.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::ProductNotFound { .. } => ErrorKind::NotFound,
            Self::ProductMismatch { .. } => ErrorKind::ProductMismatch,
            Self::Verification { .. } => ErrorKind::VerificationFailed,
            Self::Transient { .. } => ErrorKind::Transient,
        }
    }

    /// Whether the client may retry the same claim.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<CatalogError> for PurchaseError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound { product_id } => Self::ProductNotFound { product_id },
            CatalogError::Unavailable { message } => Self::Transient { message },
        }
    }
}

impl From<ReceiptError> for PurchaseError {
    fn from(e: ReceiptError) -> Self {
        match e {
            ReceiptError::ProductMismatch { claimed, verified } => {
                Self::ProductMismatch { claimed, verified }
            }
            ReceiptError::Network { message } => Self::Transient { message },
            other => Self::Verification {
                reason: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for PurchaseError {
    fn from(e: StoreError) -> Self {
        // A ledger fault is never terminal for the claim: the platform
        // still holds the un-finalized transaction and will redeliver.
        Self::Transient {
            message: e.to_string(),
        }
    }
}
