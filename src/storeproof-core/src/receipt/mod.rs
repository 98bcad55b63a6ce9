//! Receipt verification: platform-specific proof-of-purchase checks.
//!
//! Each platform adapter takes a raw proof and returns a normalized
//! [`VerificationOutcome`] whose ids are recovered from the *verified*
//! proof, never from caller-supplied fields. Both adapters are stateless
//! and safe to retry: verifying the same proof twice yields the same
//! result, with no side effects at the platform beyond a status read.
//! Crash recovery relies on this.

pub mod app_store;
pub mod play;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::PurchaseClaim;
use storeproof_ledger::Platform;

pub use app_store::{AppStoreVerifier, Es256Verifier, PayloadVerifier, SignedTransaction};
pub use play::{PlayClient, PlayCredentials, ProductPurchase};

/// Normalized result of a successful proof verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// Canonical transaction id, recovered from the proof.
    pub transaction_id: String,
    /// Canonical product id, recovered from the proof.
    pub product_id: String,
    /// When the platform says the purchase happened (Unix seconds).
    pub purchased_at: Option<i64>,
}

/// Errors from proof verification.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// The proof could not be decoded.
    #[error("malformed proof: {0}")]
    InvalidFormat(String),

    /// The payload signature did not verify.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// The signed payload belongs to a different application.
    #[error("bundle identity mismatch: expected '{expected}', payload carries '{found}'")]
    BundleMismatch {
        /// Bundle id this deployment expects.
        expected: String,
        /// Bundle id the payload carries.
        found: String,
    },

    /// The signed payload comes from an environment this deployment
    /// does not accept.
    #[error("environment '{found}' not accepted")]
    Environment {
        /// Environment the payload carries.
        found: String,
    },

    /// The verified proof names a different product than the claim.
    #[error("product mismatch: claim says '{claimed}', proof says '{verified}'")]
    ProductMismatch {
        /// Product id the caller claimed.
        claimed: String,
        /// Product id the verified proof carries.
        verified: String,
    },

    /// The platform reports a purchase state other than completed.
    #[error("purchase state '{state}' is not completed")]
    State {
        /// The reported state.
        state: String,
    },

    /// The platform rejected the status query (bad token, unknown
    /// purchase, revoked credentials). Not retryable.
    #[error("platform rejected the status query: {message}")]
    Rejected {
        /// Error message.
        message: String,
    },

    /// A transport fault reaching the platform. Retryable.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },
}

impl ReceiptError {
    /// Whether retrying the same proof could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Verify a claim's raw proof against its originating platform.
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    /// Verify `claim`, returning the canonical ids from the proof.
    ///
    /// # Errors
    ///
    /// Returns a [`ReceiptError`] describing why the proof was rejected,
    /// or `Network` when the platform could not be reached.
    async fn verify(&self, claim: &PurchaseClaim) -> Result<VerificationOutcome, ReceiptError>;
}

/// Dispatching verifier over both platform adapters.
pub struct ReceiptVerifier {
    app_store: AppStoreVerifier,
    play: PlayClient,
}

impl ReceiptVerifier {
    /// Create a verifier from the two platform adapters.
    #[must_use]
    pub fn new(app_store: AppStoreVerifier, play: PlayClient) -> Self {
        Self { app_store, play }
    }
}

#[async_trait]
impl ProofVerifier for ReceiptVerifier {
    async fn verify(&self, claim: &PurchaseClaim) -> Result<VerificationOutcome, ReceiptError> {
        match claim.platform {
            Platform::AppStore => self.app_store.verify(&claim.raw_proof, &claim.product_id),
            Platform::GooglePlay => {
                self.play
                    .verify(&claim.raw_proof, &claim.product_id, &claim.transaction_id)
                    .await
            }
        }
    }
}
