//! Wire contract for purchase submission.

use serde::{Deserialize, Serialize};

use storeproof_ledger::{Platform, VerifiedPurchase};

/// Machine-readable failure kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller presented no valid session.
    Unauthorized,
    /// No purchasable catalog item for the claimed product.
    NotFound,
    /// The verified proof names a different product than the claim.
    ProductMismatch,
    /// The proof failed verification.
    VerificationFailed,
    /// Network or storage fault; the same claim may be retried.
    Transient,
}

impl ErrorKind {
    /// Stable string form, used in journal entries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::ProductMismatch => "product_mismatch",
            Self::VerificationFailed => "verification_failed",
            Self::Transient => "transient",
        }
    }

    /// Whether the client may retry the same claim.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unverified purchase assertion held by the client between the platform
/// callback and finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseClaim {
    /// Platform-generated transaction id.
    pub transaction_id: String,
    /// Product the platform reports as purchased.
    pub product_id: String,
    /// Raw proof-of-purchase: a signed JWS payload for the App Store, a
    /// purchase token for Play.
    pub raw_proof: String,
    /// Platform the claim originated from.
    pub platform: Platform,
}

/// A purchase submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitPurchaseRequest {
    /// Session token identifying the caller.
    pub session_token: String,
    /// Catalog item the client believes it bought. Advisory: the catalog
    /// resolution by product id is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Product id the claim is for.
    pub product_id: String,
    /// Platform-generated transaction id.
    pub transaction_id: String,
    /// Raw proof-of-purchase.
    pub raw_proof: String,
    /// Platform the claim originated from.
    pub platform: Platform,
    /// Price the client displayed, in minor units. Advisory; journaled only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_price: Option<u64>,
    /// Currency the client displayed. Advisory; journaled only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_currency: Option<String>,
}

impl SubmitPurchaseRequest {
    /// The claim portion of this request.
    #[must_use]
    pub fn claim(&self) -> PurchaseClaim {
        PurchaseClaim {
            transaction_id: self.transaction_id.clone(),
            product_id: self.product_id.clone(),
            raw_proof: self.raw_proof.clone(),
            platform: self.platform,
        }
    }
}

/// Response to a purchase submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitPurchaseResponse {
    /// The entitlement is granted (or was already granted).
    Success {
        /// The recorded purchase — newly created or pre-existing.
        purchase: VerifiedPurchase,
        /// True when this submission was a redelivery of a recorded
        /// transaction. Indistinguishable from a fresh success for the
        /// end user.
        already_recorded: bool,
    },
    /// The claim was rejected.
    Failure {
        /// Machine-readable failure kind.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
}

impl SubmitPurchaseResponse {
    /// Whether the submission ended in a granted entitlement.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The granted purchase, when successful.
    #[must_use]
    pub fn purchase(&self) -> Option<&VerifiedPurchase> {
        match self {
            Self::Success { purchase, .. } => Some(purchase),
            Self::Failure { .. } => None,
        }
    }
}
