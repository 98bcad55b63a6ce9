//! Record types for verified purchases and the transaction journal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Commerce platform a purchase originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Apple App Store: proof is a signed transaction payload (JWS),
    /// verified without contacting the platform.
    AppStore,
    /// Google Play: proof is a purchase token, verified via a
    /// server-to-server status query.
    GooglePlay,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AppStore => write!(f, "app_store"),
            Self::GooglePlay => write!(f, "google_play"),
        }
    }
}

/// Lifecycle status of a verified purchase.
///
/// Rows are written once on successful verification and never updated by
/// the normal flow, so `Verified` is the only state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    /// Verification succeeded and the entitlement is granted.
    Verified,
}

/// A durable, verified purchase — the entitlement record.
///
/// Invariant: at most one row per `transaction_id`, enforced by
/// [`crate::store::EntitlementStore::record_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedPurchase {
    /// System-generated purchase id (UUID v4).
    pub purchase_id: String,
    /// Canonical platform transaction id, unique across the ledger.
    pub transaction_id: String,
    /// User the entitlement belongs to.
    pub user_id: String,
    /// Catalog item granted by this purchase.
    pub catalog_id: String,
    /// External product id the platform sold.
    pub product_id: String,
    /// Price in minor currency units, from the catalog at verification time.
    pub price: u64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Platform the purchase was made on.
    pub platform: Platform,
    /// Purchase status.
    pub status: PurchaseStatus,
    /// When verification succeeded (Unix seconds).
    pub verified_at: i64,
    /// When the row was created (Unix seconds).
    pub created_at: i64,
}

/// Outcome of an idempotent ledger insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// A new row was created.
    Created(VerifiedPurchase),
    /// A row with the same transaction id already existed; the existing
    /// row is returned so callers can treat redelivery as success.
    AlreadyRecorded(VerifiedPurchase),
}

impl RecordOutcome {
    /// The purchase row, whether newly created or pre-existing.
    #[must_use]
    pub fn purchase(&self) -> &VerifiedPurchase {
        match self {
            Self::Created(p) | Self::AlreadyRecorded(p) => p,
        }
    }

    /// Whether this call created the row.
    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Terminal status of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    /// The attempt ended in a granted (or already-granted) entitlement.
    Success,
    /// The attempt was rejected.
    Failure,
}

/// Business fields of a verification attempt, as supplied by the caller.
///
/// The journal turns this into a chained [`TransactionLogEntry`] by stamping
/// the sequence number, chain hashes and timestamp on append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Transaction id the attempt was for.
    pub transaction_id: String,
    /// Authenticated caller.
    pub user_id: String,
    /// Catalog item resolved for the claim, when known.
    pub catalog_id: Option<String>,
    /// Product id carried by the claim.
    pub product_id: String,
    /// Price in minor units, when a catalog item was resolved.
    pub price: Option<u64>,
    /// Currency code, when a catalog item was resolved.
    pub currency: Option<String>,
    /// Terminal status of the attempt.
    pub status: LogStatus,
    /// Machine-readable detail: the error kind on failure,
    /// `"already_recorded"` on idempotent success.
    pub detail: Option<String>,
    /// SHA-256 hex digest of the raw proof. The proof itself is never
    /// persisted.
    pub proof_digest: String,
}

impl LogRecord {
    /// Compute the digest stored in place of a raw proof blob.
    #[must_use]
    pub fn digest_proof(raw_proof: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_proof.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A single append-only journal entry: one verification attempt, success or
/// failure, hash-chained to its predecessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    /// Position in the chain, starting at 1.
    pub sequence_number: u64,
    /// Business fields of the attempt.
    #[serde(flatten)]
    pub record: LogRecord,
    /// Hash of the previous entry, or `"genesis"` for the first.
    pub previous_hash: String,
    /// Hash of this entry.
    pub entry_hash: String,
    /// When the entry was appended (Unix seconds).
    pub created_at: i64,
}

impl TransactionLogEntry {
    /// Compute the expected hash for this entry.
    ///
    /// Builds a canonical JSON projection (everything except `entry_hash`)
    /// and hashes it with SHA-256.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let canonical = serde_json::json!({
            "sequence_number": self.sequence_number,
            "transaction_id": self.record.transaction_id,
            "user_id": self.record.user_id,
            "catalog_id": self.record.catalog_id,
            "product_id": self.record.product_id,
            "price": self.record.price,
            "currency": self.record.currency,
            "status": self.record.status,
            "detail": self.record.detail,
            "proof_digest": self.record.proof_digest,
            "previous_hash": self.previous_hash,
            "created_at": self.created_at,
        });

        let canonical_json = serde_json::to_string(&canonical).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify this entry's stored hash against the computed one.
    #[must_use]
    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.entry_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(status: LogStatus) -> LogRecord {
        LogRecord {
            transaction_id: "tx-100".into(),
            user_id: "user-1".into(),
            catalog_id: Some("cat-1".into()),
            product_id: "p-1".into(),
            price: Some(1000),
            currency: Some("USD".into()),
            status,
            detail: None,
            proof_digest: LogRecord::digest_proof("proof"),
        }
    }

    #[test]
    fn entry_hash_round_trip() {
        let mut entry = TransactionLogEntry {
            sequence_number: 1,
            record: sample_record(LogStatus::Success),
            previous_hash: "genesis".into(),
            entry_hash: String::new(),
            created_at: 1754438400,
        };
        entry.entry_hash = entry.compute_hash();
        assert!(entry.verify_hash());
    }

    #[test]
    fn tampered_entry_fails_hash_check() {
        let mut entry = TransactionLogEntry {
            sequence_number: 1,
            record: sample_record(LogStatus::Success),
            previous_hash: "genesis".into(),
            entry_hash: String::new(),
            created_at: 1754438400,
        };
        entry.entry_hash = entry.compute_hash();
        entry.record.price = Some(1); // tamper without recomputing
        assert!(!entry.verify_hash());
    }

    #[test]
    fn proof_digest_is_stable_hex() {
        let a = LogRecord::digest_proof("proof");
        let b = LogRecord::digest_proof("proof");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn platform_serde_tags() {
        assert_eq!(
            serde_json::to_string(&Platform::AppStore).unwrap(),
            "\"app_store\""
        );
        assert_eq!(
            serde_json::to_string(&Platform::GooglePlay).unwrap(),
            "\"google_play\""
        );
    }
}
