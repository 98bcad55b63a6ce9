//! Entitlement stores: atomic insert-if-absent keyed by transaction id.
//!
//! The store contract is the correctness backstop for the whole purchase
//! flow. Two concurrent submissions for the same transaction id must result
//! in exactly one row, with both callers observing a success-equivalent
//! outcome. Both implementations hold a single write lock across the
//! check and the insert, so there is no check-then-insert race window.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::records::{RecordOutcome, VerifiedPurchase};

/// Durable store of verified purchases.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Insert `purchase` unless a row with the same transaction id already
    /// exists. A duplicate call reports the existing row rather than
    /// erroring, so callers can treat redelivery as success.
    async fn record_if_absent(
        &self,
        purchase: VerifiedPurchase,
    ) -> Result<RecordOutcome, StoreError>;

    /// Look up a purchase by transaction id.
    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<VerifiedPurchase>, StoreError>;

    /// All purchases belonging to a user.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<VerifiedPurchase>, StoreError>;

    /// All purchases, in transaction-id order.
    async fn list_all(&self) -> Result<Vec<VerifiedPurchase>, StoreError>;

    /// Number of rows in the store.
    async fn count(&self) -> Result<usize, StoreError>;
}

/// In-memory entitlement store.
///
/// Suitable for tests and single-process deployments; the write lock makes
/// `record_if_absent` atomic.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<BTreeMap<String, VerifiedPurchase>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn record_if_absent(
        &self,
        purchase: VerifiedPurchase,
    ) -> Result<RecordOutcome, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        match rows.entry(purchase.transaction_id.clone()) {
            std::collections::btree_map::Entry::Occupied(existing) => {
                Ok(RecordOutcome::AlreadyRecorded(existing.get().clone()))
            }
            std::collections::btree_map::Entry::Vacant(slot) => {
                let row = slot.insert(purchase).clone();
                Ok(RecordOutcome::Created(row))
            }
        }
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<VerifiedPurchase>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.get(transaction_id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<VerifiedPurchase>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.values().filter(|p| p.user_id == user_id).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<VerifiedPurchase>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.len())
    }
}

/// File-backed entitlement store.
///
/// Keeps the full index in memory and writes each row through to a JSON
/// file named by the SHA-256 of its transaction id. All rows are loaded at
/// open, so uniqueness checks never touch the filesystem.
pub struct FileStore {
    dir: PathBuf,
    rows: RwLock<BTreeMap<String, VerifiedPurchase>>,
}

impl FileStore {
    /// Open (or create) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// row file cannot be decoded.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut rows = BTreeMap::new();
        for item in fs::read_dir(&dir)? {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read_to_string(&path)?;
            let purchase: VerifiedPurchase =
                serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
                    location: path.display().to_string(),
                    message: e.to_string(),
                })?;
            rows.insert(purchase.transaction_id.clone(), purchase);
        }

        info!(dir = %dir.display(), rows = rows.len(), "entitlement store opened");
        Ok(Self {
            dir,
            rows: RwLock::new(rows),
        })
    }

    fn row_path(&self, transaction_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(transaction_id.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl EntitlementStore for FileStore {
    async fn record_if_absent(
        &self,
        purchase: VerifiedPurchase,
    ) -> Result<RecordOutcome, StoreError> {
        // The write lock is held across check, file write, and index insert.
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(existing) = rows.get(&purchase.transaction_id) {
            debug!(
                transaction_id = %purchase.transaction_id,
                purchase_id = %existing.purchase_id,
                "duplicate transaction, returning existing row"
            );
            return Ok(RecordOutcome::AlreadyRecorded(existing.clone()));
        }

        let path = self.row_path(&purchase.transaction_id);
        let data = serde_json::to_vec_pretty(&purchase)?;
        fs::write(&path, data)?;

        rows.insert(purchase.transaction_id.clone(), purchase.clone());
        Ok(RecordOutcome::Created(purchase))
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<VerifiedPurchase>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.get(transaction_id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<VerifiedPurchase>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.values().filter(|p| p.user_id == user_id).cloned().collect())
    }

    async fn list_all(&self) -> Result<Vec<VerifiedPurchase>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Platform, PurchaseStatus};

    fn purchase(transaction_id: &str, user_id: &str) -> VerifiedPurchase {
        VerifiedPurchase {
            purchase_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            catalog_id: "cat-1".into(),
            product_id: "p-1".into(),
            price: 1000,
            currency: "USD".into(),
            platform: Platform::AppStore,
            status: PurchaseStatus::Verified,
            verified_at: 1754438400,
            created_at: 1754438400,
        }
    }

    #[tokio::test]
    async fn memory_store_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.record_if_absent(purchase("tx-1", "u-1")).await.unwrap();
        assert!(first.was_created());

        let second = store.record_if_absent(purchase("tx-1", "u-1")).await.unwrap();
        assert!(!second.was_created());
        assert_eq!(second.purchase().purchase_id, first.purchase().purchase_id);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_store_lists_by_user() {
        let store = MemoryStore::new();
        store.record_if_absent(purchase("tx-1", "u-1")).await.unwrap();
        store.record_if_absent(purchase("tx-2", "u-1")).await.unwrap();
        store.record_if_absent(purchase("tx-3", "u-2")).await.unwrap();

        assert_eq!(store.list_for_user("u-1").await.unwrap().len(), 2);
        assert_eq!(store.list_for_user("u-2").await.unwrap().len(), 1);
        assert_eq!(store.list_for_user("u-3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            let outcome = store.record_if_absent(purchase("tx-1", "u-1")).await.unwrap();
            assert!(outcome.was_created());
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let row = reopened.find_by_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(row.user_id, "u-1");

        // Redelivery after restart is still deduplicated.
        let again = reopened.record_if_absent(purchase("tx-1", "u-1")).await.unwrap();
        assert!(!again.was_created());
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_create_one_row() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.record_if_absent(purchase("tx-9", "u-1")).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.record_if_absent(purchase("tx-9", "u-1")).await })
        };

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        // Exactly one of the two created the row; both observed the same id.
        assert!(a.was_created() ^ b.was_created());
        assert_eq!(a.purchase().purchase_id, b.purchase().purchase_id);
    }
}
