//! Property-based tests for the entitlement store and journal chain.
//!
//! These exercise the two durable invariants the purchase flow leans on:
//! transaction-id uniqueness under redelivery, and tamper-evidence of the
//! transaction journal.

use proptest::prelude::*;

use storeproof_ledger::{
    verify_chain, EntitlementStore, LogRecord, LogStatus, MemoryStore, Platform, PurchaseStatus,
    TransactionJournal, VerifiedPurchase,
};

fn purchase(transaction_id: &str, user_id: &str) -> VerifiedPurchase {
    VerifiedPurchase {
        purchase_id: uuid::Uuid::new_v4().to_string(),
        transaction_id: transaction_id.into(),
        user_id: user_id.into(),
        catalog_id: "cat-1".into(),
        product_id: "p-1".into(),
        price: 500,
        currency: "USD".into(),
        platform: Platform::GooglePlay,
        status: PurchaseStatus::Verified,
        verified_at: 1754438400,
        created_at: 1754438400,
    }
}

fn log_record(transaction_id: &str, status: LogStatus) -> LogRecord {
    LogRecord {
        transaction_id: transaction_id.into(),
        user_id: "user-1".into(),
        catalog_id: None,
        product_id: "p-1".into(),
        price: None,
        currency: None,
        status,
        detail: None,
        proof_digest: LogRecord::digest_proof(transaction_id),
    }
}

/// Strategy for short transaction-id-shaped strings.
fn transaction_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z0-9]{1,12}", 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// However many times ids are replayed, the store holds exactly one row
    /// per distinct transaction id, and every call reports a row.
    #[test]
    fn store_row_count_equals_distinct_ids(ids in transaction_ids()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let store = MemoryStore::new();
            for id in &ids {
                let outcome = store
                    .record_if_absent(purchase(id, "user-1"))
                    .await
                    .expect("insert");
                prop_assert_eq!(&outcome.purchase().transaction_id, id);
            }

            let distinct: std::collections::HashSet<_> = ids.iter().collect();
            prop_assert_eq!(store.count().await.expect("count"), distinct.len());
            Ok(())
        })?;
    }

    /// Re-recording an id always returns the purchase id of the first insert.
    #[test]
    fn duplicate_insert_returns_original_row(id in "[a-z0-9]{1,12}", extra in 1usize..5) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let store = MemoryStore::new();
            let first = store
                .record_if_absent(purchase(&id, "user-1"))
                .await
                .expect("insert");
            prop_assert!(first.was_created());

            for _ in 0..extra {
                let again = store
                    .record_if_absent(purchase(&id, "user-1"))
                    .await
                    .expect("insert");
                prop_assert!(!again.was_created());
                prop_assert_eq!(
                    &again.purchase().purchase_id,
                    &first.purchase().purchase_id
                );
            }
            Ok(())
        })?;
    }

    /// An untouched journal chain always verifies.
    #[test]
    fn journal_chain_verifies(ids in transaction_ids()) {
        let journal = TransactionJournal::in_memory();
        for (i, id) in ids.iter().enumerate() {
            let status = if i % 3 == 0 { LogStatus::Failure } else { LogStatus::Success };
            journal.append(log_record(id, status)).expect("append");
        }

        let report = journal.verify().expect("verify");
        prop_assert!(report.valid);
        prop_assert_eq!(report.total_entries, ids.len() as u64);
    }

    /// Tampering with any single entry is detected at or before that entry.
    #[test]
    fn journal_tamper_is_detected(ids in prop::collection::vec("[a-z0-9]{1,12}", 2..30), pick in any::<prop::sample::Index>()) {
        let journal = TransactionJournal::in_memory();
        for id in &ids {
            journal.append(log_record(id, LogStatus::Success)).expect("append");
        }

        let mut entries = journal.entries().expect("entries");
        let victim = pick.index(entries.len());
        entries[victim].record.product_id = "tampered".into();

        let report = verify_chain(&entries);
        prop_assert!(!report.valid);
        let seq = entries[victim].sequence_number;
        prop_assert!(report.first_tampered_sequence.expect("tampered sequence") <= seq);
    }
}
