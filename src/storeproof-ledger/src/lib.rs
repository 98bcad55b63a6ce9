//! # storeproof-ledger
//!
//! Durable records for verified purchases, plus the append-only transaction
//! journal that records every verification attempt.
//!
//! The ledger is the single correctness backstop for purchase idempotency:
//! client-side dedup is best-effort, and the platform redelivers purchase
//! callbacks freely, so [`EntitlementStore::record_if_absent`] must be atomic
//! with respect to the transaction-id uniqueness invariant. Both shipped
//! stores hold one lock across the check and the insert.
//!
//! The journal is hash-chained in the manner of an audit log: each entry
//! links to its predecessor, so tampering or truncation is detectable with
//! [`verify_chain`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod journal;
pub mod records;
pub mod store;

pub use error::StoreError;
pub use journal::{read_journal, verify_chain, ChainReport, TransactionJournal};
pub use records::{
    LogRecord, LogStatus, Platform, PurchaseStatus, RecordOutcome, TransactionLogEntry,
    VerifiedPurchase,
};
pub use store::{EntitlementStore, FileStore, MemoryStore};
