//! # storeproof-core
//!
//! Server-side purchase verification for storeproof: resolve a claimed
//! product against the catalog, verify the proof-of-purchase with the
//! originating platform's protocol, and record the entitlement exactly once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   PurchaseOrchestrator                        │
//! │                                                               │
//! │  ┌─────────────┐  ┌────────────────┐  ┌──────────────────┐  │
//! │  │ SessionAuth │  │ CatalogLookup  │  │  ProofVerifier    │  │
//! │  │ (fail fast) │  │ (read-only)    │  │  app_store / play │  │
//! │  └─────────────┘  └────────────────┘  └──────────────────┘  │
//! │                           │                                   │
//! │                           ▼                                   │
//! │  ┌──────────────────────────────────────────────────┐        │
//! │  │            EntitlementStore (ledger)              │        │
//! │  │       atomic record_if_absent by transaction     │        │
//! │  └──────────────────────────────────────────────────┘        │
//! │                           │                                   │
//! │                           ▼                                   │
//! │  ┌──────────────────────────────────────────────────┐        │
//! │  │      TransactionJournal (append-only, chained)    │        │
//! │  └──────────────────────────────────────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Correctness Properties
//!
//! - **Idempotent**: redelivered claims converge on the one recorded row
//! - **Untrusting**: product and transaction ids come from the verified
//!   proof, never from caller-supplied fields
//! - **Fail-closed**: any verification doubt rejects the claim; only the
//!   journal is best-effort

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod receipt;
pub mod types;

pub use auth::{AuthError, SessionAuth, StaticTokenAuth};
pub use catalog::{CatalogError, CatalogItem, CatalogLookup, MemoryCatalog};
pub use config::StoreproofConfig;
pub use error::PurchaseError;
pub use orchestrator::PurchaseOrchestrator;
pub use receipt::{ProofVerifier, ReceiptError, ReceiptVerifier, VerificationOutcome};
pub use types::{ErrorKind, PurchaseClaim, SubmitPurchaseRequest, SubmitPurchaseResponse};

// Re-exported so callers need only this crate for the wire contract.
pub use storeproof_ledger::{Platform, VerifiedPurchase};
