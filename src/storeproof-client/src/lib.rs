//! # storeproof-client
//!
//! Device-side purchase lifecycle for storeproof.
//!
//! The platform commerce SDK delivers purchase callbacks as events on a
//! channel. The [`PurchaseController`] drains that channel, guards against
//! double submission with an in-memory [`guard::SubmissionGuard`], submits
//! each claim to the server for verification, and finalizes the transaction
//! with the platform exactly once per delivered event on every terminal
//! outcome.
//!
//! The guard is deliberately lost on restart: cross-restart correctness is
//! the server ledger's job, not the client's.

#![warn(clippy::all)]

pub mod commerce;
pub mod controller;
pub mod error;
pub mod guard;
pub mod restore;
pub mod transport;

pub use commerce::{event_channel, CommerceSdk, PurchaseEvent, SdkError};
pub use controller::{ControllerConfig, PurchaseController, PurchaseOutcome};
pub use error::ClientError;
pub use guard::{Admission, SubmissionGuard};
pub use restore::{RestoreError, RestoreReconciler, RestoreSummary};
pub use transport::{HttpSubmitter, LocalSubmitter, PurchaseSubmitter, TransportError};
