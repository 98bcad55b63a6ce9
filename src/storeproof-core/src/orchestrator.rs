//! Purchase orchestrator: one submission, one decision, one journal entry.
//!
//! Each claim moves through a fixed pipeline:
//!
//! ```text
//! RECEIVED -> DUPLICATE_CHECK -> {ALREADY_RECORDED | CATALOG_LOOKUP}
//! CATALOG_LOOKUP -> {NOT_FOUND | VERIFYING}
//! VERIFYING -> {VERIFICATION_FAILED | PRODUCT_MATCH_CHECK}
//! PRODUCT_MATCH_CHECK -> {MISMATCH | RECORDING}
//! RECORDING -> RECORDED
//! ```
//!
//! Unauthenticated callers are rejected before any external call. The
//! duplicate pre-check only short-circuits redelivery to save a verifier
//! call — the store's atomic insert is the correctness guarantee, so two
//! concurrent submissions for one transaction id still converge on a single
//! row with both callers seeing success.
//!
//! Every terminal outcome, success or failure, lands in the transaction
//! journal exactly once. Transient faults are not terminal: the claim stays
//! un-finalized on the platform and the client retries the same transaction
//! id. A journal write failure is swallowed and surfaced through
//! observability only — it never fails a purchase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::auth::SessionAuth;
use crate::catalog::CatalogLookup;
use crate::config::StoreproofConfig;
use crate::error::PurchaseError;
use crate::receipt::{
    AppStoreVerifier, PayloadVerifier, PlayClient, PlayCredentials, ProofVerifier,
    ReceiptVerifier,
};
use crate::types::{SubmitPurchaseRequest, SubmitPurchaseResponse};
use storeproof_ledger::{
    EntitlementStore, FileStore, LogRecord, LogStatus, MemoryStore, PurchaseStatus, RecordOutcome,
    TransactionJournal, VerifiedPurchase,
};

/// Orchestrates catalog lookup, proof verification, and entitlement
/// recording for submitted purchase claims.
pub struct PurchaseOrchestrator {
    auth: Arc<dyn SessionAuth>,
    catalog: Arc<dyn CatalogLookup>,
    verifier: Arc<dyn ProofVerifier>,
    store: Arc<dyn EntitlementStore>,
    journal: Arc<TransactionJournal>,
    journal_failures: AtomicU64,
}

/// How a claim reached a successful terminal state.
enum Granted {
    Recorded(VerifiedPurchase),
    AlreadyRecorded(VerifiedPurchase),
}

impl PurchaseOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        auth: Arc<dyn SessionAuth>,
        catalog: Arc<dyn CatalogLookup>,
        verifier: Arc<dyn ProofVerifier>,
        store: Arc<dyn EntitlementStore>,
        journal: Arc<TransactionJournal>,
    ) -> Self {
        Self {
            auth,
            catalog,
            verifier,
            store,
            journal,
            journal_failures: AtomicU64::new(0),
        }
    }

    /// Assemble an orchestrator from configuration.
    ///
    /// Builds the two platform verifiers from the configured identities
    /// and credentials, and opens file-backed persistence when paths are
    /// configured (memory otherwise).
    ///
    /// # Errors
    ///
    /// Returns an error if the Play client cannot be built or persistence
    /// cannot be opened.
    pub fn from_config(
        config: &StoreproofConfig,
        auth: Arc<dyn SessionAuth>,
        catalog: Arc<dyn CatalogLookup>,
        payload_verifier: Arc<dyn PayloadVerifier>,
        play_credentials: PlayCredentials,
    ) -> Result<Self, PurchaseError> {
        info!(
            bundle_id = %config.bundle_id,
            package_name = %config.package_name,
            play_endpoint = %config.play_endpoint,
            persistent = config.ledger_dir.is_some(),
            "assembling purchase orchestrator"
        );

        let app_store = AppStoreVerifier::new(
            payload_verifier,
            config.bundle_id.clone(),
            config.accept_sandbox,
        );
        let play = PlayClient::new(
            &config.play_endpoint,
            &config.package_name,
            play_credentials,
            config.timeout,
        )?;
        let verifier: Arc<dyn ProofVerifier> = Arc::new(ReceiptVerifier::new(app_store, play));

        let store: Arc<dyn EntitlementStore> = match &config.ledger_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None => Arc::new(MemoryStore::new()),
        };
        let journal = match &config.journal_path {
            Some(path) => TransactionJournal::open(path)?,
            None => TransactionJournal::in_memory(),
        };

        Ok(Self::new(auth, catalog, verifier, store, Arc::new(journal)))
    }

    /// Submit a purchase claim for verification and recording.
    ///
    /// Never returns a transport-level error: every outcome, including
    /// rejection, is a well-formed [`SubmitPurchaseResponse`].
    #[instrument(
        skip_all,
        fields(
            transaction_id = %request.transaction_id,
            product_id = %request.product_id,
            platform = %request.platform,
        )
    )]
    pub async fn submit(&self, request: SubmitPurchaseRequest) -> SubmitPurchaseResponse {
        // Reject unauthenticated callers before any external call. No user
        // is known here, so nothing is journaled.
        let user_id = match self.auth.authenticate(&request.session_token).await {
            Ok(user_id) => user_id,
            Err(_) => {
                warn!("rejecting unauthenticated submission");
                return SubmitPurchaseResponse::Failure {
                    kind: PurchaseError::Unauthorized.kind(),
                    message: PurchaseError::Unauthorized.to_string(),
                };
            }
        };

        match self.process(&user_id, &request).await {
            Ok(Granted::Recorded(purchase)) => {
                info!(
                    purchase_id = %purchase.purchase_id,
                    user_id = %user_id,
                    price = purchase.price,
                    currency = %purchase.currency,
                    "purchase verified and recorded"
                );
                self.journal_terminal(&user_id, &request, LogStatus::Success, None, Some(&purchase));
                SubmitPurchaseResponse::Success {
                    purchase,
                    already_recorded: false,
                }
            }
            Ok(Granted::AlreadyRecorded(purchase)) => {
                debug!(
                    purchase_id = %purchase.purchase_id,
                    "redelivered transaction, reporting existing row"
                );
                self.journal_terminal(
                    &user_id,
                    &request,
                    LogStatus::Success,
                    Some("already_recorded".into()),
                    Some(&purchase),
                );
                SubmitPurchaseResponse::Success {
                    purchase,
                    already_recorded: true,
                }
            }
            Err(error) if error.is_retryable() => {
                // Not a terminal state: the claim stays un-finalized and the
                // client retries the same transaction id. Not journaled.
                warn!(error = %error, "submission hit a transient fault");
                SubmitPurchaseResponse::Failure {
                    kind: error.kind(),
                    message: error.to_string(),
                }
            }
            Err(error) => {
                warn!(kind = %error.kind(), error = %error, "purchase claim rejected");
                self.journal_terminal(
                    &user_id,
                    &request,
                    LogStatus::Failure,
                    Some(error.kind().as_str().into()),
                    None,
                );
                SubmitPurchaseResponse::Failure {
                    kind: error.kind(),
                    message: error.to_string(),
                }
            }
        }
    }

    /// Number of journal writes that have been swallowed.
    #[must_use]
    pub fn journal_failures(&self) -> u64 {
        self.journal_failures.load(Ordering::Relaxed)
    }

    async fn process(
        &self,
        user_id: &str,
        request: &SubmitPurchaseRequest,
    ) -> Result<Granted, PurchaseError> {
        // DUPLICATE_CHECK: fast pre-check to skip re-verification of
        // redelivered claims.
        if let Some(existing) = self.store.find_by_transaction(&request.transaction_id).await? {
            return Ok(Granted::AlreadyRecorded(existing));
        }

        // CATALOG_LOOKUP: the verifier must not run for unknown products.
        let item = self.catalog.resolve(&request.product_id).await?;
        if !item.purchasable {
            return Err(PurchaseError::ProductNotFound {
                product_id: request.product_id.clone(),
            });
        }

        // VERIFYING: canonical ids come from the verified proof.
        let outcome = self.verifier.verify(&request.claim()).await?;

        // PRODUCT_MATCH_CHECK against the catalog-resolved product.
        if outcome.product_id != item.product_id {
            return Err(PurchaseError::ProductMismatch {
                claimed: item.product_id.clone(),
                verified: outcome.product_id,
            });
        }

        debug!(
            canonical_transaction_id = %outcome.transaction_id,
            purchased_at = ?outcome.purchased_at,
            "proof verified, recording entitlement"
        );

        // RECORDING: the atomic insert is the correctness backstop for
        // concurrent redelivery.
        let now = chrono::Utc::now().timestamp();
        let purchase = VerifiedPurchase {
            purchase_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: outcome.transaction_id,
            user_id: user_id.to_string(),
            catalog_id: item.catalog_id,
            product_id: item.product_id,
            price: item.price,
            currency: item.currency,
            platform: request.platform,
            status: PurchaseStatus::Verified,
            verified_at: now,
            created_at: now,
        };

        match self.store.record_if_absent(purchase).await? {
            RecordOutcome::Created(row) => Ok(Granted::Recorded(row)),
            RecordOutcome::AlreadyRecorded(row) => Ok(Granted::AlreadyRecorded(row)),
        }
    }

    /// Append the one journal entry a terminal state produces.
    ///
    /// Best-effort: failures are counted and logged, never propagated.
    fn journal_terminal(
        &self,
        user_id: &str,
        request: &SubmitPurchaseRequest,
        status: LogStatus,
        detail: Option<String>,
        purchase: Option<&VerifiedPurchase>,
    ) {
        let record = LogRecord {
            transaction_id: purchase
                .map(|p| p.transaction_id.clone())
                .unwrap_or_else(|| request.transaction_id.clone()),
            user_id: user_id.to_string(),
            catalog_id: purchase.map(|p| p.catalog_id.clone()).or_else(|| request.catalog_id.clone()),
            product_id: request.product_id.clone(),
            price: purchase.map(|p| p.price).or(request.claimed_price),
            currency: purchase
                .map(|p| p.currency.clone())
                .or_else(|| request.claimed_currency.clone()),
            status,
            detail,
            proof_digest: LogRecord::digest_proof(&request.raw_proof),
        };

        if let Err(error) = self.journal.append(record) {
            self.journal_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                transaction_id = %request.transaction_id,
                error = %error,
                "transaction journal write failed"
            );
        }
    }
}
