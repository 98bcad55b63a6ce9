//! Client purchase controller.
//!
//! Drives the on-device purchase lifecycle: initiate, wait for the
//! platform callback, submit the claim for verification, finalize with
//! the platform.
//!
//! ## Finalization rules
//!
//! Finalize is called exactly once per delivered event on every terminal
//! outcome — success, already-recorded, or non-retryable rejection. An
//! un-finalized transaction is redelivered by the platform indefinitely and
//! blocks new purchases of the same product, so rejection must not skip it.
//! The one deliberate exception is a claim with no server decision after
//! the bounded transient retries: it is left un-finalized so the platform
//! redelivers it and the client retries the same transaction id later.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commerce::{CommerceSdk, PurchaseEvent};
use crate::error::ClientError;
use crate::guard::{Admission, SubmissionGuard};
use crate::transport::PurchaseSubmitter;
use storeproof_core::{
    CatalogItem, ErrorKind, PurchaseClaim, SubmitPurchaseRequest, SubmitPurchaseResponse,
    VerifiedPurchase,
};

/// Tuning for the purchase controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Extra submission attempts after a transient fault, for the same
    /// claim. The transaction id is never regenerated.
    pub max_transient_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: 2,
        }
    }
}

/// What the user sees for one purchase event.
#[derive(Debug, Clone)]
pub enum PurchaseOutcome {
    /// The entitlement is granted. `already_recorded` redeliveries are
    /// indistinguishable from fresh successes for the user.
    Verified {
        /// The recorded purchase.
        purchase: VerifiedPurchase,
        /// Whether the server had already recorded this transaction.
        already_recorded: bool,
    },
    /// Final rejection. Shown as "purchase failed"; retrying will not help.
    Rejected {
        /// Machine-readable failure kind.
        kind: ErrorKind,
        /// Human-readable detail.
        message: String,
    },
    /// No decision was reached; the claim stays un-finalized and the user
    /// may try again.
    Retryable {
        /// What went wrong.
        message: String,
    },
    /// Dropped: another verification is already in flight.
    Busy,
    /// Dropped: this transaction already went through this session. The
    /// redelivery was finalized again to stop the platform repeating it.
    Duplicate,
    /// The user closed the purchase UI. Not an error.
    Canceled {
        /// Product the user backed out of.
        product_id: String,
    },
    /// The platform itself could not complete the purchase.
    SdkFailed {
        /// Product the purchase was for.
        product_id: String,
        /// Platform-reported reason.
        message: String,
    },
}

impl PurchaseOutcome {
    /// Whether the user should be offered a retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Catalog context captured when the user initiated the purchase, echoed
/// into the submission as advisory fields.
struct PurchaseContext {
    catalog_id: String,
    price: u64,
    currency: String,
}

/// Result of the bounded submission loop.
enum SubmitAttempt {
    /// The server reached a decision (possibly a transient-kind failure on
    /// the final attempt).
    Decision(SubmitPurchaseResponse),
    /// No decision: every attempt died in transport.
    NoDecision(String),
}

/// Drives purchases end to end on the device.
pub struct PurchaseController {
    sdk: Arc<dyn CommerceSdk>,
    submitter: Arc<dyn PurchaseSubmitter>,
    guard: SubmissionGuard,
    session: RwLock<Option<String>>,
    pending: RwLock<HashMap<String, PurchaseContext>>,
    config: ControllerConfig,
}

impl PurchaseController {
    /// Create a controller over an SDK handle and a submission transport.
    pub fn new(
        sdk: Arc<dyn CommerceSdk>,
        submitter: Arc<dyn PurchaseSubmitter>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            sdk,
            submitter,
            guard: SubmissionGuard::new(),
            session: RwLock::new(None),
            pending: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Attach the signed-in user's session token.
    pub fn sign_in(&self, session_token: impl Into<String>) {
        if let Ok(mut session) = self.session.write() {
            *session = Some(session_token.into());
        }
    }

    /// Drop the session.
    pub fn sign_out(&self) {
        if let Ok(mut session) = self.session.write() {
            *session = None;
        }
    }

    fn session_token(&self) -> Option<String> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Open the platform purchase UI for a catalog item.
    ///
    /// The item's catalog id and displayed price are remembered and echoed
    /// into the eventual submission as advisory fields.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotSignedIn`] without a session, or the SDK's error
    /// if the purchase UI cannot be opened.
    pub async fn initiate_purchase(&self, item: &CatalogItem) -> Result<(), ClientError> {
        if self.session_token().is_none() {
            return Err(ClientError::NotSignedIn);
        }

        if let Ok(mut pending) = self.pending.write() {
            pending.insert(
                item.product_id.clone(),
                PurchaseContext {
                    catalog_id: item.catalog_id.clone(),
                    price: item.price,
                    currency: item.currency.clone(),
                },
            );
        }

        debug!(product_id = %item.product_id, "opening platform purchase UI");
        self.sdk.begin_purchase(&item.product_id).await?;
        Ok(())
    }

    /// Process one SDK event.
    pub async fn handle_event(&self, event: PurchaseEvent) -> PurchaseOutcome {
        match event {
            PurchaseEvent::Canceled { product_id } => {
                debug!(product_id = %product_id, "purchase canceled by user");
                self.clear_context(&product_id);
                PurchaseOutcome::Canceled { product_id }
            }
            PurchaseEvent::Failed {
                product_id,
                message,
            } => {
                warn!(product_id = %product_id, message = %message, "platform purchase failed");
                self.clear_context(&product_id);
                PurchaseOutcome::SdkFailed {
                    product_id,
                    message,
                }
            }
            PurchaseEvent::Completed(claim) => self.handle_claim(claim).await,
        }
    }

    /// Drain SDK events until the channel closes, forwarding each outcome.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<PurchaseEvent>,
        outcomes: mpsc::Sender<PurchaseOutcome>,
    ) {
        while let Some(event) = events.recv().await {
            let outcome = self.handle_event(event).await;
            if outcomes.send(outcome).await.is_err() {
                break;
            }
        }
    }

    async fn handle_claim(&self, claim: PurchaseClaim) -> PurchaseOutcome {
        let Some(session_token) = self.session_token() else {
            // Nothing to submit with. The claim stays un-finalized; the
            // platform redelivers it once a user is signed in.
            warn!(
                transaction_id = %claim.transaction_id,
                "purchase callback with no session, leaving un-finalized"
            );
            return PurchaseOutcome::Retryable {
                message: "no user is signed in".into(),
            };
        };

        match self.guard.begin(&claim.transaction_id) {
            Admission::Busy => {
                debug!(
                    transaction_id = %claim.transaction_id,
                    "verification already in flight, dropping callback"
                );
                PurchaseOutcome::Busy
            }
            Admission::AlreadySubmitted => {
                // Known-good transaction redelivered: just stop the
                // redelivery.
                self.finalize(&claim.transaction_id).await;
                PurchaseOutcome::Duplicate
            }
            Admission::Proceed => {
                let attempt = self.submit_with_retry(&session_token, &claim).await;
                self.settle(&claim, attempt).await
            }
        }
    }

    /// Turn the submission result into finalize/guard bookkeeping and a
    /// user-facing outcome. The in-flight flag is always released here.
    async fn settle(&self, claim: &PurchaseClaim, attempt: SubmitAttempt) -> PurchaseOutcome {
        match attempt {
            SubmitAttempt::Decision(SubmitPurchaseResponse::Success {
                purchase,
                already_recorded,
            }) => {
                self.finalize(&claim.transaction_id).await;
                self.guard.complete(&claim.transaction_id, true);
                self.clear_context(&claim.product_id);
                info!(
                    transaction_id = %claim.transaction_id,
                    purchase_id = %purchase.purchase_id,
                    already_recorded,
                    "purchase verified"
                );
                PurchaseOutcome::Verified {
                    purchase,
                    already_recorded,
                }
            }
            SubmitAttempt::Decision(SubmitPurchaseResponse::Failure { kind, message })
                if kind.is_retryable() =>
            {
                // The server never reached a terminal state; leave the
                // transaction un-finalized for redelivery.
                self.guard.complete(&claim.transaction_id, false);
                PurchaseOutcome::Retryable { message }
            }
            SubmitAttempt::Decision(SubmitPurchaseResponse::Failure { kind, message }) => {
                // Terminal rejection still finalizes: an un-finalized
                // transaction would be redelivered forever and block new
                // purchases of this product.
                self.finalize(&claim.transaction_id).await;
                self.guard.complete(&claim.transaction_id, false);
                self.clear_context(&claim.product_id);
                warn!(
                    transaction_id = %claim.transaction_id,
                    kind = %kind,
                    "purchase rejected"
                );
                PurchaseOutcome::Rejected { kind, message }
            }
            SubmitAttempt::NoDecision(message) => {
                self.guard.complete(&claim.transaction_id, false);
                PurchaseOutcome::Retryable { message }
            }
        }
    }

    async fn submit_with_retry(&self, session_token: &str, claim: &PurchaseClaim) -> SubmitAttempt {
        let request = self.build_request(session_token, claim);
        let attempts = self.config.max_transient_retries + 1;
        let mut last_message = String::new();

        for attempt in 0..attempts {
            match self.submitter.submit(request.clone()).await {
                Ok(SubmitPurchaseResponse::Failure { kind, message })
                    if kind.is_retryable() && attempt + 1 < attempts =>
                {
                    warn!(
                        transaction_id = %claim.transaction_id,
                        attempt = attempt + 1,
                        message = %message,
                        "transient rejection, retrying same claim"
                    );
                    last_message = message;
                }
                Ok(response) => return SubmitAttempt::Decision(response),
                Err(error) if attempt + 1 < attempts => {
                    warn!(
                        transaction_id = %claim.transaction_id,
                        attempt = attempt + 1,
                        error = %error,
                        "submission transport failed, retrying same claim"
                    );
                    last_message = error.to_string();
                }
                Err(error) => return SubmitAttempt::NoDecision(error.to_string()),
            }
        }

        SubmitAttempt::NoDecision(last_message)
    }

    fn build_request(&self, session_token: &str, claim: &PurchaseClaim) -> SubmitPurchaseRequest {
        let context = self
            .pending
            .read()
            .ok()
            .and_then(|pending| {
                pending.get(&claim.product_id).map(|c| {
                    (c.catalog_id.clone(), c.price, c.currency.clone())
                })
            });

        SubmitPurchaseRequest {
            session_token: session_token.to_string(),
            catalog_id: context.as_ref().map(|(catalog_id, _, _)| catalog_id.clone()),
            product_id: claim.product_id.clone(),
            transaction_id: claim.transaction_id.clone(),
            raw_proof: claim.raw_proof.clone(),
            platform: claim.platform,
            claimed_price: context.as_ref().map(|(_, price, _)| *price),
            claimed_currency: context.map(|(_, _, currency)| currency),
        }
    }

    fn clear_context(&self, product_id: &str) {
        if let Ok(mut pending) = self.pending.write() {
            pending.remove(product_id);
        }
    }

    /// Finalize with the platform, logging (not propagating) failures: the
    /// platform redelivers un-finalized transactions, and the duplicate
    /// path finalizes again on the next delivery.
    async fn finalize(&self, transaction_id: &str) {
        if let Err(error) = self.sdk.finalize(transaction_id).await {
            warn!(
                transaction_id = %transaction_id,
                error = %error,
                "finalize failed; platform will redeliver"
            );
        }
    }
}
