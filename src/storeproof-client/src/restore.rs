//! Restore reconciler.
//!
//! Re-derives local entitlement state from the platform's authoritative
//! purchase history: every purchase the platform still attributes to this
//! account is replayed through the normal verification path. Used after a
//! reinstall or on a new device, where the client has no local state but
//! the server ledger does — replays of recorded transactions come back as
//! idempotent successes.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::commerce::CommerceSdk;
use crate::transport::PurchaseSubmitter;
use storeproof_core::{ErrorKind, PurchaseClaim, SubmitPurchaseRequest, SubmitPurchaseResponse};

/// Aggregate result of a restore pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreSummary {
    /// Purchases that verified (or were already recorded).
    pub restored: u32,
    /// Purchases that failed verification or could not be submitted.
    pub failed: u32,
}

/// Errors that abort a restore pass entirely.
///
/// Individual item failures never abort the pass; they are only counted.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// The caller has no live session.
    #[error("caller is not authenticated")]
    Unauthorized,

    /// The platform's held-purchases enumeration itself failed.
    #[error("could not enumerate held purchases: {0}")]
    Enumeration(String),
}

/// Replays held purchases through the verification path.
pub struct RestoreReconciler {
    sdk: Arc<dyn CommerceSdk>,
    submitter: Arc<dyn PurchaseSubmitter>,
}

impl RestoreReconciler {
    /// Create a reconciler over an SDK handle and a submission transport.
    pub fn new(sdk: Arc<dyn CommerceSdk>, submitter: Arc<dyn PurchaseSubmitter>) -> Self {
        Self { sdk, submitter }
    }

    /// Restore all purchases the platform holds for this account.
    ///
    /// Each held purchase is independently submitted and then finalized
    /// with the platform regardless of its individual outcome; one item's
    /// failure never aborts the rest.
    ///
    /// # Errors
    ///
    /// `Unauthorized` when no session token is presented or the server
    /// rejects the session; `Enumeration` when the held-purchases listing
    /// itself fails.
    pub async fn restore(&self, session_token: &str) -> Result<RestoreSummary, RestoreError> {
        if session_token.is_empty() {
            return Err(RestoreError::Unauthorized);
        }

        let held = self
            .sdk
            .held_purchases()
            .await
            .map_err(|e| RestoreError::Enumeration(e.to_string()))?;

        info!(held = held.len(), "starting restore pass");

        let mut summary = RestoreSummary::default();
        for claim in held {
            match self.submit(session_token, &claim).await {
                Outcome::Restored => {
                    summary.restored += 1;
                    self.finalize(&claim).await;
                }
                Outcome::Failed => {
                    summary.failed += 1;
                    self.finalize(&claim).await;
                }
                Outcome::Unauthorized => {
                    // A dead session fails every remaining item the same
                    // way; surface it instead of counting.
                    return Err(RestoreError::Unauthorized);
                }
            }
        }

        info!(
            restored = summary.restored,
            failed = summary.failed,
            "restore pass finished"
        );
        Ok(summary)
    }

    async fn submit(&self, session_token: &str, claim: &PurchaseClaim) -> Outcome {
        let request = SubmitPurchaseRequest {
            session_token: session_token.to_string(),
            catalog_id: None,
            product_id: claim.product_id.clone(),
            transaction_id: claim.transaction_id.clone(),
            raw_proof: claim.raw_proof.clone(),
            platform: claim.platform,
            claimed_price: None,
            claimed_currency: None,
        };

        match self.submitter.submit(request).await {
            Ok(SubmitPurchaseResponse::Success { .. }) => Outcome::Restored,
            Ok(SubmitPurchaseResponse::Failure { kind, message }) => {
                if kind == ErrorKind::Unauthorized {
                    return Outcome::Unauthorized;
                }
                warn!(
                    transaction_id = %claim.transaction_id,
                    kind = %kind,
                    message = %message,
                    "held purchase failed verification"
                );
                Outcome::Failed
            }
            Err(error) => {
                warn!(
                    transaction_id = %claim.transaction_id,
                    error = %error,
                    "held purchase could not be submitted"
                );
                Outcome::Failed
            }
        }
    }

    async fn finalize(&self, claim: &PurchaseClaim) {
        if let Err(error) = self.sdk.finalize(&claim.transaction_id).await {
            warn!(
                transaction_id = %claim.transaction_id,
                error = %error,
                "finalize failed during restore"
            );
        }
    }
}

enum Outcome {
    Restored,
    Failed,
    Unauthorized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::commerce::SdkError;
    use crate::transport::TransportError;
    use storeproof_core::Platform;
    use storeproof_ledger::{PurchaseStatus, VerifiedPurchase};

    struct StubSdk {
        held: Result<Vec<PurchaseClaim>, String>,
        finalized: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CommerceSdk for StubSdk {
        async fn begin_purchase(&self, _product_id: &str) -> Result<(), SdkError> {
            Ok(())
        }

        async fn finalize(&self, transaction_id: &str) -> Result<(), SdkError> {
            self.finalized.lock().unwrap().push(transaction_id.to_string());
            Ok(())
        }

        async fn held_purchases(&self) -> Result<Vec<PurchaseClaim>, SdkError> {
            self.held.clone().map_err(SdkError::new)
        }
    }

    /// Submitter that fails transactions whose id contains "bad".
    struct SelectiveSubmitter;

    #[async_trait]
    impl PurchaseSubmitter for SelectiveSubmitter {
        async fn submit(
            &self,
            request: SubmitPurchaseRequest,
        ) -> Result<SubmitPurchaseResponse, TransportError> {
            if request.transaction_id.contains("bad") {
                return Ok(SubmitPurchaseResponse::Failure {
                    kind: ErrorKind::VerificationFailed,
                    message: "proof rejected".into(),
                });
            }
            Ok(SubmitPurchaseResponse::Success {
                purchase: VerifiedPurchase {
                    purchase_id: format!("purchase-{}", request.transaction_id),
                    transaction_id: request.transaction_id,
                    user_id: "user-1".into(),
                    catalog_id: "cat-1".into(),
                    product_id: request.product_id,
                    price: 1000,
                    currency: "USD".into(),
                    platform: request.platform,
                    status: PurchaseStatus::Verified,
                    verified_at: 1754438400,
                    created_at: 1754438400,
                },
                already_recorded: true,
            })
        }
    }

    fn claim(transaction_id: &str) -> PurchaseClaim {
        PurchaseClaim {
            transaction_id: transaction_id.into(),
            product_id: "p-1".into(),
            raw_proof: "proof".into(),
            platform: Platform::GooglePlay,
        }
    }

    #[tokio::test]
    async fn partial_failures_are_counted_not_raised() {
        let sdk = Arc::new(StubSdk {
            held: Ok(vec![claim("tx-1"), claim("tx-bad"), claim("tx-2")]),
            finalized: Mutex::new(vec![]),
        });
        let reconciler = RestoreReconciler::new(sdk.clone(), Arc::new(SelectiveSubmitter));

        let summary = reconciler.restore("tok-1").await.unwrap();
        assert_eq!(summary.restored, 2);
        assert_eq!(summary.failed, 1);

        // Every item was finalized, failures included.
        assert_eq!(sdk.finalized.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_history_restores_nothing() {
        let sdk = Arc::new(StubSdk {
            held: Ok(vec![]),
            finalized: Mutex::new(vec![]),
        });
        let reconciler = RestoreReconciler::new(sdk, Arc::new(SelectiveSubmitter));

        let summary = reconciler.restore("tok-1").await.unwrap();
        assert_eq!(summary, RestoreSummary::default());
    }

    #[tokio::test]
    async fn enumeration_failure_raises() {
        let sdk = Arc::new(StubSdk {
            held: Err("billing service unavailable".into()),
            finalized: Mutex::new(vec![]),
        });
        let reconciler = RestoreReconciler::new(sdk, Arc::new(SelectiveSubmitter));

        assert!(matches!(
            reconciler.restore("tok-1").await,
            Err(RestoreError::Enumeration(_))
        ));
    }

    #[tokio::test]
    async fn missing_session_raises_before_enumeration() {
        let sdk = Arc::new(StubSdk {
            held: Err("should never be called".into()),
            finalized: Mutex::new(vec![]),
        });
        let reconciler = RestoreReconciler::new(sdk, Arc::new(SelectiveSubmitter));

        assert!(matches!(
            reconciler.restore("").await,
            Err(RestoreError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn dead_session_raises_unauthorized() {
        struct RejectingSubmitter;

        #[async_trait]
        impl PurchaseSubmitter for RejectingSubmitter {
            async fn submit(
                &self,
                _request: SubmitPurchaseRequest,
            ) -> Result<SubmitPurchaseResponse, TransportError> {
                Ok(SubmitPurchaseResponse::Failure {
                    kind: ErrorKind::Unauthorized,
                    message: "session expired".into(),
                })
            }
        }

        let sdk = Arc::new(StubSdk {
            held: Ok(vec![claim("tx-1"), claim("tx-2")]),
            finalized: Mutex::new(vec![]),
        });
        let reconciler = RestoreReconciler::new(sdk.clone(), Arc::new(RejectingSubmitter));

        assert!(matches!(
            reconciler.restore("stale-token").await,
            Err(RestoreError::Unauthorized)
        ));
        // Nothing was finalized on the abort path.
        assert!(sdk.finalized.lock().unwrap().is_empty());
    }
}
