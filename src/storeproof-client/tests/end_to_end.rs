//! Whole-system tests: controller and reconciler wired straight into a
//! real orchestrator through the in-process transport.
//!
//! Covers the full data/control flow — commerce SDK event, submission,
//! catalog lookup, proof verification, ledger write, finalize — and the
//! restore path replaying held purchases as idempotent successes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::rand_core::OsRng;

use storeproof_client::{
    CommerceSdk, ControllerConfig, PurchaseController, PurchaseEvent, PurchaseOutcome,
    LocalSubmitter, RestoreReconciler, SdkError,
};
use storeproof_core::receipt::app_store::{JwsHeader, TransactionClaims, TransactionEnvironment};
use storeproof_core::receipt::{AppStoreVerifier, Es256Verifier, ReceiptVerifier};
use storeproof_core::receipt::{PlayClient, PlayCredentials};
use storeproof_core::{
    CatalogItem, MemoryCatalog, Platform, PurchaseClaim, PurchaseOrchestrator, StaticTokenAuth,
};
use storeproof_ledger::{EntitlementStore, MemoryStore, TransactionJournal};

const BUNDLE_ID: &str = "com.storeproof.reader";

fn base64url(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn signed_proof(key: &SigningKey, product_id: &str, transaction_id: &str) -> String {
    let header = JwsHeader {
        alg: "ES256".into(),
        kid: None,
    };
    let claims = TransactionClaims {
        transaction_id: transaction_id.into(),
        original_transaction_id: None,
        product_id: product_id.into(),
        bundle_id: BUNDLE_ID.into(),
        purchase_date: Some(1_754_438_400_000),
        quantity: 1,
        environment: TransactionEnvironment::Production,
    };

    let signing_input = format!(
        "{}.{}",
        base64url(&serde_json::to_vec(&header).unwrap()),
        base64url(&serde_json::to_vec(&claims).unwrap())
    );
    let signature: Signature = key.sign(signing_input.as_bytes());
    format!("{signing_input}.{}", base64url(&signature.to_bytes().to_vec()))
}

/// SDK fake holding a scripted purchase history.
struct FakeSdk {
    held: Mutex<Vec<PurchaseClaim>>,
    finalized: Mutex<Vec<String>>,
}

impl FakeSdk {
    fn new() -> Self {
        Self {
            held: Mutex::new(vec![]),
            finalized: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl CommerceSdk for FakeSdk {
    async fn begin_purchase(&self, _product_id: &str) -> Result<(), SdkError> {
        Ok(())
    }

    async fn finalize(&self, transaction_id: &str) -> Result<(), SdkError> {
        self.finalized.lock().unwrap().push(transaction_id.to_string());
        Ok(())
    }

    async fn held_purchases(&self) -> Result<Vec<PurchaseClaim>, SdkError> {
        Ok(self.held.lock().unwrap().clone())
    }
}

struct World {
    sdk: Arc<FakeSdk>,
    controller: PurchaseController,
    reconciler: RestoreReconciler,
    store: Arc<MemoryStore>,
    signing_key: SigningKey,
    item: CatalogItem,
}

fn world() -> World {
    let signing_key = SigningKey::random(&mut OsRng);
    let public = signing_key.verifying_key().to_encoded_point(false);
    let es256 = Es256Verifier::from_sec1_bytes(public.as_bytes()).unwrap();

    let auth = Arc::new(StaticTokenAuth::new());
    auth.grant("tok-1", "user-1");

    let item = CatalogItem {
        catalog_id: "cat-1".into(),
        product_id: "p-1".into(),
        price: 1000,
        currency: "USD".into(),
        purchasable: true,
    };
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.insert(item.clone());

    // Real dispatching verifier; the Play client points at an endpoint no
    // test ever reaches (all test claims are App Store claims).
    let verifier = Arc::new(ReceiptVerifier::new(
        AppStoreVerifier::new(Arc::new(es256), BUNDLE_ID, false),
        PlayClient::new(
            "https://androidpublisher.invalid",
            BUNDLE_ID,
            PlayCredentials {
                bearer_token: "unused".into(),
            },
            std::time::Duration::from_secs(1),
        )
        .unwrap(),
    ));

    let store = Arc::new(MemoryStore::new());
    let orchestrator = Arc::new(PurchaseOrchestrator::new(
        auth,
        catalog,
        verifier,
        store.clone(),
        Arc::new(TransactionJournal::in_memory()),
    ));

    let sdk = Arc::new(FakeSdk::new());
    let submitter = Arc::new(LocalSubmitter::new(orchestrator));
    let controller = PurchaseController::new(
        sdk.clone(),
        submitter.clone(),
        ControllerConfig::default(),
    );
    controller.sign_in("tok-1");
    let reconciler = RestoreReconciler::new(sdk.clone(), submitter);

    World {
        sdk,
        controller,
        reconciler,
        store,
        signing_key,
        item,
    }
}

#[tokio::test]
async fn purchase_flows_from_tap_to_entitlement() {
    let w = world();

    w.controller.initiate_purchase(&w.item).await.unwrap();

    let claim = PurchaseClaim {
        transaction_id: "tx-1".into(),
        product_id: "p-1".into(),
        raw_proof: signed_proof(&w.signing_key, "p-1", "tx-1"),
        platform: Platform::AppStore,
    };
    let outcome = w.controller.handle_event(PurchaseEvent::Completed(claim)).await;

    match outcome {
        PurchaseOutcome::Verified {
            purchase,
            already_recorded,
        } => {
            assert!(!already_recorded);
            assert_eq!(purchase.price, 1000);
            assert_eq!(purchase.user_id, "user-1");
        }
        other => panic!("expected verified, got {other:?}"),
    }

    assert_eq!(w.store.count().await.unwrap(), 1);
    assert_eq!(w.sdk.finalized.lock().unwrap().as_slice(), ["tx-1"]);
}

#[tokio::test]
async fn forged_proof_is_rejected_but_finalized() {
    let w = world();
    let attacker_key = SigningKey::random(&mut OsRng);

    let claim = PurchaseClaim {
        transaction_id: "tx-forged".into(),
        product_id: "p-1".into(),
        raw_proof: signed_proof(&attacker_key, "p-1", "tx-forged"),
        platform: Platform::AppStore,
    };
    let outcome = w.controller.handle_event(PurchaseEvent::Completed(claim)).await;

    assert!(matches!(outcome, PurchaseOutcome::Rejected { .. }));
    assert_eq!(w.store.count().await.unwrap(), 0);
    // Terminal rejection still stops the platform redelivering.
    assert_eq!(w.sdk.finalized.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn restore_replays_history_into_idempotent_successes() {
    let w = world();

    // One purchase already verified this session...
    let recorded = PurchaseClaim {
        transaction_id: "tx-old".into(),
        product_id: "p-1".into(),
        raw_proof: signed_proof(&w.signing_key, "p-1", "tx-old"),
        platform: Platform::AppStore,
    };
    let outcome = w
        .controller
        .handle_event(PurchaseEvent::Completed(recorded.clone()))
        .await;
    assert!(matches!(outcome, PurchaseOutcome::Verified { .. }));

    // ...and the platform still holds it plus one the ledger never saw and
    // one with a proof that cannot verify.
    let fresh = PurchaseClaim {
        transaction_id: "tx-new".into(),
        product_id: "p-1".into(),
        raw_proof: signed_proof(&w.signing_key, "p-1", "tx-new"),
        platform: Platform::AppStore,
    };
    let broken = PurchaseClaim {
        transaction_id: "tx-broken".into(),
        product_id: "p-1".into(),
        raw_proof: "not-a-jws".into(),
        platform: Platform::AppStore,
    };
    *w.sdk.held.lock().unwrap() = vec![recorded, fresh, broken];

    let summary = w.reconciler.restore("tok-1").await.unwrap();
    assert_eq!(summary.restored, 2);
    assert_eq!(summary.failed, 1);

    // tx-old was replayed as an idempotent success: still one row for it.
    assert_eq!(w.store.count().await.unwrap(), 2);
}
