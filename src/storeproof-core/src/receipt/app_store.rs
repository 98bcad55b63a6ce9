//! App Store signed-transaction verification.
//!
//! The proof is a JWS in compact form: `header.payload.signature`. The
//! verifier decodes it without contacting any remote service — the payload
//! is a self-contained signed assertion — and recovers the product id and
//! canonical transaction id from the verified payload, never from the
//! caller.
//!
//! ## Checks, in order
//!
//! 1. Format: three base64url parts, JSON header and payload
//! 2. Signature: ES256 over `header.payload`, via [`PayloadVerifier`]
//! 3. Application identity: payload bundle id equals the deployment's
//! 4. Environment: sandbox payloads accepted only when configured
//! 5. Product: the caller's claimed product id equals the payload's —
//!    a mismatch is an error, never silently corrected

use std::sync::Arc;

use base64::Engine;
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::receipt::{ReceiptError, VerificationOutcome};

/// JWS header of a signed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwsHeader {
    /// Signature algorithm identifier.
    pub alg: String,
    /// Key id, when the signer provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// Environment the transaction was signed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionEnvironment {
    /// Live storefront.
    #[default]
    Production,
    /// Test storefront; accepted only when configured.
    Sandbox,
}

impl std::fmt::Display for TransactionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Production => write!(f, "Production"),
            Self::Sandbox => write!(f, "Sandbox"),
        }
    }
}

/// Claims of a signed transaction payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionClaims {
    /// Canonical transaction id.
    pub transaction_id: String,
    /// Original transaction id, present on re-downloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,
    /// Product the transaction is for.
    pub product_id: String,
    /// Application the transaction belongs to.
    pub bundle_id: String,
    /// Purchase time in milliseconds since the epoch.
    #[serde(default)]
    pub purchase_date: Option<i64>,
    /// Quantity purchased.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Signing environment.
    #[serde(default)]
    pub environment: TransactionEnvironment,
}

fn default_quantity() -> u32 {
    1
}

/// A parsed, not-yet-verified signed transaction.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// JWS header.
    pub header: JwsHeader,
    /// Decoded payload claims.
    pub claims: TransactionClaims,
    /// Signature bytes.
    signature: Vec<u8>,
    /// Raw signing input (`header.payload`) for verification.
    signing_input: String,
}

impl SignedTransaction {
    /// Parse a compact JWS string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the part count, base64, or JSON is wrong.
    pub fn parse(token: &str) -> Result<Self, ReceiptError> {
        let parts: Vec<&str> = token.split('.').collect();

        if parts.len() != 3 {
            return Err(ReceiptError::InvalidFormat(format!(
                "expected 3 JWS parts, got {}",
                parts.len()
            )));
        }

        let header_bytes = base64url_decode(parts[0])?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| ReceiptError::InvalidFormat(format!("header: {e}")))?;

        let payload_bytes = base64url_decode(parts[1])?;
        let claims: TransactionClaims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| ReceiptError::InvalidFormat(format!("payload: {e}")))?;

        let signature = base64url_decode(parts[2])?;
        let signing_input = format!("{}.{}", parts[0], parts[1]);

        Ok(Self {
            header,
            claims,
            signature,
            signing_input,
        })
    }

    /// The signing input (`header.payload`) covered by the signature.
    #[must_use]
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }
}

/// Decode a base64url (unpadded) string.
fn base64url_decode(input: &str) -> Result<Vec<u8>, ReceiptError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|e| ReceiptError::InvalidFormat(format!("base64: {e}")))
}

/// Signature check over a signed transaction's signing input.
///
/// The production implementation is [`Es256Verifier`]; tests inject fakes.
pub trait PayloadVerifier: Send + Sync {
    /// Verify `signature` over `signing_input`.
    ///
    /// Returns `Ok(false)` on a well-formed but wrong signature, and an
    /// error only when the inputs cannot be interpreted at all.
    ///
    /// # Errors
    ///
    /// Returns `Signature` if the signature bytes are malformed.
    fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<bool, ReceiptError>;
}

/// ES256 (ECDSA P-256) payload verifier.
pub struct Es256Verifier {
    key: VerifyingKey,
}

impl Es256Verifier {
    /// Create a verifier from a SEC1-encoded public key.
    ///
    /// The key is provisioned out of band from the platform's signing
    /// certificate chain.
    ///
    /// # Errors
    ///
    /// Returns `Signature` if the key bytes are invalid.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, ReceiptError> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| ReceiptError::Signature(format!("invalid public key: {e}")))?;
        Ok(Self { key })
    }
}

impl PayloadVerifier for Es256Verifier {
    fn verify(&self, signing_input: &[u8], signature: &[u8]) -> Result<bool, ReceiptError> {
        let sig = Signature::from_slice(signature)
            .map_err(|e| ReceiptError::Signature(format!("invalid signature encoding: {e}")))?;

        match self.key.verify(signing_input, &sig) {
            Ok(()) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

/// App Store proof verifier.
pub struct AppStoreVerifier {
    verifier: Arc<dyn PayloadVerifier>,
    expected_bundle_id: String,
    accept_sandbox: bool,
}

impl AppStoreVerifier {
    /// Create a verifier bound to this deployment's bundle identity.
    pub fn new(
        verifier: Arc<dyn PayloadVerifier>,
        expected_bundle_id: impl Into<String>,
        accept_sandbox: bool,
    ) -> Self {
        Self {
            verifier,
            expected_bundle_id: expected_bundle_id.into(),
            accept_sandbox,
        }
    }

    /// Verify a raw signed-transaction proof against a claimed product id.
    ///
    /// # Errors
    ///
    /// See the module docs for the checks performed; any failed check is
    /// terminal for the claim.
    #[instrument(skip(self, raw_proof), fields(claimed_product_id = %claimed_product_id))]
    pub fn verify(
        &self,
        raw_proof: &str,
        claimed_product_id: &str,
    ) -> Result<VerificationOutcome, ReceiptError> {
        let signed = SignedTransaction::parse(raw_proof)?;

        let valid = self
            .verifier
            .verify(signed.signing_input().as_bytes(), &signed.signature)?;
        if !valid {
            return Err(ReceiptError::Signature(
                "payload signature does not verify".into(),
            ));
        }

        if signed.claims.bundle_id != self.expected_bundle_id {
            return Err(ReceiptError::BundleMismatch {
                expected: self.expected_bundle_id.clone(),
                found: signed.claims.bundle_id,
            });
        }

        if signed.claims.environment == TransactionEnvironment::Sandbox && !self.accept_sandbox {
            return Err(ReceiptError::Environment {
                found: signed.claims.environment.to_string(),
            });
        }

        // Canonical ids come from the verified payload; the claimed product
        // id is only cross-checked, never corrected.
        if signed.claims.product_id != claimed_product_id {
            return Err(ReceiptError::ProductMismatch {
                claimed: claimed_product_id.to_string(),
                verified: signed.claims.product_id,
            });
        }

        debug!(
            transaction_id = %signed.claims.transaction_id,
            product_id = %signed.claims.product_id,
            environment = %signed.claims.environment,
            "signed transaction verified"
        );

        Ok(VerificationOutcome {
            transaction_id: signed.claims.transaction_id,
            product_id: signed.claims.product_id,
            purchased_at: signed.claims.purchase_date.map(|ms| ms / 1000),
        })
    }
}
