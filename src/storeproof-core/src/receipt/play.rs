//! Google Play purchase-status verification.
//!
//! Unlike the App Store path, a Play proof (the purchase token) says
//! nothing by itself: the authoritative answer lives behind the publisher
//! API's purchase-status endpoint. The client here performs that
//! server-to-server query with service credentials and accepts only the
//! purchased state — canceled and pending purchases are rejected.
//!
//! Status reads have no side effects at the platform, so the query is safe
//! to repeat after a crash or timeout.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::receipt::{ReceiptError, VerificationOutcome};

/// Purchase state: the purchase completed.
pub const PURCHASE_STATE_PURCHASED: i64 = 0;
/// Purchase state: the purchase was canceled.
pub const PURCHASE_STATE_CANCELED: i64 = 1;
/// Purchase state: the purchase is pending user action.
pub const PURCHASE_STATE_PENDING: i64 = 2;

/// Service credentials for the publisher API, provisioned out of band.
#[derive(Clone)]
pub struct PlayCredentials {
    /// OAuth bearer token of the service account.
    pub bearer_token: String,
}

impl std::fmt::Debug for PlayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayCredentials")
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Purchase resource returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPurchase {
    /// 0 purchased, 1 canceled, 2 pending.
    pub purchase_state: i64,
    /// 0 yet to be consumed, 1 consumed.
    #[serde(default)]
    pub consumption_state: Option<i64>,
    /// Order id — the canonical transaction id when present.
    #[serde(default)]
    pub order_id: Option<String>,
    /// Purchase time in milliseconds since the epoch, as a string.
    #[serde(default)]
    pub purchase_time_millis: Option<String>,
    /// 0 yet to be acknowledged, 1 acknowledged.
    #[serde(default)]
    pub acknowledgement_state: Option<i64>,
    /// ISO 3166-1 region of the purchasing account.
    #[serde(default)]
    pub region_code: Option<String>,
}

impl ProductPurchase {
    /// Human-readable state name, for logs and errors.
    #[must_use]
    pub fn state_name(&self) -> String {
        match self.purchase_state {
            PURCHASE_STATE_PURCHASED => "purchased".into(),
            PURCHASE_STATE_CANCELED => "canceled".into(),
            PURCHASE_STATE_PENDING => "pending".into(),
            other => format!("unknown({other})"),
        }
    }

    /// Reduce this resource to a normalized outcome.
    ///
    /// The claimed transaction id is used only when the resource carries no
    /// order id (test-track purchases); a real order id always wins.
    ///
    /// # Errors
    ///
    /// Returns `State` for any purchase state other than purchased.
    pub fn into_outcome(
        self,
        product_id: &str,
        claimed_transaction_id: &str,
    ) -> Result<VerificationOutcome, ReceiptError> {
        if self.purchase_state != PURCHASE_STATE_PURCHASED {
            return Err(ReceiptError::State {
                state: self.state_name(),
            });
        }

        let transaction_id = self
            .order_id
            .unwrap_or_else(|| claimed_transaction_id.to_string());
        let purchased_at = self
            .purchase_time_millis
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .map(|ms| ms / 1000);

        Ok(VerificationOutcome {
            transaction_id,
            product_id: product_id.to_string(),
            purchased_at,
        })
    }
}

/// Client for the publisher API's purchase-status endpoint.
pub struct PlayClient {
    client: Client,
    base_url: String,
    package_name: String,
    credentials: PlayCredentials,
}

impl PlayClient {
    /// Create a new client.
    ///
    /// Connect and read timeouts are kept aggressive so an unreachable
    /// endpoint fails fast into the retryable path instead of hanging a
    /// purchase.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        package_name: &str,
        credentials: PlayCredentials,
        timeout: Duration,
    ) -> Result<Self, ReceiptError> {
        let connect_timeout = Duration::from_secs(3);
        let read_timeout = timeout.min(Duration::from_secs(8));

        let client = ClientBuilder::new()
            .timeout(read_timeout)
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .tcp_nodelay(true)
            .user_agent(format!("storeproof/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReceiptError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            package_name: package_name.to_string(),
            credentials,
        })
    }

    /// Fetch the purchase resource for a token.
    ///
    /// # Errors
    ///
    /// `Network` on transport faults and server-side (5xx) failures,
    /// `Rejected` on 4xx responses.
    #[instrument(skip(self, purchase_token), fields(product_id = %product_id))]
    pub async fn fetch_status(
        &self,
        product_id: &str,
        purchase_token: &str,
    ) -> Result<ProductPurchase, ReceiptError> {
        let url = format!(
            "{}/androidpublisher/v3/applications/{}/purchases/products/{}/tokens/{}",
            self.base_url, self.package_name, product_id, purchase_token
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.credentials.bearer_token)
            .send()
            .await
            .map_err(|e| {
                warn!(product_id = %product_id, error = %e, "purchase status request failed");
                ReceiptError::Network {
                    message: format!("status request failed: {e}"),
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ReceiptError::Network {
                message: format!("HTTP {status} from status endpoint"),
            });
        }
        if !status.is_success() {
            return Err(ReceiptError::Rejected {
                message: format!("HTTP {status} from status endpoint"),
            });
        }

        response
            .json::<ProductPurchase>()
            .await
            .map_err(|e| ReceiptError::Network {
                message: format!("failed to parse status response: {e}"),
            })
    }

    /// Verify a purchase token against a claimed product id.
    ///
    /// # Errors
    ///
    /// `State` for non-purchased states, plus the errors of
    /// [`Self::fetch_status`].
    pub async fn verify(
        &self,
        purchase_token: &str,
        claimed_product_id: &str,
        claimed_transaction_id: &str,
    ) -> Result<VerificationOutcome, ReceiptError> {
        let purchase = self.fetch_status(claimed_product_id, purchase_token).await?;

        debug!(
            product_id = %claimed_product_id,
            state = %purchase.state_name(),
            order_id = ?purchase.order_id,
            "purchase status received"
        );

        purchase.into_outcome(claimed_product_id, claimed_transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(state: i64) -> ProductPurchase {
        ProductPurchase {
            purchase_state: state,
            consumption_state: Some(0),
            order_id: Some("GPA.1234-5678".into()),
            purchase_time_millis: Some("1754438400000".into()),
            acknowledgement_state: Some(0),
            region_code: Some("US".into()),
        }
    }

    #[test]
    fn purchased_state_is_accepted() {
        let outcome = resource(PURCHASE_STATE_PURCHASED)
            .into_outcome("p-1", "tx-claimed")
            .unwrap();
        assert_eq!(outcome.transaction_id, "GPA.1234-5678");
        assert_eq!(outcome.product_id, "p-1");
        assert_eq!(outcome.purchased_at, Some(1_754_438_400));
    }

    #[test]
    fn canceled_and_pending_are_rejected() {
        for (state, name) in [
            (PURCHASE_STATE_CANCELED, "canceled"),
            (PURCHASE_STATE_PENDING, "pending"),
        ] {
            let err = resource(state).into_outcome("p-1", "tx").unwrap_err();
            match err {
                ReceiptError::State { state } => assert_eq!(state, name),
                other => panic!("expected state error, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_order_id_falls_back_to_claim() {
        let mut purchase = resource(PURCHASE_STATE_PURCHASED);
        purchase.order_id = None;
        let outcome = purchase.into_outcome("p-1", "tx-claimed").unwrap();
        assert_eq!(outcome.transaction_id, "tx-claimed");
    }

    #[test]
    fn resource_parses_publisher_json() {
        let json = r#"{
            "purchaseState": 2,
            "consumptionState": 0,
            "orderId": "GPA.9999-0000",
            "purchaseTimeMillis": "1754438400000",
            "acknowledgementState": 0,
            "regionCode": "DE"
        }"#;

        let purchase: ProductPurchase = serde_json::from_str(json).unwrap();
        assert_eq!(purchase.purchase_state, PURCHASE_STATE_PENDING);
        assert_eq!(purchase.state_name(), "pending");
        assert_eq!(purchase.region_code.as_deref(), Some("DE"));
    }

    #[test]
    fn credentials_do_not_leak_in_debug() {
        let credentials = PlayCredentials {
            bearer_token: "secret-token".into(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret-token"));
    }

    #[tokio::test]
    async fn client_builds_and_normalizes_url() {
        let client = PlayClient::new(
            "https://androidpublisher.googleapis.com/",
            "com.storeproof.reader",
            PlayCredentials {
                bearer_token: "token".into(),
            },
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://androidpublisher.googleapis.com");
    }
}
