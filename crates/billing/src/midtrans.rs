//! Midtrans payment gateway client
//!
//! Creates Snap transactions for plan checkout and verifies notification
//! signatures. Midtrans signs notifications with
//! `sha512(order_id + status_code + gross_amount + server_key)`; the
//! server key is the shared secret and never leaves this module.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::time::Duration;
use subtle::ConstantTimeEq;

use ecosort_shared::Plan;

use crate::error::{BillingError, BillingResult};

/// Midtrans configuration, loaded from the environment
#[derive(Clone)]
pub struct MidtransConfig {
    pub server_key: String,
    /// Snap API base, e.g. https://app.sandbox.midtrans.com/snap/v1
    pub snap_base_url: String,
    pub request_timeout: Duration,
}

impl MidtransConfig {
    pub fn from_env() -> BillingResult<Self> {
        let server_key = std::env::var("MIDTRANS_SERVER_KEY")
            .map_err(|_| BillingError::Gateway("MIDTRANS_SERVER_KEY not set".to_string()))?;
        let snap_base_url = std::env::var("MIDTRANS_SNAP_URL")
            .unwrap_or_else(|_| "https://app.sandbox.midtrans.com/snap/v1".to_string());

        Ok(Self {
            server_key,
            snap_base_url,
            request_timeout: Duration::from_secs(10),
        })
    }
}

/// Snap transaction created for a checkout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapTransaction {
    pub token: String,
    pub redirect_url: String,
}

#[derive(Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    customer_details: CustomerDetails<'a>,
    item_details: Vec<ItemDetail<'a>>,
}

#[derive(Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    email: &'a str,
    first_name: &'a str,
}

#[derive(Serialize)]
struct ItemDetail<'a> {
    id: &'a str,
    price: i64,
    quantity: u32,
    name: String,
}

/// Midtrans Snap client
#[derive(Clone)]
pub struct MidtransClient {
    config: MidtransConfig,
    http: reqwest::Client,
}

impl MidtransClient {
    pub fn new(config: MidtransConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BillingError::Gateway(e.to_string()))?;
        Ok(Self { config, http })
    }

    /// Create a Snap transaction for upgrading to `plan`.
    ///
    /// `order_id` is our identifier; Midtrans echoes it back in every
    /// notification and it is the key the reconciler resolves against.
    pub async fn create_transaction(
        &self,
        order_id: &str,
        plan: Plan,
        email: &str,
        name: &str,
    ) -> BillingResult<SnapTransaction> {
        let amount = plan
            .price_idr()
            .ok_or(BillingError::FreePlanCheckout)?;

        let request = SnapRequest {
            transaction_details: TransactionDetails {
                order_id,
                gross_amount: amount,
            },
            customer_details: CustomerDetails {
                email,
                first_name: name,
            },
            item_details: vec![ItemDetail {
                id: plan.as_str(),
                price: amount,
                quantity: 1,
                name: format!("EcoSort {plan} plan (30 days)"),
            }],
        };

        let url = format!("{}/transactions", self.config.snap_base_url);
        let auth = BASE64.encode(format!("{}:", self.config.server_key));

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Basic {auth}"))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                order_id = %order_id,
                status = %status,
                body = %body,
                "Midtrans Snap transaction creation failed"
            );
            return Err(BillingError::Gateway(format!(
                "Snap transaction failed with status {status}"
            )));
        }

        let snap: SnapTransaction = response.json().await?;
        tracing::info!(order_id = %order_id, plan = %plan, "Snap transaction created");
        Ok(snap)
    }

    /// Verify a notification signature.
    ///
    /// `gross_amount` must be the exact string from the payload (Midtrans
    /// formats it with two decimal places, e.g. "49000.00"; re-formatting
    /// a parsed number would break the digest).
    pub fn verify_signature(
        &self,
        order_id: &str,
        status_code: &str,
        gross_amount: &str,
        signature_key: &str,
    ) -> bool {
        verify_signature(
            &self.config.server_key,
            order_id,
            status_code,
            gross_amount,
            signature_key,
        )
    }
}

/// Recompute and constant-time compare the Midtrans notification signature
pub fn verify_signature(
    server_key: &str,
    order_id: &str,
    status_code: &str,
    gross_amount: &str,
    signature_key: &str,
) -> bool {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    let expected = hex::encode(hasher.finalize());

    expected.as_bytes().ct_eq(signature_key.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_KEY: &str = "SB-Mid-server-testkey";

    fn sign(order_id: &str, status_code: &str, gross_amount: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(order_id.as_bytes());
        hasher.update(status_code.as_bytes());
        hasher.update(gross_amount.as_bytes());
        hasher.update(SERVER_KEY.as_bytes());
        hex::encode(hasher.finalize())
    }

    #[test]
    fn valid_signature_accepted() {
        let sig = sign("order-123", "200", "49000.00");
        assert!(verify_signature(SERVER_KEY, "order-123", "200", "49000.00", &sig));
    }

    #[test]
    fn tampered_fields_rejected() {
        let sig = sign("order-123", "200", "49000.00");
        assert!(!verify_signature(SERVER_KEY, "order-124", "200", "49000.00", &sig));
        assert!(!verify_signature(SERVER_KEY, "order-123", "201", "49000.00", &sig));
        assert!(!verify_signature(SERVER_KEY, "order-123", "200", "1.00", &sig));
        assert!(!verify_signature("other-key", "order-123", "200", "49000.00", &sig));
    }

    #[test]
    fn empty_or_garbage_signature_rejected() {
        assert!(!verify_signature(SERVER_KEY, "order-123", "200", "49000.00", ""));
        assert!(!verify_signature(SERVER_KEY, "order-123", "200", "49000.00", "deadbeef"));
    }

    #[test]
    fn amount_string_is_used_verbatim() {
        // "49000.00" and "49000" digest differently; the payload string wins
        let sig = sign("order-123", "200", "49000.00");
        assert!(!verify_signature(SERVER_KEY, "order-123", "200", "49000", &sig));
    }

    #[tokio::test]
    async fn create_transaction_parses_snap_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/transactions")
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".to_string()))
            .with_status(201)
            .with_body(r#"{"token":"snap-token-1","redirect_url":"https://app.midtrans.com/snap/v2/vtweb/snap-token-1"}"#)
            .create_async()
            .await;

        let client = MidtransClient::new(MidtransConfig {
            server_key: SERVER_KEY.to_string(),
            snap_base_url: server.url(),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap();

        let snap = client
            .create_transaction("order-1", Plan::Premium, "u@example.com", "U")
            .await
            .unwrap();
        assert_eq!(snap.token, "snap-token-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_transaction_surfaces_gateway_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/transactions")
            .with_status(401)
            .with_body(r#"{"error_messages":["unauthorized"]}"#)
            .create_async()
            .await;

        let client = MidtransClient::new(MidtransConfig {
            server_key: SERVER_KEY.to_string(),
            snap_base_url: server.url(),
            request_timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = client
            .create_transaction("order-1", Plan::Premium, "u@example.com", "U")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Gateway(_)));
    }

    #[tokio::test]
    async fn free_plan_cannot_be_checked_out() {
        let client = MidtransClient::new(MidtransConfig {
            server_key: SERVER_KEY.to_string(),
            snap_base_url: "http://localhost:1".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();

        let err = client
            .create_transaction("order-1", Plan::Free, "u@example.com", "U")
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::FreePlanCheckout));
    }
}
