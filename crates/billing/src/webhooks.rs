//! Midtrans payment notification handling
//!
//! Reconciles asynchronous notifications against the subscription state
//! machine: `pending -> active` on success, `pending -> failed | cancelled
//! | expired` on failure, no transitions out of a terminal state.
//!
//! Signature verification is the authentication boundary: an unverified
//! payload never reaches resolution or mutation. Idempotency is enforced
//! by conditional writes (`... WHERE status = 'pending'`), so concurrent
//! re-deliveries cannot apply an entitlement twice, and the entitlement
//! effect commits in the same transaction as the activation.

use sqlx::PgPool;
use uuid::Uuid;

use ecosort_shared::{Plan, SubscriptionStatus};

use crate::entitlement::{apply_plan, SUBSCRIPTION_PERIOD_DAYS};
use crate::error::{BillingError, BillingResult};
use crate::midtrans::MidtransClient;

/// Notification payload as posted by Midtrans
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MidtransNotification {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    #[serde(default)]
    pub payment_type: Option<String>,
}

/// What a notification means for the subscription state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// Payment completed and passed the fraud check
    Success,
    /// Still in flight; record the raw status, change nothing else
    Pending,
    /// Terminal failure with the corresponding subscription state
    Failure(SubscriptionStatus),
}

/// Map Midtrans `transaction_status` (+ `fraud_status`) to an event.
///
/// `capture` counts as success only when the fraud check accepted it; a
/// `challenge` stays pending until manual review resolves, and a denied
/// fraud check fails the payment even on capture.
pub fn classify_event(transaction_status: &str, fraud_status: Option<&str>) -> PaymentEvent {
    match transaction_status {
        "capture" => match fraud_status {
            Some("accept") | None => PaymentEvent::Success,
            Some("challenge") => PaymentEvent::Pending,
            Some(_) => PaymentEvent::Failure(SubscriptionStatus::Failed),
        },
        "settlement" => PaymentEvent::Success,
        "pending" | "authorize" => PaymentEvent::Pending,
        "deny" | "failure" => PaymentEvent::Failure(SubscriptionStatus::Failed),
        "cancel" => PaymentEvent::Failure(SubscriptionStatus::Cancelled),
        "expire" => PaymentEvent::Failure(SubscriptionStatus::Expired),
        other => {
            tracing::warn!(
                transaction_status = %other,
                "Unrecognized transaction status, treating as pending"
            );
            PaymentEvent::Pending
        }
    }
}

/// Outcome of a processed notification. All variants are acknowledged;
/// only errors (signature, malformed payload, database) surface upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// This delivery won the `pending -> active` transition and the
    /// entitlement was applied
    Activated { user_id: Uuid, plan: Plan },
    /// Success event redelivered for an already-active subscription
    AlreadyProcessed,
    /// Pending event recorded, no entitlement change
    PendingRecorded,
    /// This delivery moved the subscription to a terminal failure state
    MarkedFailed(SubscriptionStatus),
    /// Event arrived for a subscription already in a terminal state it
    /// cannot leave
    IgnoredTerminal(SubscriptionStatus),
    /// No subscription matches the order; acknowledged so the provider
    /// stops retrying, logged for investigation
    UnknownOrder,
}

/// Webhook handler for Midtrans notifications
#[derive(Clone)]
pub struct WebhookHandler {
    pool: PgPool,
    midtrans: MidtransClient,
}

impl WebhookHandler {
    pub fn new(midtrans: MidtransClient, pool: PgPool) -> Self {
        Self { pool, midtrans }
    }

    /// Parse a raw notification body. Malformed payloads map to a 400 at
    /// the API boundary.
    pub fn parse(&self, raw_body: &str) -> BillingResult<MidtransNotification> {
        serde_json::from_str(raw_body).map_err(|e| BillingError::MalformedPayload(e.to_string()))
    }

    /// Pull an `order_id` out of a body that failed full deserialization,
    /// so a malformed delivery can still be attributed in the audit trail.
    /// Empty string when the body is not even JSON.
    fn best_effort_order_id(raw_body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(raw_body)
            .ok()
            .and_then(|v| v.get("order_id").and_then(|o| o.as_str()).map(str::to_owned))
            .unwrap_or_default()
    }

    /// Verify, resolve, and apply one notification.
    ///
    /// Database errors propagate so the caller returns a retryable failure
    /// and Midtrans redelivers; an unreflected successful payment is worse
    /// than a duplicate delivery.
    pub async fn handle_notification(&self, raw_body: &str) -> BillingResult<WebhookOutcome> {
        let notification = match self.parse(raw_body) {
            Ok(notification) => notification,
            Err(e) => {
                let order_id = Self::best_effort_order_id(raw_body);
                self.record_audit_row(&order_id, "", None, "malformed").await;
                return Err(e);
            }
        };

        // Authentication boundary: nothing below runs unverified.
        if !self.midtrans.verify_signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &notification.signature_key,
        ) {
            tracing::warn!(
                order_id = %notification.order_id,
                transaction_status = %notification.transaction_status,
                "Rejected notification with invalid signature"
            );
            self.record_audit_row(
                &notification.order_id,
                &notification.transaction_status,
                notification.fraud_status.as_deref(),
                "signature_rejected",
            )
            .await;
            return Err(BillingError::SignatureInvalid);
        }

        let event = classify_event(
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
        );

        let outcome = match event {
            PaymentEvent::Success => self.apply_success(&notification).await?,
            PaymentEvent::Pending => self.record_pending(&notification).await?,
            PaymentEvent::Failure(target) => self.apply_failure(&notification, target).await?,
        };

        self.record_audit(&notification, &outcome).await;

        match &outcome {
            WebhookOutcome::Activated { user_id, plan } => {
                tracing::info!(
                    order_id = %notification.order_id,
                    user_id = %user_id,
                    plan = %plan,
                    "Subscription activated and entitlement applied"
                );
            }
            WebhookOutcome::AlreadyProcessed | WebhookOutcome::IgnoredTerminal(_) => {
                tracing::debug!(
                    order_id = %notification.order_id,
                    transaction_status = %notification.transaction_status,
                    outcome = ?outcome,
                    "Duplicate or out-of-order notification, no mutation"
                );
            }
            WebhookOutcome::MarkedFailed(status) => {
                tracing::info!(
                    order_id = %notification.order_id,
                    status = %status,
                    "Subscription marked failed; user plan untouched"
                );
            }
            WebhookOutcome::PendingRecorded => {
                tracing::debug!(order_id = %notification.order_id, "Pending status recorded");
            }
            WebhookOutcome::UnknownOrder => {
                tracing::warn!(
                    order_id = %notification.order_id,
                    "Notification for unknown order, acknowledged without mutation"
                );
            }
        }

        Ok(outcome)
    }

    /// Success path: one conditional UPDATE claims the `pending -> active`
    /// transition; the returned row proves this delivery won it, and the
    /// entitlement effect commits in the same transaction.
    async fn apply_success(
        &self,
        notification: &MidtransNotification,
    ) -> BillingResult<WebhookOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed: Option<(Uuid, String)> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = 'active',
                payment_status = $2,
                start_date = NOW(),
                end_date = NOW() + make_interval(days => $3),
                updated_at = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            RETURNING user_id, plan
            "#,
        )
        .bind(&notification.order_id)
        .bind(&notification.transaction_status)
        .bind(SUBSCRIPTION_PERIOD_DAYS as i32)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, plan_name)) = claimed else {
            tx.rollback().await?;
            return self.resolve_unclaimed(&notification.order_id).await;
        };

        let plan: Plan = plan_name.parse()?;
        apply_plan(&mut tx, user_id, plan).await?;
        tx.commit().await?;

        Ok(WebhookOutcome::Activated { user_id, plan })
    }

    /// Record the raw provider status on a still-pending subscription
    async fn record_pending(
        &self,
        notification: &MidtransNotification,
    ) -> BillingResult<WebhookOutcome> {
        let updated = sqlx::query(
            r#"
            UPDATE subscriptions SET payment_status = $2, updated_at = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            "#,
        )
        .bind(&notification.order_id)
        .bind(&notification.transaction_status)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            Ok(WebhookOutcome::PendingRecorded)
        } else {
            self.resolve_unclaimed(&notification.order_id).await
        }
    }

    /// Failure path: terminal transition for the subscription only. The
    /// owning user's plan is never touched here; a failure notification
    /// for an unrelated or duplicate attempt must not downgrade anyone.
    async fn apply_failure(
        &self,
        notification: &MidtransNotification,
        target: SubscriptionStatus,
    ) -> BillingResult<WebhookOutcome> {
        let updated = sqlx::query(
            r#"
            UPDATE subscriptions SET status = $2, payment_status = $3, updated_at = NOW()
            WHERE payment_id = $1 AND status = 'pending'
            "#,
        )
        .bind(&notification.order_id)
        .bind(target.as_str())
        .bind(&notification.transaction_status)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            Ok(WebhookOutcome::MarkedFailed(target))
        } else {
            self.resolve_unclaimed(&notification.order_id).await
        }
    }

    /// A conditional write matched no pending row: either the order is
    /// unknown (ack-and-log, never retried forever) or the subscription
    /// already reached a terminal state (idempotent no-op).
    async fn resolve_unclaimed(&self, order_id: &str) -> BillingResult<WebhookOutcome> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT status FROM subscriptions WHERE payment_id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            None => Ok(WebhookOutcome::UnknownOrder),
            Some((status,)) => {
                let status: SubscriptionStatus = status.parse()?;
                if status == SubscriptionStatus::Active {
                    Ok(WebhookOutcome::AlreadyProcessed)
                } else {
                    Ok(WebhookOutcome::IgnoredTerminal(status))
                }
            }
        }
    }

    /// Audit the outcome of a fully processed notification
    async fn record_audit(&self, notification: &MidtransNotification, outcome: &WebhookOutcome) {
        let outcome_str = match outcome {
            WebhookOutcome::Activated { .. } => "activated",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::PendingRecorded => "pending_recorded",
            WebhookOutcome::MarkedFailed(_) => "marked_failed",
            WebhookOutcome::IgnoredTerminal(_) => "ignored_terminal",
            WebhookOutcome::UnknownOrder => "unknown_order",
        };

        self.record_audit_row(
            &notification.order_id,
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
            outcome_str,
        )
        .await;
    }

    /// Append one audit row. Every delivery gets a row, including ones
    /// rejected before resolution (bad signature, unparseable body). A
    /// failed insert is logged but does not fail the reconciliation: the
    /// mutation already committed and a retried delivery would re-apply
    /// nothing.
    async fn record_audit_row(
        &self,
        order_id: &str,
        transaction_status: &str,
        fraud_status: Option<&str>,
        outcome: &str,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (order_id, transaction_status, fraud_status, outcome)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order_id)
        .bind(transaction_status)
        .bind(fraud_status)
        .bind(outcome)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                order_id = %order_id,
                outcome = outcome,
                error = %e,
                "Failed to write payment event audit row"
            );
        }
    }
}
