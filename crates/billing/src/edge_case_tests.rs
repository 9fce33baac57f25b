// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge case tests for the billing system
//!
//! Exercises boundary conditions across:
//! - Quota decisions at and around the limit
//! - Window resets across the UTC day boundary
//! - Payment event mapping and terminal-state behavior
//! - Signature verification

#[cfg(test)]
mod quota_boundary_tests {
    use crate::usage::check;
    use ecosort_shared::{Plan, User};
    use time::macros::datetime;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn user_on(plan: Plan, usage_count: i32, last_reset: OffsetDateTime) -> User {
        User {
            id: Uuid::new_v4(),
            email: "edge@example.com".to_string(),
            name: "Edge".to_string(),
            plan: plan.as_str().to_string(),
            usage_count,
            usage_limit: plan.daily_quota().as_limit(),
            last_usage_reset: last_reset,
            created_at: last_reset,
            updated_at: last_reset,
        }
    }

    // Scenario: free user at 4 of 5, same day. The fifth classification is
    // admitted; the sixth is rejected with the plan's limit reason.
    #[test]
    fn free_user_fifth_request_admitted_sixth_rejected() {
        let now = datetime!(2025-03-10 10:00 UTC);
        let reset = datetime!(2025-03-10 07:00 UTC);

        let at_four = user_on(Plan::Free, 4, reset);
        assert!(check(&at_four, now).unwrap().allowed);

        let at_five = user_on(Plan::Free, 5, reset);
        let decision = check(&at_five, now).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Daily free classification limit reached");
    }

    // Scenario: free user exhausted yesterday. The next request today is
    // admitted with a reset due, regardless of the stale counter.
    #[test]
    fn exhausted_yesterday_is_admitted_today() {
        let now = datetime!(2025-03-11 09:00 UTC);
        let yesterday = datetime!(2025-03-10 22:00 UTC);

        let exhausted = user_on(Plan::Free, 5, yesterday);
        let decision = check(&exhausted, now).unwrap();
        assert!(decision.allowed);
        assert!(decision.reset_due);
    }

    #[test]
    fn premium_limit_is_the_catalog_value_not_an_inline_constant() {
        let now = datetime!(2025-03-10 10:00 UTC);
        let reset = datetime!(2025-03-10 07:00 UTC);

        let under = user_on(Plan::Premium, 999, reset);
        assert!(check(&under, now).unwrap().allowed);

        let at_limit = user_on(Plan::Premium, 1000, reset);
        let decision = check(&at_limit, now).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Daily premium classification limit reached");
    }

    #[test]
    fn zero_count_fresh_window_always_allowed() {
        let now = datetime!(2025-03-10 10:00 UTC);
        for plan in ecosort_shared::Plan::all() {
            let u = user_on(*plan, 0, now);
            assert!(check(&u, now).unwrap().allowed, "{plan} at zero should pass");
        }
    }

    #[test]
    fn reset_due_even_when_window_lapsed_by_many_days() {
        let now = datetime!(2025-03-20 10:00 UTC);
        let stale = user_on(Plan::Free, 5, datetime!(2025-03-01 10:00 UTC));
        let decision = check(&stale, now).unwrap();
        assert!(decision.allowed);
        assert!(decision.reset_due);
    }
}

#[cfg(test)]
mod webhook_event_tests {
    use crate::webhooks::{classify_event, PaymentEvent};
    use ecosort_shared::SubscriptionStatus;

    // Full transition table: every provider status maps to exactly one
    // event, and failure events carry the matching terminal state.
    #[test]
    fn transition_table_is_exhaustive_for_known_statuses() {
        let cases: Vec<(&str, Option<&str>, PaymentEvent)> = vec![
            ("capture", Some("accept"), PaymentEvent::Success),
            ("capture", Some("challenge"), PaymentEvent::Pending),
            ("capture", Some("deny"), PaymentEvent::Failure(SubscriptionStatus::Failed)),
            ("settlement", None, PaymentEvent::Success),
            ("pending", None, PaymentEvent::Pending),
            ("authorize", None, PaymentEvent::Pending),
            ("deny", None, PaymentEvent::Failure(SubscriptionStatus::Failed)),
            ("failure", None, PaymentEvent::Failure(SubscriptionStatus::Failed)),
            ("cancel", None, PaymentEvent::Failure(SubscriptionStatus::Cancelled)),
            ("expire", None, PaymentEvent::Failure(SubscriptionStatus::Expired)),
        ];

        for (status, fraud, expected) in cases {
            assert_eq!(
                classify_event(status, fraud),
                expected,
                "status={status} fraud={fraud:?}"
            );
        }
    }

    // Re-classifying the same payload yields the same event: idempotency
    // of the mapping layer, independent of storage.
    #[test]
    fn classification_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(classify_event("settlement", Some("accept")), PaymentEvent::Success);
        }
    }

    #[test]
    fn failure_event_never_carries_a_success_state() {
        for status in ["deny", "cancel", "expire", "failure"] {
            match classify_event(status, None) {
                PaymentEvent::Failure(s) => {
                    assert!(s.is_terminal());
                    assert_ne!(s, SubscriptionStatus::Active);
                }
                other => panic!("{status} should be a failure, got {other:?}"),
            }
        }
    }
}

#[cfg(test)]
mod signature_tests {
    use crate::midtrans::verify_signature;
    use sha2::{Digest, Sha512};

    const KEY: &str = "SB-Mid-server-abc";

    fn sign(order_id: &str, status_code: &str, gross_amount: &str, key: &str) -> String {
        let mut h = Sha512::new();
        h.update(order_id.as_bytes());
        h.update(status_code.as_bytes());
        h.update(gross_amount.as_bytes());
        h.update(key.as_bytes());
        hex::encode(h.finalize())
    }

    // The provider signs the plain concatenation of the fields, with no
    // separators. Equal concatenated bytes verify under either field
    // split; this pins the scheme so nobody "fixes" it with delimiters
    // and breaks verification against real notifications.
    #[test]
    fn concatenation_follows_provider_scheme() {
        let sig = sign("order-9", "200", "49000.00", KEY);
        // Same concatenated bytes, different field split, same digest
        assert!(verify_signature(KEY, "order-920", "0", "49000.00", &sig));
        // Different bytes anywhere, rejected
        assert!(!verify_signature(KEY, "order-9", "200", "49000.01", &sig));
    }

    #[test]
    fn signature_bound_to_server_key() {
        let sig = sign("order-9", "200", "49000.00", "some-other-key");
        assert!(!verify_signature(KEY, "order-9", "200", "49000.00", &sig));
    }

    #[test]
    fn uppercase_hex_is_rejected() {
        // Midtrans sends lowercase hex; the comparison is byte-exact.
        let sig = sign("order-9", "200", "49000.00", KEY).to_uppercase();
        assert!(!verify_signature(KEY, "order-9", "200", "49000.00", &sig));
    }
}

#[cfg(test)]
mod catalog_consistency_tests {
    use ecosort_shared::{Plan, Quota};

    // The catalog is the single source of truth; these pin the decided
    // values so a drive-by edit shows up in review.
    #[test]
    fn decided_quotas() {
        assert_eq!(Plan::Free.daily_quota(), Quota::Limited(5));
        assert_eq!(Plan::Premium.daily_quota(), Quota::Limited(1000));
        assert_eq!(Plan::Corporate.daily_quota(), Quota::Unlimited);
    }

    #[test]
    fn decided_prices() {
        assert_eq!(Plan::Premium.price_idr(), Some(49_000));
        assert_eq!(Plan::Corporate.price_idr(), Some(199_000));
    }
}
