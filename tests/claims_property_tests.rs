//! Property-based tests for the claim-set wire format.

use std::collections::HashMap;
use std::time::Duration;

use proptest::prelude::*;
use saga_authenticator::tokens::{Claims, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};

/// Permission-scope names that cannot collide with the registered claims
/// they are flattened next to.
fn arb_scope_name() -> impl Strategy<Value = String> {
    "perm_[a-z]{1,8}".prop_map(|s| s)
}

fn arb_scope_values() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,8}", 0..4)
}

fn arb_permissions() -> impl Strategy<Value = HashMap<String, Vec<String>>> {
    prop::collection::hash_map(arb_scope_name(), arb_scope_values(), 0..5)
}

fn arb_subject() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9-]{1,36}".prop_map(|s| s)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A serialized claim set deserializes back to itself, with the
    /// permission mapping surviving the flatten.
    #[test]
    fn prop_claims_survive_serialization(
        subject in arb_subject(),
        email in "[a-z]{1,8}@[a-z]{1,8}\\.com",
        permissions in arb_permissions(),
    ) {
        let claims = Claims::new(
            "saga/auth",
            "saga/*",
            subject,
            TOKEN_TYPE_ACCESS,
            Duration::from_secs(900),
        )
        .with_email(email)
        .with_permissions(permissions);

        let json = serde_json::to_string(&claims).unwrap();
        let back: Claims = serde_json::from_str(&json).unwrap();

        prop_assert_eq!(back, claims);
    }

    /// Flattened scopes land at the top level of the serialized object and
    /// never under a `permissions` key.
    #[test]
    fn prop_scopes_flatten_to_top_level(permissions in arb_permissions()) {
        let claims = Claims::new(
            "saga/auth",
            "saga/*",
            "subject",
            TOKEN_TYPE_ACCESS,
            Duration::from_secs(900),
        )
        .with_permissions(permissions.clone());

        let json = serde_json::to_value(&claims).unwrap();

        prop_assert!(json.get("permissions").is_none());
        for (scope, values) in &permissions {
            let serialized = json
                .get(scope)
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                });
            prop_assert_eq!(serialized.as_ref(), Some(values));
        }
    }

    /// The validity window always spans exactly the requested lifetime,
    /// starting at issuance.
    #[test]
    fn prop_validity_window_matches_ttl(ttl_secs in 1u64..10_000_000) {
        let claims = Claims::new(
            "saga/auth",
            "saga/auth",
            "subject",
            TOKEN_TYPE_REFRESH,
            Duration::from_secs(ttl_secs),
        );

        prop_assert_eq!(claims.exp - claims.nbf, ttl_secs as i64);
        prop_assert_eq!(claims.nbf, claims.iat);
    }

    /// Token identifiers are fresh per claim set and fixed-width.
    #[test]
    fn prop_token_ids_are_unique(_n in 0u8..50) {
        let a = Claims::new("i", "a", "s", TOKEN_TYPE_ACCESS, Duration::from_secs(1));
        let b = Claims::new("i", "a", "s", TOKEN_TYPE_ACCESS, Duration::from_secs(1));

        prop_assert_ne!(&a.jti, &b.jti);
        // 64 random bytes, base64url, no padding
        prop_assert_eq!(a.jti.len(), 86);
    }
}
