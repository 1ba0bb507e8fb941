use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// `type` claim value for access tokens.
pub const TOKEN_TYPE_ACCESS: &str = "access";
/// `type` claim value for refresh tokens.
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// One token's claim set. Constructed, signed, serialized, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Issuer, fixed string identifying this service
    pub iss: String,
    /// Subject, the authenticated principal's identifier
    pub sub: String,
    /// Audience
    pub aud: Vec<String>,
    /// Expiration time (seconds since epoch)
    pub exp: i64,
    /// Not before (seconds since epoch)
    pub nbf: i64,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Unique token identifier
    pub jti: String,
    /// Token kind, `"access"` or `"refresh"`
    #[serde(rename = "type")]
    pub token_type: String,
    /// Principal email, access tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Permission mapping merged flat into the claim set, access tokens
    /// only. Scope names share one namespace with the registered claims
    /// above, as in the wire format.
    #[serde(flatten)]
    pub permissions: HashMap<String, Vec<String>>,
}

impl Claims {
    /// Build a claim set valid from now until now + `ttl`, with a fresh
    /// random token identifier.
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        subject: impl Into<String>,
        token_type: &str,
        ttl: Duration,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: vec![audience.into()],
            exp: now + ttl.as_secs() as i64,
            nbf: now,
            iat: now,
            jti: generate_jti(),
            token_type: token_type.to_string(),
            email: None,
            permissions: HashMap::new(),
        }
    }

    /// Attach the principal's email claim.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attach the principal's permission mapping.
    #[must_use]
    pub fn with_permissions(mut self, permissions: HashMap<String, Vec<String>>) -> Self {
        self.permissions = permissions;
        self
    }
}

/// 64 random bytes, base64url. Matches the identifier strength the service
/// has always stamped on tokens.
fn generate_jti() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_window_matches_ttl() {
        let claims = Claims::new(
            "saga/auth",
            "saga/auth",
            "user-1",
            TOKEN_TYPE_REFRESH,
            Duration::from_secs(900),
        );

        assert_eq!(claims.exp, claims.nbf + 900);
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.token_type, "refresh");
        assert_eq!(claims.aud, vec!["saga/auth".to_string()]);
    }

    #[test]
    fn jti_is_unique_and_long() {
        let a = Claims::new("i", "a", "s", TOKEN_TYPE_ACCESS, Duration::from_secs(1));
        let b = Claims::new("i", "a", "s", TOKEN_TYPE_ACCESS, Duration::from_secs(1));

        assert_ne!(a.jti, b.jti);
        // 64 bytes base64url without padding
        assert_eq!(a.jti.len(), 86);
    }

    #[test]
    fn permissions_flatten_into_the_top_level() {
        let mut permissions = HashMap::new();
        permissions.insert("reports".to_string(), vec!["read".to_string()]);

        let claims = Claims::new("i", "a", "s", TOKEN_TYPE_ACCESS, Duration::from_secs(60))
            .with_email("a@b.com")
            .with_permissions(permissions);

        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["reports"][0], "read");
        assert_eq!(json["email"], "a@b.com");
        assert_eq!(json["type"], "access");
        assert!(json.get("permissions").is_none());
    }

    #[test]
    fn email_is_omitted_when_absent() {
        let claims = Claims::new("i", "a", "s", TOKEN_TYPE_REFRESH, Duration::from_secs(60));
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("email").is_none());
    }
}
