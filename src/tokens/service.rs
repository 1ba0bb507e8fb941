//! The token service: issues and verifies signed claim sets over two
//! independently rotating key rings.

use crate::error::AuthError;
use crate::keyring::KeyStore;
use crate::scheduler::ScheduledTask;
use crate::tokens::claims::{Claims, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};
use crate::users::Principal;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Token-service configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Issuer claim; also the audience of refresh tokens, which are only
    /// ever presented back to this service
    pub issuer: String,
    /// Audience stamped on access tokens
    pub access_audience: String,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Clock-skew allowance during verification
    pub clock_skew: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: "saga/auth".to_string(),
            access_audience: "saga/*".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            clock_skew: Duration::from_secs(5),
        }
    }
}

/// Why a token was rejected.
///
/// Rendered through `Display` as the short human-readable reason callers
/// see; the variants are the structured classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// The token is not a parseable JWS, or its payload does not decode
    /// into the expected claim set.
    Malformed(String),
    /// The declared key identifier matches neither the current nor the
    /// previous key of the ring.
    UnknownKeyId(String),
    /// Signature verification failed.
    BadSignature,
    /// The token's expiration time has passed.
    Expired,
    /// The token's not-before time is still in the future.
    NotYetValid,
    /// A required claim is absent.
    MissingClaim(String),
    /// The issuer claim does not name this service.
    WrongIssuer,
    /// The audience claim does not name this service.
    WrongAudience,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed token: {detail}"),
            Self::UnknownKeyId(kid) => write!(f, "no verification key matches kid {kid}"),
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::Expired => write!(f, "token has expired"),
            Self::NotYetValid => write!(f, "token is not yet valid"),
            Self::MissingClaim(claim) => write!(f, "required claim {claim} is missing"),
            Self::WrongIssuer => write!(f, "issuer is not trusted"),
            Self::WrongAudience => write!(f, "audience is not accepted"),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for RejectionReason {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature => Self::BadSignature,
            ErrorKind::InvalidIssuer => Self::WrongIssuer,
            ErrorKind::InvalidAudience => Self::WrongAudience,
            ErrorKind::MissingRequiredClaim(claim) => Self::MissingClaim(claim.clone()),
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Outcome of verifying a token. Rejections are a value, never an error:
/// the only `Err` out of verification is backing-store unavailability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The token verified; the subject is the principal identifier it was
    /// issued for.
    Valid {
        /// Verified subject claim
        subject: String,
    },
    /// The token was rejected.
    Invalid(RejectionReason),
}

impl Verification {
    /// Whether the token verified.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// The verified subject, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Valid { subject } => Some(subject),
            Self::Invalid(_) => None,
        }
    }
}

/// Issues and verifies tokens over an access ring and a refresh ring with
/// independent rotation cadences.
pub struct TokenService {
    access_keys: Arc<dyn KeyStore>,
    refresh_keys: Arc<dyn KeyStore>,
    config: TokenConfig,
}

impl TokenService {
    /// Create a token service over two injected key rings.
    #[must_use]
    pub fn new(
        access_keys: Arc<dyn KeyStore>,
        refresh_keys: Arc<dyn KeyStore>,
        config: TokenConfig,
    ) -> Self {
        Self {
            access_keys,
            refresh_keys,
            config,
        }
    }

    /// Start periodic rotation of both rings. The returned tasks keep
    /// rotating until stopped; the caller owns their shutdown.
    #[must_use]
    pub fn start_rotation(
        &self,
        access_period: Duration,
        refresh_period: Duration,
    ) -> Vec<ScheduledTask> {
        vec![
            Self::schedule_rotation("access-key-rotation", self.access_keys.clone(), access_period),
            Self::schedule_rotation(
                "refresh-key-rotation",
                self.refresh_keys.clone(),
                refresh_period,
            ),
        ]
    }

    fn schedule_rotation(
        name: &'static str,
        ring: Arc<dyn KeyStore>,
        period: Duration,
    ) -> ScheduledTask {
        ScheduledTask::spawn(name, period, move || {
            let ring = ring.clone();
            async move { ring.rotate().await }
        })
    }

    /// Issue an access token for `principal`: 15-minute default lifetime,
    /// wildcard audience, email and permission claims, signed with the
    /// access ring's current key.
    ///
    /// # Errors
    ///
    /// Key-store unavailability or signing failure; never fails because of
    /// the principal.
    pub async fn issue_access_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let claims = Claims::new(
            &self.config.issuer,
            &self.config.access_audience,
            principal.id.to_string(),
            TOKEN_TYPE_ACCESS,
            self.config.access_token_ttl,
        )
        .with_email(&principal.email)
        .with_permissions(principal.permissions.clone());

        self.sign(&self.access_keys, &claims).await
    }

    /// Issue a refresh token for `principal`: 30-day default lifetime,
    /// audience = this service, signed with the refresh ring's current key.
    /// The HTTP layer delivers it as an http-only cookie scoped to the
    /// refresh path.
    ///
    /// # Errors
    ///
    /// Key-store unavailability or signing failure.
    pub async fn issue_refresh_token(&self, principal: &Principal) -> Result<String, AuthError> {
        let claims = Claims::new(
            &self.config.issuer,
            &self.config.issuer,
            principal.id.to_string(),
            TOKEN_TYPE_REFRESH,
            self.config.refresh_token_ttl,
        );

        self.sign(&self.refresh_keys, &claims).await
    }

    async fn sign(&self, ring: &Arc<dyn KeyStore>, claims: &Claims) -> Result<String, AuthError> {
        let key = ring.current().await?;
        let mut header = Header::new(Algorithm::PS512);
        header.kid = Some(key.kid().to_string());

        let token = jsonwebtoken::encode(&header, claims, &key.encoding_key()?)?;
        Ok(token)
    }

    /// Verify a refresh token against the refresh ring, selecting the
    /// verification key by the token's declared kid among `{current,
    /// previous}`.
    ///
    /// Requires issuer and audience to name this service and the subject,
    /// token id, issued-at, not-before and expiration claims to be present,
    /// with the configured clock-skew allowance.
    ///
    /// # Errors
    ///
    /// Only backing-store unavailability; every token-level failure comes
    /// back as [`Verification::Invalid`].
    pub async fn verify_refresh_token(&self, token: &str) -> Result<Verification, AuthError> {
        let header = match jsonwebtoken::decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                return Ok(Verification::Invalid(RejectionReason::Malformed(
                    e.to_string(),
                )))
            }
        };
        let Some(kid) = header.kid else {
            return Ok(Verification::Invalid(RejectionReason::Malformed(
                "kid header missing".to_string(),
            )));
        };

        let current = self.refresh_keys.current().await?;
        let key = if current.kid() == kid {
            current
        } else {
            match self.refresh_keys.previous().await? {
                Some(previous) if previous.kid() == kid => previous,
                _ => return Ok(Verification::Invalid(RejectionReason::UnknownKeyId(kid))),
            }
        };

        let mut validation = Validation::new(Algorithm::PS512);
        validation.leeway = self.config.clock_skew.as_secs();
        validation.validate_nbf = true;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "iss", "aud"]);

        match jsonwebtoken::decode::<Claims>(token, &key.decoding_key()?, &validation) {
            Ok(data) => Ok(Verification::Valid {
                subject: data.claims.sub,
            }),
            Err(e) => Ok(Verification::Invalid(RejectionReason::from(e))),
        }
    }

    /// The access ring's key set in JWKS JSON, for external verifiers.
    ///
    /// # Errors
    ///
    /// Key-store unavailability or serialization failure.
    pub async fn access_jwks_json(&self) -> Result<String, AuthError> {
        let jwks = self.access_keys.jwks().await?;
        serde_json::to_string(&jwks).map_err(|e| AuthError::internal(e.to_string()))
    }
}
