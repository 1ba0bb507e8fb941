//! Rotating signing-key rings.
//!
//! A ring holds exactly two slots, `current` and `previous`. Tokens are
//! signed with `current`; verification accepts `current` or `previous`, which
//! is what keeps already-issued tokens verifiable across one rotation. Two
//! implementations of the [`KeyStore`] capability exist: [`MemoryKeyStore`]
//! for a single process and [`RedisKeyStore`] for a fleet of instances
//! sharing one backing store.

mod memory;
mod redis;

pub use memory::MemoryKeyStore;
pub use redis::RedisKeyStore;

use crate::error::AuthError;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// JWS algorithm every ring signs with: RSA-PSS over SHA-512.
pub const JWS_ALGORITHM: &str = "PS512";

/// An asymmetric signing key pair. Immutable once generated.
#[derive(Clone)]
pub struct KeyPair {
    kid: String,
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair with a random key identifier.
    ///
    /// CPU-bound for production modulus sizes; call through
    /// [`generate_key_pair`] from async contexts.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGeneration`] if the RSA key cannot be
    /// generated, which is fatal (no silent retry).
    pub fn generate(bits: usize) -> Result<Self, AuthError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| AuthError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        Ok(Self {
            kid: uuid::Uuid::new_v4().to_string(),
            private,
            public,
        })
    }

    /// The key identifier embedded in token headers and the JWKS.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The JWS algorithm identifier for this key.
    #[must_use]
    pub fn algorithm(&self) -> &'static str {
        JWS_ALGORITHM
    }

    /// Signing key for JWT serialization.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyMaterial`] if the private key cannot be
    /// re-encoded for the JWT library.
    pub fn encoding_key(&self) -> Result<EncodingKey, AuthError> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))?;
        EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))
    }

    /// Verification key for JWT deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyMaterial`] if the public key cannot be
    /// re-encoded for the JWT library.
    pub fn decoding_key(&self) -> Result<DecodingKey, AuthError> {
        let pem = self
            .public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))?;
        DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))
    }

    /// Public-only JWK view of this key pair.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            key_use: "sig".to_string(),
            alg: JWS_ALGORITHM.to_string(),
            n: URL_SAFE_NO_PAD.encode(self.public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.public.e().to_bytes_be()),
        }
    }

    /// At-rest form for the shared backing store.
    pub(crate) fn to_stored(&self) -> Result<StoredKeyPair, AuthError> {
        let pem = self
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))?;
        Ok(StoredKeyPair {
            kid: self.kid.clone(),
            private_key_pem: pem.to_string(),
        })
    }

    /// Rebuild a key pair from its at-rest form.
    pub(crate) fn from_stored(stored: &StoredKeyPair) -> Result<Self, AuthError> {
        let private = RsaPrivateKey::from_pkcs8_pem(&stored.private_key_pem)
            .map_err(|e| AuthError::KeyMaterial(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self {
            kid: stored.kid.clone(),
            private,
            public,
        })
    }
}

// Keep private material out of logs.
impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("alg", &JWS_ALGORITHM)
            .finish_non_exhaustive()
    }
}

/// Serialized key pair as stored in the shared backing store. Never leaves
/// the process boundary in any other direction.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct StoredKeyPair {
    pub kid: String,
    pub private_key_pem: String,
}

/// Public JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always "RSA"
    pub kty: String,
    /// Key ID
    pub kid: String,
    /// Key use, always "sig"
    #[serde(rename = "use")]
    pub key_use: String,
    /// Algorithm
    pub alg: String,
    /// RSA modulus, base64url
    pub n: String,
    /// RSA exponent, base64url
    pub e: String,
}

/// Public JSON Web Key Set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    /// Public keys, current first
    pub keys: Vec<Jwk>,
}

/// Generate a key pair without blocking the async runtime.
///
/// # Errors
///
/// Propagates [`KeyPair::generate`] failures; a cancelled blocking task is an
/// internal error.
pub async fn generate_key_pair(bits: usize) -> Result<KeyPair, AuthError> {
    tokio::task::spawn_blocking(move || KeyPair::generate(bits))
        .await
        .map_err(|e| AuthError::internal(format!("key generation task failed: {e}")))?
}

/// Capability set of one rotating key ring.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// The key pair currently in force, generated lazily if the slot is
    /// empty.
    async fn current(&self) -> Result<KeyPair, AuthError>;

    /// The key pair demoted by the most recent rotation, if any.
    async fn previous(&self) -> Result<Option<KeyPair>, AuthError>;

    /// Demote `current` to `previous` and install a freshly generated key as
    /// the new `current`, as one indivisible transition. A rotation of an
    /// empty ring only populates `current`.
    async fn rotate(&self) -> Result<(), AuthError>;

    /// Public-key view of `{current, previous}`. Triggers the same lazy
    /// generation as [`KeyStore::current`].
    async fn jwks(&self) -> Result<Jwks, AuthError> {
        let current = self.current().await?;
        let mut keys = vec![current.to_jwk()];
        if let Some(previous) = self.previous().await? {
            keys.push(previous.to_jwk());
        }
        Ok(Jwks { keys })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY_SIZE: usize = 2048;

    #[test]
    fn generated_key_has_fresh_identity() {
        let a = KeyPair::generate(TEST_KEY_SIZE).unwrap();
        let b = KeyPair::generate(TEST_KEY_SIZE).unwrap();

        assert!(!a.kid().is_empty());
        assert_ne!(a.kid(), b.kid());
        assert_eq!(a.algorithm(), "PS512");
    }

    #[test]
    fn jwk_exposes_only_public_material() {
        let pair = KeyPair::generate(TEST_KEY_SIZE).unwrap();
        let jwk = pair.to_jwk();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.alg, "PS512");
        assert_eq!(jwk.kid, pair.kid());
        // 65537
        assert_eq!(jwk.e, "AQAB");

        let json = serde_json::to_value(&jwk).unwrap();
        assert!(json.get("d").is_none());
        assert!(json.get("p").is_none());
        assert!(json.get("q").is_none());
    }

    #[test]
    fn stored_round_trip_preserves_the_pair() {
        let pair = KeyPair::generate(TEST_KEY_SIZE).unwrap();
        let restored = KeyPair::from_stored(&pair.to_stored().unwrap()).unwrap();

        assert_eq!(restored.kid(), pair.kid());
        assert_eq!(restored.to_jwk().n, pair.to_jwk().n);
    }

    #[test]
    fn debug_output_never_contains_key_material() {
        let pair = KeyPair::generate(TEST_KEY_SIZE).unwrap();
        let rendered = format!("{pair:?}");

        assert!(rendered.contains(pair.kid()));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
