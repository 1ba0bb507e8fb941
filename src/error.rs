//! Error taxonomy for the authenticator.
//!
//! Everything here is unrecoverable from the caller's point of view: a bad
//! token is not an error but a negative [`crate::tokens::Verification`]
//! carrying a [`crate::tokens::RejectionReason`].

use thiserror::Error;

/// Fatal errors surfaced by the key rings and token service.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Key pair generation failed. Not expected under normal entropy
    /// availability.
    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    /// Key material could not be encoded or decoded (PKCS#8, JWK).
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// JWT signing or serialization failed.
    #[error("JWT encoding error: {0}")]
    JwtEncoding(String),

    /// The shared backing store is unreachable or misbehaving.
    #[error("Redis error: {0}")]
    Redis(String),

    /// Invalid or missing configuration at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Shorthand for an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        AuthError::Redis(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::JwtEncoding(err.to_string())
    }
}
