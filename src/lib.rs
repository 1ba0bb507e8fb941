//! Saga authenticator library.
//!
//! Provides rotating asymmetric signing-key rings, JWT issuance and
//! verification, JWKS publishing, and the thin HTTP edge wired around them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod http;
pub mod keyring;
pub mod scheduler;
pub mod tokens;
pub mod users;

// Re-exports for convenience
pub use config::Config;
pub use error::AuthError;
pub use keyring::{Jwk, Jwks, KeyPair, KeyStore, MemoryKeyStore, RedisKeyStore};
pub use tokens::{RejectionReason, TokenConfig, TokenService, Verification};
