//! Token issuance and verification.

pub mod claims;
pub mod service;

pub use claims::{Claims, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};
pub use service::{RejectionReason, TokenConfig, TokenService, Verification};
