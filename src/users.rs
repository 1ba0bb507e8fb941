//! Principals and the user-lookup collaborator contract.
//!
//! The real user database is an external collaborator; the core only
//! consumes the two lookups. [`MemoryUserStore`] is the reference
//! implementation and test double.

use crate::error::AuthError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An authenticated identity tokens are issued for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    /// Stable identifier, the subject claim of every issued token
    pub id: Uuid,
    /// Email address
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Permission-scope name to granted values
    pub permissions: HashMap<String, Vec<String>>,
}

impl Principal {
    /// Create a principal with a fresh identifier and no permissions.
    #[must_use]
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: password_hash.into(),
            permissions: HashMap::new(),
        }
    }
}

/// User lookup capability required from the environment.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look a principal up by identifier.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AuthError>;

    /// Look a principal up by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError>;

    /// Persist a principal.
    async fn save(&self, principal: Principal) -> Result<(), AuthError>;
}

/// In-memory user store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, Principal>>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn save(&self, principal: Principal) -> Result<(), AuthError> {
        self.users.write().await.insert(principal.id, principal);
        Ok(())
    }
}

/// Whether `password` matches the principal's stored hash. Unverifiable
/// hashes count as a mismatch, never an error.
#[must_use]
pub fn password_matches(password: &str, principal: &Principal) -> bool {
    bcrypt::verify(password, &principal.password_hash).unwrap_or(false)
}

/// Hash a password for storage.
///
/// # Errors
///
/// Returns an internal error if hashing fails.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    bcrypt::hash(password, cost).map_err(|e| AuthError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Low cost keeps the hashing tests fast.
    const TEST_COST: u32 = 4;

    #[tokio::test]
    async fn save_then_find_by_both_keys() {
        let store = MemoryUserStore::new();
        let principal = Principal::new("a@b.com", "hash");
        let id = principal.id;

        store.save(principal.clone()).await.unwrap();

        assert_eq!(store.find_by_id(id).await.unwrap(), Some(principal.clone()));
        assert_eq!(
            store.find_by_email("a@b.com").await.unwrap(),
            Some(principal)
        );
        assert_eq!(store.find_by_email("x@y.com").await.unwrap(), None);
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2", TEST_COST).unwrap();
        let principal = Principal::new("a@b.com", hash);

        assert!(password_matches("hunter2", &principal));
        assert!(!password_matches("wrong", &principal));
    }

    #[test]
    fn garbage_hash_is_a_mismatch_not_an_error() {
        let principal = Principal::new("a@b.com", "not-a-bcrypt-hash");
        assert!(!password_matches("anything", &principal));
    }
}
