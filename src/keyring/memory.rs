//! In-process key ring for a single instance or test isolation.

use crate::error::AuthError;
use crate::keyring::{generate_key_pair, KeyPair, KeyStore};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

/// The two-slot ring state. Mutated only under one write guard, so readers
/// never observe a half-rotated pair.
#[derive(Default)]
struct KeySlots {
    current: Option<KeyPair>,
    previous: Option<KeyPair>,
}

/// Key ring backed by process-local memory.
pub struct MemoryKeyStore {
    slots: RwLock<KeySlots>,
    key_size: usize,
}

impl MemoryKeyStore {
    /// Create an empty ring generating keys of `key_size` bits.
    #[must_use]
    pub fn new(key_size: usize) -> Self {
        Self {
            slots: RwLock::new(KeySlots::default()),
            key_size,
        }
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn current(&self) -> Result<KeyPair, AuthError> {
        if let Some(existing) = self.slots.read().await.current.as_ref() {
            return Ok(existing.clone());
        }

        let fresh = generate_key_pair(self.key_size).await?;

        let mut slots = self.slots.write().await;
        // A concurrent caller may have won the generation race.
        if let Some(existing) = slots.current.as_ref() {
            return Ok(existing.clone());
        }
        info!(kid = %fresh.kid(), "generated initial signing key");
        slots.current = Some(fresh.clone());
        Ok(fresh)
    }

    async fn previous(&self) -> Result<Option<KeyPair>, AuthError> {
        Ok(self.slots.read().await.previous.clone())
    }

    async fn rotate(&self) -> Result<(), AuthError> {
        let fresh = generate_key_pair(self.key_size).await?;

        let mut slots = self.slots.write().await;
        if let Some(old) = slots.current.take() {
            info!(new_kid = %fresh.kid(), demoted_kid = %old.kid(), "rotated signing key");
            slots.previous = Some(old);
        } else {
            info!(new_kid = %fresh.kid(), "rotated empty ring, installed first key");
        }
        slots.current = Some(fresh);
        Ok(())
    }
}
