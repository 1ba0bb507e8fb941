//! Redis-backed key ring shared by every service instance.
//!
//! The two slots live as fields of one hash per ring namespace, so
//! independently running instances converge on the same signing and
//! verification material. The rotation swap is a single MULTI/EXEC
//! transaction: a concurrent reader sees either the old pair or the new
//! pair, never a mix. Nothing here elects a rotation owner; two instances
//! rotating at nearly the same time can still demote each other's fresh key.

use crate::error::AuthError;
use crate::keyring::{generate_key_pair, KeyPair, KeyStore, StoredKeyPair};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

/// Hash field holding the key pair currently in force.
pub const CURRENT_FIELD: &str = "current";
/// Hash field holding the key pair demoted by the last rotation.
pub const PREVIOUS_FIELD: &str = "previous";

/// Key ring backed by a Redis hash.
pub struct RedisKeyStore {
    conn: ConnectionManager,
    namespace: String,
    key_size: usize,
}

impl RedisKeyStore {
    /// Create a ring over an injected connection handle.
    ///
    /// The handle is owned by the composition root and shared between rings;
    /// `namespace` is the hash name isolating this ring's slots.
    #[must_use]
    pub fn new(conn: ConnectionManager, namespace: impl Into<String>, key_size: usize) -> Self {
        Self {
            conn,
            namespace: namespace.into(),
            key_size,
        }
    }

    /// Connect to Redis and create a ring. Convenience for single-ring
    /// setups; fleets should share one [`ConnectionManager`] via
    /// [`RedisKeyStore::new`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Redis`] if the connection cannot be established.
    pub async fn connect(
        redis_url: &str,
        namespace: impl Into<String>,
        key_size: usize,
    ) -> Result<Self, AuthError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, namespace, key_size))
    }

    async fn read_slot(&self, field: &str) -> Result<Option<KeyPair>, AuthError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(&self.namespace, field).await?;
        match raw {
            Some(json) => {
                let stored: StoredKeyPair = serde_json::from_str(&json)
                    .map_err(|e| AuthError::internal(format!("corrupt stored key pair: {e}")))?;
                Ok(Some(KeyPair::from_stored(&stored)?))
            }
            None => Ok(None),
        }
    }

    fn encode(pair: &KeyPair) -> Result<String, AuthError> {
        serde_json::to_string(&pair.to_stored()?)
            .map_err(|e| AuthError::internal(format!("failed to encode key pair: {e}")))
    }
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn current(&self) -> Result<KeyPair, AuthError> {
        if let Some(existing) = self.read_slot(CURRENT_FIELD).await? {
            return Ok(existing);
        }

        let fresh = generate_key_pair(self.key_size).await?;
        let encoded = Self::encode(&fresh)?;

        // HSETNX then re-read: racing instances converge on whichever key
        // landed first instead of clobbering each other.
        let mut conn = self.conn.clone();
        let installed: bool = conn
            .hset_nx(&self.namespace, CURRENT_FIELD, encoded)
            .await?;
        if installed {
            info!(ring = %self.namespace, kid = %fresh.kid(), "generated initial signing key");
        }

        self.read_slot(CURRENT_FIELD).await?.ok_or_else(|| {
            AuthError::internal("current slot empty immediately after installation")
        })
    }

    async fn previous(&self) -> Result<Option<KeyPair>, AuthError> {
        self.read_slot(PREVIOUS_FIELD).await
    }

    async fn rotate(&self) -> Result<(), AuthError> {
        // The demoted value is moved as its raw stored form; no need to
        // parse it just to write it back.
        let mut conn = self.conn.clone();
        let old: Option<String> = conn.hget(&self.namespace, CURRENT_FIELD).await?;

        let fresh = generate_key_pair(self.key_size).await?;
        let encoded = Self::encode(&fresh)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(old) = old {
            pipe.hset(&self.namespace, PREVIOUS_FIELD, old).ignore();
        }
        pipe.hset(&self.namespace, CURRENT_FIELD, encoded).ignore();
        let _: () = pipe.query_async(&mut conn).await?;

        info!(ring = %self.namespace, kid = %fresh.kid(), "rotated signing key");
        Ok(())
    }
}
