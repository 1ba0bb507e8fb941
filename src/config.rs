//! Centralized configuration for the authenticator.
//!
//! All configuration is loaded from environment variables once at startup and
//! validated before any key ring or scheduler is constructed. Nothing is
//! hot-reloaded.

use crate::error::AuthError;
use crate::tokens::TokenConfig;
use std::env;
use std::time::Duration;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    // Shared key store
    /// Redis connection URL (credentials included, `redis://:pass@host:port`)
    pub redis_url: String,
    /// Hash name backing the access-token key ring
    pub access_key_namespace: String,
    /// Hash name backing the refresh-token key ring
    pub refresh_key_namespace: String,

    // Token settings
    /// Issuer claim identifying this service
    pub issuer: String,
    /// Audience claim stamped on access tokens (wildcard over trusting services)
    pub access_audience: String,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// Allowed clock skew when verifying tokens
    pub clock_skew: Duration,

    // Key rotation
    /// RSA modulus size in bits for generated signing keys
    pub key_size: usize,
    /// Rotation period of the access-token ring
    pub access_rotation_period: Duration,
    /// Rotation period of the refresh-token ring
    pub refresh_rotation_period: Duration,

    // Registration
    /// bcrypt cost factor for newly registered passwords
    pub bcrypt_cost: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            access_key_namespace: "accessKeys".to_string(),
            refresh_key_namespace: "refreshKeys".to_string(),
            issuer: "saga/auth".to_string(),
            access_audience: "saga/*".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            clock_skew: Duration::from_secs(5),
            key_size: 4096,
            access_rotation_period: Duration::from_secs(35 * 60),
            refresh_rotation_period: Duration::from_secs(31 * 24 * 60 * 60),
            bcrypt_cost: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable fails to parse or the resulting
    /// configuration is invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_env("PORT", defaults.port)?,
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            access_key_namespace: env::var("ACCESS_KEY_NAMESPACE")
                .unwrap_or(defaults.access_key_namespace),
            refresh_key_namespace: env::var("REFRESH_KEY_NAMESPACE")
                .unwrap_or(defaults.refresh_key_namespace),
            issuer: env::var("JWT_ISSUER").unwrap_or(defaults.issuer),
            access_audience: env::var("ACCESS_AUDIENCE").unwrap_or(defaults.access_audience),
            access_token_ttl: duration_env("ACCESS_TOKEN_TTL", defaults.access_token_ttl)?,
            refresh_token_ttl: duration_env("REFRESH_TOKEN_TTL", defaults.refresh_token_ttl)?,
            clock_skew: duration_env("CLOCK_SKEW", defaults.clock_skew)?,
            key_size: parse_env("KEY_SIZE", defaults.key_size)?,
            access_rotation_period: duration_env(
                "ACCESS_ROTATION_PERIOD",
                defaults.access_rotation_period,
            )?,
            refresh_rotation_period: duration_env(
                "REFRESH_ROTATION_PERIOD",
                defaults.refresh_rotation_period,
            )?,
            bcrypt_cost: parse_env("BCRYPT_COST", defaults.bcrypt_cost)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants.
    ///
    /// A ring retains exactly one generation of history, so a token must
    /// never be able to outlive two rotations: each rotation period has to
    /// strictly exceed the maximum token lifetime issued under that ring.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the violated invariant.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_rotation_period <= self.access_token_ttl {
            return Err(AuthError::config(
                "access key rotation period must exceed the access token lifetime",
            ));
        }
        if self.refresh_rotation_period <= self.refresh_token_ttl {
            return Err(AuthError::config(
                "refresh key rotation period must exceed the refresh token lifetime",
            ));
        }
        if self.key_size < 2048 {
            return Err(AuthError::config(format!(
                "key size must be at least 2048 bits, got {}",
                self.key_size
            )));
        }
        Ok(())
    }

    /// Token-service view of this configuration.
    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            issuer: self.issuer.clone(),
            access_audience: self.access_audience.clone(),
            access_token_ttl: self.access_token_ttl,
            refresh_token_ttl: self.refresh_token_ttl,
            clock_skew: self.clock_skew,
        }
    }
}

/// Parse environment variable with default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AuthError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| AuthError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse a duration in whole seconds from the environment.
fn duration_env(name: &str, default: Duration) -> Result<Duration, AuthError> {
    Ok(Duration::from_secs(parse_env(
        name,
        default.as_secs(),
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.issuer, "saga/auth");
        assert_eq!(config.access_audience, "saga/*");
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
    }

    #[test]
    fn default_rotation_periods_leave_an_overlap_window() {
        let config = Config::default();
        assert!(config.access_rotation_period > config.access_token_ttl);
        assert!(config.refresh_rotation_period > config.refresh_token_ttl);
    }

    #[test]
    fn rejects_rotation_period_shorter_than_token_lifetime() {
        let config = Config {
            access_rotation_period: Duration::from_secs(600),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let config = Config {
            refresh_rotation_period: Duration::from_secs(60),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn rejects_undersized_keys() {
        let config = Config {
            key_size: 1024,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }
}
