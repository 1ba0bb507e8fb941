//! Composition root: configuration, the shared Redis handle, the two key
//! rings, the token service, rotation scheduling and the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use redis::aio::ConnectionManager;
use saga_authenticator::config::Config;
use saga_authenticator::http::{self, AppState};
use saga_authenticator::keyring::RedisKeyStore;
use saga_authenticator::scheduler::STOP_GRACE;
use saga_authenticator::tokens::TokenService;
use saga_authenticator::users::MemoryUserStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting saga-authenticator");

    let config = Config::from_env()?;

    // One connection handle, owned here and injected into both rings.
    let client = redis::Client::open(config.redis_url.as_str())?;
    let conn = ConnectionManager::new(client).await?;

    let access_keys = Arc::new(RedisKeyStore::new(
        conn.clone(),
        config.access_key_namespace.clone(),
        config.key_size,
    ));
    let refresh_keys = Arc::new(RedisKeyStore::new(
        conn,
        config.refresh_key_namespace.clone(),
        config.key_size,
    ));

    let tokens = Arc::new(TokenService::new(
        access_keys,
        refresh_keys,
        config.token_config(),
    ));
    let rotation_tasks =
        tokens.start_rotation(config.access_rotation_period, config.refresh_rotation_period);

    let users = Arc::new(MemoryUserStore::new());
    let state = Arc::new(AppState {
        tokens,
        users,
        bcrypt_cost: config.bcrypt_cost,
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, stopping rotation schedulers");
    for task in rotation_tasks {
        task.stop(STOP_GRACE).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Waits for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
