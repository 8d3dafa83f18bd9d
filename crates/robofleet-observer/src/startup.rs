//! Dashboard server startup helper for the engine binary.
//!
//! Provides [`spawn_observer`] which binds the listening socket and then
//! runs the HTTP + `WebSocket` server on a background Tokio task, so the
//! API runs concurrently with the mutator loop.
//!
//! # Usage
//!
//! ```rust,ignore
//! use robofleet_observer::startup::spawn_observer;
//!
//! let observer = spawn_observer(config, state, shutdown_rx).await?;
//! // ... later
//! observer.handle.await?;
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the dashboard server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// A dashboard server running in the background.
#[derive(Debug)]
pub struct RunningObserver {
    /// The address actually bound (useful when the port was 0).
    pub addr: SocketAddr,
    /// Task serving requests; completes after graceful shutdown.
    pub handle: JoinHandle<()>,
}

/// Spawn the dashboard server on a background Tokio task.
///
/// The socket is bound before the task is spawned, so a taken or
/// malformed address is reported here rather than logged later.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_observer<F>(
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<RunningObserver, StartupError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(&config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, &config.allowed_origins, shutdown).await {
            tracing::error!(error = %e, "Dashboard server exited with error");
        }
    });

    tracing::info!(%addr, "Dashboard server spawned on background task");

    Ok(RunningObserver { addr, handle })
}
