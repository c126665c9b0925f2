//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use logscope_core::EntrySearcher;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::routes::create_router;
use crate::state::ServerState;

/// Server exposing search and live tail over HTTP.
#[derive(Debug, Clone)]
pub struct LogscopeServer {
    state: Arc<ServerState>,
}

impl LogscopeServer {
    /// Create a new server over `searcher`.
    #[must_use]
    pub fn new(config: ServerConfig, searcher: Arc<dyn EntrySearcher>) -> Self {
        Self {
            state: Arc::new(ServerState::new(config, searcher)),
        }
    }

    /// Get the server state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Get the number of active live-tail connections.
    #[must_use]
    pub fn live_connection_count(&self) -> usize {
        self.state.live_connection_count()
    }

    /// Start the server on the configured address.
    ///
    /// This method runs until the server encounters a fatal error.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve(&self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server on the configured address with graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    ///
    /// Live-tail sessions are cancelled when shutdown begins.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails.
    pub async fn serve_listener<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!(addr = %addr, "Logscope server listening");

        let token = self.state.shutdown_token().clone();
        let router = create_router(Arc::clone(&self.state));

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                token.cancel();
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        info!("Logscope server shut down");
        Ok(())
    }

    /// Create the router without starting the server.
    ///
    /// Useful for testing or embedding in another server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }

    /// The configured bind address.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.state.config().bind_addr
    }
}
