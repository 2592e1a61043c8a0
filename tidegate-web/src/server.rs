//! Router construction and gateway lifecycle.
//!
//! The route table is an explicitly owned axum `Router` built here, never a
//! process-global registration. [`Gateway::start`] binds the listener and
//! serves in a background task so session startup returns promptly;
//! [`Gateway::close`] shuts the listener down gracefully and then closes the
//! session's engine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tidegate_core::Session;
use tidegate_core::engine::EngineError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::handlers::stream_handler;

/// Shared state behind every request handler.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
}

/// Builds the gateway's router: the single `/stream` route plus CORS.
pub fn router(session: Arc<Session>) -> Router {
    Router::new()
        .route("/stream", get(stream_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { session })
}

/// Errors from the gateway lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to bind streaming listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("Engine error during shutdown: {0}")]
    Engine(#[from] EngineError),
}

/// Running streaming gateway: a bound listener serving in the background.
pub struct Gateway {
    session: Arc<Session>,
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    serve_task: JoinHandle<()>,
}

impl Gateway {
    /// Binds the configured listen address and starts serving.
    ///
    /// Respects the IPv6-disable flag through the session's configured
    /// listen address. With port zero the OS picks one; [`Gateway::port`]
    /// reports the actual binding for link generation.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Bind` - If the listen address cannot be bound
    pub async fn start(session: Arc<Session>) -> Result<Self, GatewayError> {
        let listener = tokio::net::TcpListener::bind(session.config().listen_addr()).await?;
        let local_addr = listener.local_addr()?;
        let app = router(session.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let serve_task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!("Streaming gateway exited with error: {e}");
            }
        });

        info!(%local_addr, "Streaming gateway listening");
        Ok(Self {
            session,
            local_addr,
            shutdown: Some(shutdown_tx),
            serve_task,
        })
    }

    /// Address the listener actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the listener actually bound, for stream-link generation.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Shuts the listener down gracefully, then closes the session.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Engine` - If engine teardown fails
    pub async fn close(mut self) -> Result<(), GatewayError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.serve_task.await {
            error!("Streaming gateway task panicked: {e}");
        }
        self.session.close().await?;
        info!("Streaming gateway closed");
        Ok(())
    }
}
