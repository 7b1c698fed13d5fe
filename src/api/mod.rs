//! HTTP API Module
//!
//! JSON endpoints over the session table and the gateway:
//!
//! | Method | Path                    | Purpose                      |
//! |--------|-------------------------|------------------------------|
//! | GET    | `/health`               | liveness and counters        |
//! | POST   | `/sessions`             | open a session               |
//! | DELETE | `/sessions/:id`         | close a session              |
//! | POST   | `/sessions/:id/ask`     | ask a question               |
//! | GET    | `/sessions/:id/last`    | most recent turn             |
//! | GET    | `/sessions/:id/history` | every turn, oldest first     |

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::HttpConfig;
use crate::Handler;

use self::handlers::{admin, sessions};

const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Creates the Axum router
pub fn create_router(handler: Arc<Handler>, config: &HttpConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(admin::health))
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/:id", delete(sessions::close_session))
        .route("/sessions/:id/ask", post(sessions::ask))
        .route("/sessions/:id/last", get(sessions::last_turn))
        .route("/sessions/:id/history", get(sessions::history))
        .layer(Extension(handler))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes));

    // No CORS layer unless origins are configured: same-origin only
    if !config.cors_origins.is_empty() {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    tracing::warn!(origin = %s, "invalid_cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM. On shutdown: stops accepting
/// connections, lets in-flight asks finish, and stops the session reaper.
pub async fn start_http_server(
    handler: Arc<Handler>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(Arc::clone(&handler), config);

    // Cancellation channel for the session reaper
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let reaper_handler = Arc::clone(&handler);
    let reaper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    reaper_handler.session_manager().reap_expired();
                }
                _ = shutdown_rx.changed() => {
                    tracing::debug!("session_reaper_stopped");
                    break;
                }
            }
        }
    });

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = reaper.await;
    tracing::info!(
        sessions = handler.session_manager().session_count(),
        "http_server_stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received_sigint"),
                    _ = sigterm.recv() => tracing::info!("received_sigterm"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "sigterm_handler_unavailable");
                let _ = ctrl_c.await;
                tracing::info!("received_sigint");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received_sigint");
    }
}
