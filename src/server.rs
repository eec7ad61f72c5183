//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration
//! - Middleware stack (CORS, request ids, logging, timeouts, body limits)
//! - Graceful shutdown handling

use std::sync::Arc;

use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::engine::Recognizer;
use crate::error::ServerError;
use crate::middleware::{log_requests, request_id};
use crate::routes::{health, method_not_allowed, not_found, ocr};
use crate::state::ServerState;

/// Install the global JSON tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Calling this twice is harmless.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .try_init();
}

/// CORS policy for the configured origins.
///
/// Credentials are allowed, so a `*` entry mirrors the caller's `Origin`
/// instead of sending a literal wildcard. Methods and headers are mirrored
/// the same way.
pub fn cors_layer(config: &ServiceConfig) -> Result<CorsLayer, ServerError> {
    let origin = if config.allows_any_origin() {
        AllowOrigin::mirror_request()
    } else {
        let origins = config
            .allowed_cors
            .iter()
            .map(|o| {
                HeaderValue::from_str(o.trim())
                    .map_err(|_| ServerError::Config(format!("invalid CORS origin: {o}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

/// Build the Axum router with all routes and middleware
///
/// Middleware stack, outermost first:
/// 1. Tracing
/// 2. Request ID tracking
/// 3. Request logging
/// 4. CORS
/// 5. Timeout (mapped to a JSON 408)
/// 6. Body size limit
pub fn build_router(state: Arc<ServerState>) -> Result<Router, ServerError> {
    let cors = cors_layer(&state.config)?;
    let body_limit = state.config.max_body_size();
    let timeout = state.config.timeout();

    let router = Router::new()
        .route("/ocr", post(ocr::recognize))
        .route("/health", get(health::health_check))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(router)
}

async fn handle_middleware_error(err: BoxError) -> ServerError {
    if err.is::<Elapsed>() {
        ServerError::Timeout
    } else {
        ServerError::Internal(err.to_string())
    }
}

/// Start the HTTP server
///
/// Binds the configured address and serves until SIGTERM or Ctrl+C.
/// Fails before binding if the CORS origins or the address are invalid.
pub async fn start_server(
    config: ServiceConfig,
    recognizer: Arc<dyn Recognizer>,
) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;

    if config.allows_any_origin() {
        tracing::warn!("CORS allows any origin with credentials; restrict allowed_cors for public deployments");
    }

    tracing::info!(
        "Starting OCR server on {} with {} auth tokens",
        addr,
        config.auth_token.len()
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB, Engine: {}",
        config.timeout_secs,
        config.max_body_size_mb,
        recognizer.name()
    );

    let state = Arc::new(ServerState::new(config, recognizer));
    let app = build_router(state)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
