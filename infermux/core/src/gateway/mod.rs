//! Gateway
//!
//! Front doors to the router: the HTTP service and the one-shot command.
//!
//! # HTTP Endpoints
//!
//! | Method | Path         | Body / Reply                                            |
//! |--------|--------------|---------------------------------------------------------|
//! | POST   | `/mist`      | `infer.request` MIST message -> `infer.response` message |
//! | POST   | `/infer`     | `{model, prompt, deadline_ms?}` -> `{content, provider, model, latency_ms}` |
//! | GET    | `/providers` | registered providers, in registration order             |
//! | GET    | `/health`    | `{status, providers}`                                   |
//! | GET    | `/stats`     | router metrics snapshot                                 |
//!
//! Errors are `{error, kind}` JSON with a status code per error kind.

mod dto;
mod error;
mod handlers;
mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use tokio::net::TcpListener;
use tracing::info;

pub use dto::{
    ErrorResponse, HealthResponse, InferRequest, InferResponse, MistInferPayload,
    ProvidersResponse,
};
pub use error::{status_for, ApiError, ServerError};
pub use state::GatewayState;

use crate::context::CallContext;
use crate::registry::AUTO_MODEL;
use crate::routing::{Router, RouterError, RoutingResult};

/// Build the HTTP application
pub fn app(state: Arc<GatewayState>) -> axum::Router {
    axum::Router::new()
        .route("/mist", post(handlers::ingest_handler))
        .route("/infer", post(handlers::infer_handler))
        .route("/providers", get(handlers::providers_handler))
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
///
/// # Errors
///
/// Returns `ServerError::Bind` if the address cannot be bound, or
/// `ServerError::Serve` if the server fails.
pub async fn serve<F>(state: Arc<GatewayState>, addr: SocketAddr, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(%addr, "Binding HTTP server");
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_listener(state, listener, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves
///
/// On shutdown, in-flight calls are cancelled and drained before returning.
///
/// # Errors
///
/// Returns `ServerError::Serve` if the server fails.
pub async fn serve_listener<F>(
    state: Arc<GatewayState>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "infermux listening");

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Shutdown requested, cancelling in-flight calls");
            shutdown_state.shutdown();
        })
        .await
        .map_err(ServerError::Serve)
}

/// One-shot inference for the command line
///
/// An empty `model` means `"auto"`. No deadline is applied beyond `ctx`.
///
/// # Errors
///
/// Any routing error, unchanged.
pub async fn infer_from_cli(
    router: &Router,
    ctx: &CallContext,
    model: &str,
    prompt: &str,
) -> Result<RoutingResult, RouterError> {
    let model = if model.is_empty() { AUTO_MODEL } else { model };
    router.infer(ctx, model, prompt, None).await
}
