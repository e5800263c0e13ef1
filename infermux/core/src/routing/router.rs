//! Inference Router
//!
//! The single path from a routing request to a provider call. Every call goes
//! through the same steps, in order:
//!
//! 1. Validate the request (empty prompt is rejected)
//! 2. Resolve the provider through the [`Registry`]
//! 3. Bound the call context by the request deadline
//! 4. Run the provider, timing it
//! 5. Classify the outcome
//! 6. Emit exactly one span
//!
//! Steps 1-2 fail fast: no provider is contacted, no span is emitted.
//! The router never retries; that is the caller's decision.
//!
//! # Usage
//!
//! ```ignore
//! let router = Router::new(Arc::new(registry), reporter_for("infermux", None));
//! let result = router.infer(&CallContext::background(), "auto", "hello", None).await?;
//! println!("{}", result.content);
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::metrics::{DispatchFailure, RouterMetrics};
use crate::context::{CallContext, Interrupt};
use crate::registry::{Registry, RegistryError};
use crate::trace::{
    Reporter, Span, SpanStatus, ATTR_ERROR_KIND, ATTR_ERROR_MESSAGE, ATTR_MODEL_REQUESTED,
    ATTR_MODEL_RESOLVED, ATTR_PROVIDER,
};

/// Operation name on emitted spans
pub const SPAN_OPERATION: &str = "infer";

// ============================================================================
// Request / Result
// ============================================================================

/// One inference call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRequest {
    /// Concrete model identifier, or `"auto"`
    pub requested_model: String,
    /// Prompt text
    pub prompt: String,
    /// Upper bound on the whole call, measured from when routing starts
    pub deadline: Option<Duration>,
}

impl RoutingRequest {
    /// Create a request with no deadline
    pub fn new(requested_model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            requested_model: requested_model.into(),
            prompt: prompt.into(),
            deadline: None,
        }
    }

    /// Set the deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// A successful inference
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingResult {
    /// Provider output
    pub content: String,
    /// Provider that served the call
    pub provider_name: String,
    /// Model that served the call (differs from the request for `"auto"`)
    pub resolved_model: String,
    /// Wall-clock duration of the provider call
    pub latency: Duration,
}

// ============================================================================
// Errors
// ============================================================================

/// Coarse error class, stable across releases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input
    InvalidRequest,
    /// Unknown model
    ModelNotFound,
    /// Conflicting registry state
    Conflict,
    /// The provider failed
    ProviderError,
    /// The deadline passed
    Timeout,
    /// The caller cancelled
    Canceled,
}

impl ErrorKind {
    /// Wire name (e.g. `"model_not_found"`)
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::ModelNotFound => "model_not_found",
            Self::Conflict => "conflict",
            Self::ProviderError => "provider_error",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing errors
#[derive(Debug, Error)]
pub enum RouterError {
    /// The request is malformed; no provider was contacted
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No provider declares the model; no provider was contacted
    #[error("model {0:?} not found")]
    ModelNotFound(String),

    /// The registry rejected the lookup
    #[error("registry conflict: {0}")]
    Conflict(#[source] RegistryError),

    /// The provider reported a failure
    #[error("provider {provider:?} failed: {source}")]
    Provider {
        /// Provider name
        provider: String,
        /// Time spent in the provider
        elapsed: Duration,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// The deadline passed before the provider answered
    #[error("provider {provider:?} timed out after {elapsed:?}")]
    Timeout {
        /// Provider name
        provider: String,
        /// Time spent before giving up
        elapsed: Duration,
    },

    /// The caller cancelled before the provider answered
    #[error("call to provider {provider:?} canceled after {elapsed:?}")]
    Canceled {
        /// Provider name
        provider: String,
        /// Time spent before cancellation
        elapsed: Duration,
    },
}

impl RouterError {
    /// Error class
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::ModelNotFound(_) => ErrorKind::ModelNotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Provider { .. } => ErrorKind::ProviderError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Canceled { .. } => ErrorKind::Canceled,
        }
    }

    /// Time spent in the provider, for dispatch-phase errors
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        match self {
            Self::Provider { elapsed, .. }
            | Self::Timeout { elapsed, .. }
            | Self::Canceled { elapsed, .. } => Some(*elapsed),
            _ => None,
        }
    }

    /// Whether the error happened before any provider was contacted
    #[must_use]
    pub fn is_routing_phase(&self) -> bool {
        self.latency().is_none()
    }
}

impl From<RegistryError> for RouterError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ModelNotFound(model) => Self::ModelNotFound(model),
            other => Self::Conflict(other),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Resolves and dispatches inference calls
pub struct Router {
    /// Read-only provider set
    registry: Arc<Registry>,
    /// Span sink
    reporter: Arc<dyn Reporter>,
    /// Metrics
    metrics: Arc<RouterMetrics>,
}

impl Router {
    /// Create a router over a fully built registry
    #[must_use]
    pub fn new(registry: Arc<Registry>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            registry,
            reporter,
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    /// Get registry reference
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get metrics reference
    #[must_use]
    pub fn metrics(&self) -> Arc<RouterMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one inference call
    pub async fn infer(
        &self,
        ctx: &CallContext,
        model: &str,
        prompt: &str,
        deadline: Option<Duration>,
    ) -> Result<RoutingResult, RouterError> {
        let request = RoutingRequest {
            requested_model: model.to_string(),
            prompt: prompt.to_string(),
            deadline,
        };
        self.route(ctx, &request).await
    }

    /// Route a request to its provider
    pub async fn route(
        &self,
        ctx: &CallContext,
        request: &RoutingRequest,
    ) -> Result<RoutingResult, RouterError> {
        self.metrics.record_request();

        // Received -> Resolving
        if request.prompt.is_empty() {
            self.metrics.record_routing_failure();
            debug!(model = %request.requested_model, "Rejected request with empty prompt");
            return Err(RouterError::InvalidRequest("prompt is empty".to_string()));
        }

        let resolution = match self.registry.resolve(&request.requested_model) {
            Ok(resolution) => resolution,
            Err(e) => {
                self.metrics.record_routing_failure();
                debug!(model = %request.requested_model, error = %e, "Resolution failed");
                return Err(e.into());
            }
        };

        // Resolving -> Dispatching
        let ctx = match request.deadline {
            Some(deadline) => ctx.with_timeout(deadline),
            None => ctx.clone(),
        };
        let provider = resolution.provider;
        let model = resolution.model;

        let mut span = Span::start(self.reporter.service_name(), SPAN_OPERATION)
            .with_attribute(ATTR_MODEL_REQUESTED, request.requested_model.as_str())
            .with_attribute(ATTR_MODEL_RESOLVED, model.as_str())
            .with_attribute(ATTR_PROVIDER, provider.name());

        debug!(
            provider = %provider.name(),
            requested = %request.requested_model,
            resolved = %model,
            deadline = ?request.deadline,
            "Dispatching"
        );

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            result = provider.run(&ctx, &model, &request.prompt) => result,
            reason = ctx.done() => Err(reason.into()),
        };
        let latency = started.elapsed();

        // Dispatching -> Succeeded | Failed | TimedOut | Canceled
        let result = match outcome {
            Ok(content) => Ok(RoutingResult {
                content,
                provider_name: provider.name().to_string(),
                resolved_model: model.clone(),
                latency,
            }),
            Err(source) => Err(classify(provider.name(), &ctx, source, latency)),
        };

        match &result {
            Ok(_) => {
                span.finish(latency, SpanStatus::Ok);
                self.metrics.record_success(&model, latency);
            }
            Err(e) => {
                span.finish(latency, SpanStatus::Error);
                span.set_attribute(ATTR_ERROR_KIND, e.kind().as_str());
                span.set_attribute(ATTR_ERROR_MESSAGE, e.to_string());
                self.metrics.record_failure(&model, dispatch_failure(e), latency);
                warn!(
                    provider = %provider.name(),
                    model = %model,
                    kind = %e.kind(),
                    latency = ?latency,
                    error = %e,
                    "Inference failed"
                );
            }
        }

        // -> SpanEmitted
        if let Err(e) = self.reporter.emit(span) {
            warn!(error = %e, "Failed to emit span");
        }

        result
    }
}

/// Map a provider error to the router taxonomy
///
/// An interruption reported by the provider, or visible on the context when
/// the provider gave up, becomes `Timeout`/`Canceled`. Anything else is the
/// provider's own failure.
fn classify(
    provider: &str,
    ctx: &CallContext,
    source: anyhow::Error,
    elapsed: Duration,
) -> RouterError {
    let interrupt = source
        .downcast_ref::<Interrupt>()
        .copied()
        .or_else(|| ctx.interruption());

    let provider = provider.to_string();
    match interrupt {
        Some(Interrupt::DeadlineExceeded) => RouterError::Timeout { provider, elapsed },
        Some(Interrupt::Canceled) => RouterError::Canceled { provider, elapsed },
        None => RouterError::Provider {
            provider,
            elapsed,
            source,
        },
    }
}

fn dispatch_failure(err: &RouterError) -> DispatchFailure {
    match err.kind() {
        ErrorKind::Timeout => DispatchFailure::Timeout,
        ErrorKind::Canceled => DispatchFailure::Canceled,
        _ => DispatchFailure::Provider,
    }
}
