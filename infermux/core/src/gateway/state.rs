use std::sync::Arc;

use tracing::error;

use super::error::ApiError;
use crate::context::{CallContext, CancelHandle};
use crate::routing::{Router, RoutingRequest, RoutingResult};

/// Shared state behind every handler
pub struct GatewayState {
    router: Arc<Router>,
    service_name: String,
    /// Parent of every request context; cancelled on shutdown
    root: CallContext,
    shutdown: CancelHandle,
}

impl GatewayState {
    /// Create gateway state over a router
    pub fn new(router: Arc<Router>, service_name: impl Into<String>) -> Self {
        let (root, shutdown) = CallContext::with_cancel();
        Self {
            router,
            service_name: service_name.into(),
            root,
            shutdown,
        }
    }

    /// The router
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Service name stamped on replies
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Cancel every in-flight call
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Route one request on its own task
    ///
    /// The call is cancelled when the server shuts down or when the handler
    /// future is dropped (client gone), and the router still finishes the
    /// call's bookkeeping either way.
    pub(crate) async fn dispatch(&self, request: RoutingRequest) -> Result<RoutingResult, ApiError> {
        let (ctx, handle) = self.root.child_with_cancel();
        let _guard = handle.drop_guard();

        let router = Arc::clone(&self.router);
        let task = tokio::spawn(async move { router.route(&ctx, &request).await });

        match task.await {
            Ok(result) => result.map_err(ApiError::from),
            Err(e) => {
                error!(error = %e, "Routing task failed");
                Err(ApiError::internal("routing task failed"))
            }
        }
    }
}
