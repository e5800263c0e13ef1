use serde::{Deserialize, Serialize};

use crate::provider::ProviderSummary;
use crate::routing::RoutingResult;

/// Body of `POST /infer`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferRequest {
    /// Model identifier, passed to the router verbatim (empty means `"auto"`)
    #[serde(default)]
    pub model: String,
    /// Prompt text
    #[serde(default)]
    pub prompt: String,
    /// Optional deadline for the whole call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

/// Payload of an `infer.request` MIST message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistInferPayload {
    /// Prompt text
    #[serde(default)]
    pub prompt: String,
    /// Model hint (absent means `"auto"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Optional deadline for the whole call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

/// Successful inference reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferResponse {
    /// Provider output
    pub content: String,
    /// Provider that served the call
    pub provider: String,
    /// Model that served the call
    pub model: String,
    /// Provider latency in milliseconds
    pub latency_ms: u64,
}

impl From<RoutingResult> for InferResponse {
    fn from(result: RoutingResult) -> Self {
        Self {
            content: result.content,
            provider: result.provider_name,
            model: result.resolved_model,
            latency_ms: u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Body of `GET /providers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidersResponse {
    /// Providers in registration order
    pub providers: Vec<ProviderSummary>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while serving
    pub status: String,
    /// Registered provider count
    pub providers: usize,
}

/// Error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Error class (`"model_not_found"`, `"timeout"`, ...)
    pub kind: String,
}
