//! Provider Traits
//!
//! The capability every inference backend exposes to the router. A provider
//! declares a fixed, ordered set of model identifiers at construction and runs
//! prompts for any of them.
//!
//! # Design Philosophy
//!
//! The router treats providers as black boxes:
//! - `name` and `supported_models` are read once, at registration
//! - `run` is the only suspension point in a routing call
//!
//! Implementations own their wire protocol, credentials and latency profile.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::CallContext;

/// Inference provider trait
///
/// Implement this trait to put a new backend behind the router.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier of this provider instance (e.g., "echo", "ollama-local")
    fn name(&self) -> &str;

    /// Model identifiers this provider serves, in declaration order
    ///
    /// Must not change after the provider has been registered.
    fn supported_models(&self) -> &[String];

    /// Run inference for `prompt` on `model` (always one of `supported_models`)
    ///
    /// Implementations should stop early when `ctx.done()` resolves and return
    /// the [`Interrupt`](crate::context::Interrupt) as their error.
    async fn run(&self, ctx: &CallContext, model: &str, prompt: &str) -> anyhow::Result<String>;
}

/// Read-only description of a registered provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    /// Provider name
    pub name: String,
    /// Declared models, in declaration order
    pub models: Vec<String>,
}

impl ProviderSummary {
    /// Summarize a provider
    pub fn of(provider: &dyn Provider) -> Self {
        Self {
            name: provider.name().to_string(),
            models: provider.supported_models().to_vec(),
        }
    }
}
