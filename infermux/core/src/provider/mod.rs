//! Inference Providers
//!
//! Backends the router dispatches to, all behind the [`Provider`] trait.
//!
//! # Available Providers
//!
//! - **Echo**: deterministic, returns the prompt after a fixed delay (tests, local runs)
//! - **Ollama**: local LLM server over HTTP
//!
//! # Usage
//!
//! ```ignore
//! use infermux_core::provider::{EchoProvider, Provider};
//! use infermux_core::CallContext;
//!
//! let echo = EchoProvider::new("echo", ["echo-v1"], Duration::from_millis(1));
//! let content = echo.run(&CallContext::background(), "echo-v1", "hello").await?;
//! ```

mod echo;
mod ollama;
mod traits;

pub use echo::EchoProvider;
pub use ollama::{OllamaProvider, DEFAULT_OLLAMA_PORT};
pub use traits::{Provider, ProviderSummary};
