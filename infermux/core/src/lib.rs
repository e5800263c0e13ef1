//! InferMux Core - Inference Request Routing
//!
//! This crate resolves an inference request (a concrete model identifier or
//! `"auto"`) to the provider that serves it, runs the call under the caller's
//! cancellation and deadline, and reports one trace span per attempt.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Front Doors                          │
//! │   ┌───────────────────────────┐   ┌───────────────────────┐  │
//! │   │   HTTP (/mist, /infer)    │   │   One-shot command    │  │
//! │   └─────────────┬─────────────┘   └───────────┬───────────┘  │
//! │                 └───────────────┬─────────────┘              │
//! └─────────────────────────────────┼────────────────────────────┘
//!                                   │  (ctx, model, prompt)
//! ┌─────────────────────────────────┼────────────────────────────┐
//! │                          ROUTING CORE                        │
//! │  ┌──────────────────────────────┴─────────────────────────┐  │
//! │  │                         Router                         │  │
//! │  │  ┌──────────┐   ┌────────────────┐   ┌──────────────┐  │  │
//! │  │  │ Registry │   │ Provider (run) │   │   Reporter   │  │  │
//! │  │  └──────────┘   └────────────────┘   └──────────────┘  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Registry`]: model identifier -> provider, immutable once shared
//! - [`Router`]: validation, resolution, dispatch, span emission
//! - [`Provider`]: the capability every backend implements
//! - [`Reporter`]: fire-and-forget span sink
//! - [`CallContext`]: cancellation and deadline for one call
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use infermux_core::{reporter_for, CallContext, EchoProvider, Registry, Router};
//!
//! let mut registry = Registry::new();
//! registry.register(Arc::new(EchoProvider::new("echo", ["echo-v1"], Duration::from_millis(1))))?;
//!
//! let router = Router::new(Arc::new(registry), reporter_for("infermux", None));
//! let result = router.infer(&CallContext::background(), "auto", "hello", None).await?;
//! assert_eq!(result.resolved_model, "echo-v1");
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: TOML + environment configuration, registry construction
//! - [`context`]: cancellation and deadline propagation
//! - [`gateway`]: HTTP front door and one-shot entry point
//! - [`message`]: MIST message envelope
//! - [`provider`]: provider trait and built-in providers
//! - [`registry`]: provider registry
//! - [`routing`]: router and its metrics
//! - [`trace`]: spans and reporters

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod gateway;
pub mod message;
pub mod provider;
pub mod registry;
pub mod routing;
pub mod trace;

// Re-exports for convenience
pub use context::{CallContext, CancelGuard, CancelHandle, Interrupt};
pub use provider::{EchoProvider, OllamaProvider, Provider, ProviderSummary};
pub use registry::{Registry, RegistryError, Resolution, AUTO_MODEL};

// Routing exports
pub use routing::{
    ErrorKind, Router, RouterError, RouterMetrics, RouterMetricsSnapshot, RoutingRequest,
    RoutingResult,
};

// Trace exports
pub use trace::{reporter_for, CollectorReporter, NoopReporter, ReportError, Reporter, Span, SpanStatus};

// Gateway exports
pub use gateway::{infer_from_cli, GatewayState, ServerError};

// Config exports
pub use config::{
    build_registry, default_config_path, load_config, load_config_from_path, parse_listen_addr,
    ConfigError, ConfigOverrides, ConfigSource, InfermuxConfig, ProviderConfig, ProviderKind,
};
