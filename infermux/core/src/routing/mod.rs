//! Inference Routing
//!
//! Resolution, dispatch and accounting for inference calls.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |      Router      |  <-- Entry point for every inference call
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |     Registry     |  <-- Model identifier -> provider
//! +--------+---------+
//!          |
//!          v
//! +------------------+      +------------------+
//! |     Provider     | ---> |     Reporter     |  <-- One span per dispatch
//! +------------------+      +------------------+
//! ```
//!
//! # Design Principles
//!
//! 1. **Fail fast**: bad input and unknown models never reach a provider
//! 2. **Deadlines propagate**: the provider sees the caller's cancel and deadline
//! 3. **Observability is additive**: reporter failures never fail a call

pub mod metrics;
pub mod router;

pub use metrics::{RouterMetrics, RouterMetricsSnapshot};
pub use router::*;
