//! Span Reporting
//!
//! The router emits one [`Span`] per inference attempt through a [`Reporter`].
//! Reporting is fire-and-forget: a reporter may fail, and the router only
//! logs that failure.
//!
//! # Reporters
//!
//! - [`NoopReporter`]: drops every span (no collector configured)
//! - [`CollectorReporter`]: queues spans and ships them to a collector's
//!   `/mist` endpoint from a background task
//!
//! Use [`reporter_for`] to pick one from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::message::{Message, TYPE_TRACE_SPAN};

/// Spans buffered by [`CollectorReporter`] before `emit` starts failing
pub const COLLECTOR_QUEUE_CAPACITY: usize = 1024;

/// Attribute: model named by the caller (may be `"auto"`)
pub const ATTR_MODEL_REQUESTED: &str = "model.requested";
/// Attribute: model actually served
pub const ATTR_MODEL_RESOLVED: &str = "model.resolved";
/// Attribute: provider name
pub const ATTR_PROVIDER: &str = "provider";
/// Attribute: error kind on failed spans
pub const ATTR_ERROR_KIND: &str = "error.kind";
/// Attribute: error message on failed spans
pub const ATTR_ERROR_MESSAGE: &str = "error.message";

/// Span outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// The call succeeded
    Ok,
    /// The call failed
    Error,
}

/// One observability record for a single routing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// 128-bit trace ID, hex encoded
    pub trace_id: String,
    /// 64-bit span ID, hex encoded
    pub span_id: String,
    /// Emitting service
    pub service_name: String,
    /// Operation name
    pub operation: String,
    /// Wall-clock start
    pub start_time: DateTime<Utc>,
    /// Duration in microseconds
    pub duration_us: u64,
    /// Outcome
    pub status: SpanStatus,
    /// String attributes
    pub attributes: BTreeMap<String, String>,
}

impl Span {
    /// Start a span now, with fresh IDs
    pub fn start(service_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            trace_id: random_hex::<16>(),
            span_id: random_hex::<8>(),
            service_name: service_name.into(),
            operation: operation.into(),
            start_time: Utc::now(),
            duration_us: 0,
            status: SpanStatus::Ok,
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute, replacing any previous value
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Builder form of [`Span::set_attribute`]
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    /// Record duration and outcome
    pub fn finish(&mut self, duration: Duration, status: SpanStatus) {
        self.duration_us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.status = status;
    }

    /// Attribute value by key
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Why a span could not be handed off
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The delivery queue is full
    #[error("span queue is full ({0} pending)")]
    QueueFull(usize),

    /// The delivery task has stopped
    #[error("span reporter is closed")]
    Closed,

    /// No Tokio runtime to run the delivery task on
    #[error("no async runtime available for span delivery")]
    NoRuntime,
}

/// Sink for spans
///
/// `emit` must not block and must tolerate concurrent callers.
pub trait Reporter: Send + Sync {
    /// Service name stamped on spans
    fn service_name(&self) -> &str;

    /// Hand a span off for delivery
    fn emit(&self, span: Span) -> Result<(), ReportError>;
}

/// Reporter that drops every span
#[derive(Debug, Clone)]
pub struct NoopReporter {
    service_name: String,
}

impl NoopReporter {
    /// Create a no-op reporter
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl Reporter for NoopReporter {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn emit(&self, span: Span) -> Result<(), ReportError> {
        debug!(span_id = %span.span_id, "Dropping span (no collector configured)");
        Ok(())
    }
}

/// Reporter that ships spans to a collector over HTTP
///
/// Spans go through a bounded queue to a single background task, which posts
/// each one as a `trace.span` MIST message to `{endpoint}/mist`. The task
/// exits once the reporter is dropped and the queue drains.
#[derive(Debug)]
pub struct CollectorReporter {
    service_name: String,
    endpoint: String,
    tx: mpsc::Sender<Span>,
}

impl CollectorReporter {
    /// Start a reporter and its delivery task on the current Tokio runtime
    pub fn spawn(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, ReportError> {
        Self::spawn_with_capacity(service_name, endpoint, COLLECTOR_QUEUE_CAPACITY)
    }

    /// Like [`CollectorReporter::spawn`] with an explicit queue capacity
    pub fn spawn_with_capacity(
        service_name: impl Into<String>,
        endpoint: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, ReportError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ReportError::NoRuntime)?;

        let service_name = service_name.into();
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        handle.spawn(deliver(
            http_client,
            format!("{endpoint}/mist"),
            service_name.clone(),
            rx,
        ));

        info!(endpoint = %endpoint, "Span reporting enabled");
        Ok(Self {
            service_name,
            endpoint,
            tx,
        })
    }

    /// Collector base URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Reporter for CollectorReporter {
    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn emit(&self, span: Span) -> Result<(), ReportError> {
        self.tx.try_send(span).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ReportError::QueueFull(self.tx.max_capacity()),
            mpsc::error::TrySendError::Closed(_) => ReportError::Closed,
        })
    }
}

async fn deliver(
    http_client: reqwest::Client,
    url: String,
    service_name: String,
    mut rx: mpsc::Receiver<Span>,
) {
    while let Some(span) = rx.recv().await {
        let message = match Message::new(&service_name, TYPE_TRACE_SPAN, &span) {
            Ok(message) => message,
            Err(e) => {
                warn!(span_id = %span.span_id, error = %e, "Failed to encode span");
                continue;
            }
        };

        match http_client.post(&url).json(&message).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(span_id = %span.span_id, "Span delivered");
            }
            Ok(response) => {
                warn!(span_id = %span.span_id, status = %response.status(), "Collector rejected span");
            }
            Err(e) => {
                warn!(span_id = %span.span_id, error = %e, "Span delivery failed");
            }
        }
    }
    debug!(url = %url, "Span delivery task stopped");
}

/// Choose a reporter: a collector when `endpoint` is set, otherwise a no-op
///
/// Falls back to [`NoopReporter`] if the collector cannot be started.
pub fn reporter_for(service_name: &str, endpoint: Option<&str>) -> Arc<dyn Reporter> {
    match endpoint.map(str::trim).filter(|e| !e.is_empty()) {
        Some(endpoint) => match CollectorReporter::spawn(service_name, endpoint) {
            Ok(reporter) => Arc::new(reporter),
            Err(e) => {
                warn!(error = %e, "Span reporting disabled");
                Arc::new(NoopReporter::new(service_name))
            }
        },
        None => Arc::new(NoopReporter::new(service_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_ids_are_hex() {
        let span = Span::start("infermux", "infer");
        assert_eq!(span.trace_id.len(), 32);
        assert_eq!(span.span_id.len(), 16);
        assert!(span.trace_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(span.trace_id, Span::start("infermux", "infer").trace_id);
    }

    #[test]
    fn test_finish_records_outcome() {
        let mut span = Span::start("infermux", "infer").with_attribute(ATTR_PROVIDER, "echo");
        span.finish(Duration::from_millis(3), SpanStatus::Error);
        assert_eq!(span.duration_us, 3000);
        assert_eq!(span.status, SpanStatus::Error);
        assert_eq!(span.attribute(ATTR_PROVIDER), Some("echo"));

        let value = serde_json::to_value(&span).unwrap();
        assert_eq!(value["status"], "error");
    }

    #[test]
    fn test_noop_never_errors() {
        let reporter = NoopReporter::new("infermux");
        for _ in 0..2000 {
            reporter.emit(Span::start("infermux", "infer")).unwrap();
        }
        assert_eq!(reporter.service_name(), "infermux");
    }

    #[test]
    fn test_reporter_for_without_endpoint_is_noop() {
        // No runtime here: a no-op reporter must not need one
        let reporter = reporter_for("infermux", None);
        assert!(reporter.emit(Span::start("infermux", "infer")).is_ok());
        let reporter = reporter_for("infermux", Some("  "));
        assert!(reporter.emit(Span::start("infermux", "infer")).is_ok());
    }

    #[test]
    fn test_collector_needs_runtime() {
        let err = CollectorReporter::spawn("infermux", "http://127.0.0.1:9").unwrap_err();
        assert_eq!(err, ReportError::NoRuntime);
    }

    #[tokio::test]
    async fn test_full_queue_is_reported_not_blocking() {
        // current_thread runtime: the delivery task cannot drain until we yield
        let reporter =
            CollectorReporter::spawn_with_capacity("infermux", "http://127.0.0.1:9/", 2).unwrap();
        assert_eq!(reporter.endpoint(), "http://127.0.0.1:9");

        reporter.emit(Span::start("infermux", "infer")).unwrap();
        reporter.emit(Span::start("infermux", "infer")).unwrap();
        assert_eq!(
            reporter.emit(Span::start("infermux", "infer")),
            Err(ReportError::QueueFull(2))
        );
    }
}
