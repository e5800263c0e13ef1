//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use infermux_core::trace::{ReportError, Reporter, Span};
use infermux_core::{CallContext, Provider, Registry, Router};

// ============================================================================
// Call-Counting Provider
// ============================================================================

/// Echo-like provider that records how often `run` was entered
pub struct CountingProvider {
    name: String,
    models: Vec<String>,
    latency: Duration,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new(name: &str, models: &[&str], latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            models: models.iter().map(ToString::to_string).collect(),
            latency,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for CountingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_models(&self) -> &[String] {
        &self.models
    }

    async fn run(&self, ctx: &CallContext, _model: &str, prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            () = tokio::time::sleep(self.latency) => Ok(prompt.to_string()),
            reason = ctx.done() => Err(reason.into()),
        }
    }
}

// ============================================================================
// Reporters
// ============================================================================

/// Keeps every span in memory
#[derive(Default)]
pub struct RecordingReporter {
    spans: Mutex<Vec<Span>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn service_name(&self) -> &str {
        "infermux-test"
    }

    fn emit(&self, span: Span) -> Result<(), ReportError> {
        self.spans.lock().unwrap().push(span);
        Ok(())
    }
}

/// Rejects every span
pub struct BrokenReporter;

impl Reporter for BrokenReporter {
    fn service_name(&self) -> &str {
        "infermux-test"
    }

    fn emit(&self, _span: Span) -> Result<(), ReportError> {
        Err(ReportError::Closed)
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn registry_with(providers: &[Arc<CountingProvider>]) -> Arc<Registry> {
    let mut registry = Registry::new();
    for provider in providers {
        registry.register(Arc::clone(provider) as Arc<dyn Provider>).unwrap();
    }
    Arc::new(registry)
}

pub fn router_with(providers: &[Arc<CountingProvider>], reporter: Arc<dyn Reporter>) -> Router {
    Router::new(registry_with(providers), reporter)
}
