//! Echo Provider
//!
//! Deterministic provider for tests and local operation. Each call sleeps for
//! a fixed simulated latency, then returns the prompt unchanged. Cancellation
//! and deadlines cut the simulated delay short.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::Provider;
use crate::context::CallContext;

/// Provider that echoes the prompt back after a fixed delay
#[derive(Clone, Debug)]
pub struct EchoProvider {
    name: String,
    models: Vec<String>,
    latency: Duration,
}

impl EchoProvider {
    /// Create an echo provider
    pub fn new<I, S>(name: impl Into<String>, models: I, latency: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            models: models.into_iter().map(Into::into).collect(),
            latency,
        }
    }

    /// Simulated per-call latency
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.latency
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_models(&self) -> &[String] {
        &self.models
    }

    async fn run(&self, ctx: &CallContext, _model: &str, prompt: &str) -> anyhow::Result<String> {
        tokio::select! {
            () = tokio::time::sleep(self.latency) => Ok(prompt.to_string()),
            reason = ctx.done() => Err(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Interrupt;

    #[tokio::test(start_paused = true)]
    async fn test_echo_returns_prompt() {
        let provider = EchoProvider::new("echo", ["echo-v1"], Duration::from_millis(1));
        assert_eq!(provider.name(), "echo");
        assert_eq!(provider.supported_models(), ["echo-v1".to_string()]);

        let content = provider
            .run(&CallContext::background(), "echo-v1", "hello")
            .await
            .unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_stops_on_cancel() {
        let provider = EchoProvider::new("slow", ["slow-v1"], Duration::from_secs(30));
        let (ctx, handle) = CallContext::with_cancel();

        let started = tokio::time::Instant::now();
        let run = provider.run(&ctx, "slow-v1", "hello");
        tokio::pin!(run);

        tokio::select! {
            _ = &mut run => panic!("provider finished before cancel"),
            () = tokio::time::sleep(Duration::from_millis(5)) => handle.cancel(),
        }

        let err = run.await.unwrap_err();
        assert_eq!(err.downcast_ref::<Interrupt>(), Some(&Interrupt::Canceled));
        assert!(started.elapsed() < provider.latency());
    }

    #[tokio::test(start_paused = true)]
    async fn test_echo_honors_deadline() {
        let provider = EchoProvider::new("slow", ["slow-v1"], Duration::from_secs(30));
        let ctx = CallContext::background().with_timeout(Duration::from_millis(10));

        let err = provider.run(&ctx, "slow-v1", "hello").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<Interrupt>(),
            Some(&Interrupt::DeadlineExceeded)
        );
    }
}
