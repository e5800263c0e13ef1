//! Ollama Provider
//!
//! Backend adapter for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! Uses the batch form of the generate endpoint:
//! - `POST /api/generate` with `{"model", "prompt", "stream": false}`
//! - The completion is in the `response` field of the reply
//!
//! The HTTP request is raced against the call context, so a cancelled or
//! timed-out routing call drops the in-flight request.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::Provider;
use crate::context::CallContext;

/// Default Ollama port
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Provider backed by an Ollama server
#[derive(Clone, Debug)]
pub struct OllamaProvider {
    /// Provider name
    name: String,
    /// Models this provider is registered for
    models: Vec<String>,
    /// Host address
    host: String,
    /// Port number
    port: u16,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    pub fn new<I, S>(name: impl Into<String>, models: I, host: impl Into<String>, port: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            models: models.into_iter().map(Into::into).collect(),
            host: host.into(),
            port,
            http_client,
        }
    }

    /// Get the base URL
    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    async fn generate(&self, model: &str, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .http_client
            .post(self.generate_url())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }

        let data: serde_json::Value = response.json().await?;
        let content = data
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Ollama reply has no \"response\" field"))?
            .to_string();

        Ok(content)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supported_models(&self) -> &[String] {
        &self.models
    }

    async fn run(&self, ctx: &CallContext, model: &str, prompt: &str) -> anyhow::Result<String> {
        tokio::select! {
            result = self.generate(model, prompt) => result,
            reason = ctx.done() => Err(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new("local", ["llama3.2", "qwen2.5"], "localhost", 11434);
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.base_url(), "http://localhost:11434");
        assert_eq!(provider.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(provider.supported_models().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_provider_failure() {
        // Port 9 (discard) is essentially never an HTTP server
        let provider = OllamaProvider::new("local", ["llama3.2"], "127.0.0.1", 9);
        let ctx = CallContext::background().with_timeout(Duration::from_secs(10));

        let err = provider.run(&ctx, "llama3.2", "hello").await.unwrap_err();
        assert!(err
            .downcast_ref::<crate::context::Interrupt>()
            .is_none());
    }
}
