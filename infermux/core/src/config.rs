//! TOML Configuration File Support
//!
//! Configuration for the router process, loaded from
//! `~/.config/infermux/infermux.toml` when present.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`INFERMUX_ADDR`, `INFERMUX_TOKENTRACE`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! addr = ":8600"
//!
//! [trace]
//! tokentrace_url = "http://localhost:8700"
//! service_name = "infermux"
//!
//! [[providers]]
//! name = "echo"
//! models = ["echo-v1"]
//! latency_ms = 1
//!
//! [[providers]]
//! name = "local"
//! kind = "ollama"
//! models = ["llama3.2", "qwen2.5"]
//! host = "localhost"
//! port = 11434
//! ```
//!
//! A file that declares any `[[providers]]` replaces the default provider list.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{EchoProvider, OllamaProvider, Provider, DEFAULT_OLLAMA_PORT};
use crate::registry::{Registry, RegistryError};

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = ":8600";

/// Default service name on spans
pub const DEFAULT_SERVICE_NAME: &str = "infermux";

/// Environment variable: listen address
pub const ENV_ADDR: &str = "INFERMUX_ADDR";
/// Environment variable: trace collector URL
pub const ENV_TOKENTRACE: &str = "INFERMUX_TOKENTRACE";
/// Environment variable: config file path
pub const ENV_CONFIG: &str = "INFERMUX_CONFIG";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Provider Declarations
// =============================================================================

/// Kind of backend a provider entry builds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// [`EchoProvider`]
    #[default]
    Echo,
    /// [`OllamaProvider`]
    Ollama,
}

/// One `[[providers]]` entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name
    pub name: String,
    /// Declared models, in order
    pub models: Vec<String>,
    /// Backend kind
    #[serde(default)]
    pub kind: ProviderKind,
    /// Simulated latency (echo only)
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    /// Server host (ollama only)
    #[serde(default)]
    pub host: Option<String>,
    /// Server port (ollama only)
    #[serde(default)]
    pub port: Option<u16>,
}

fn default_latency_ms() -> u64 {
    1
}

impl ProviderConfig {
    /// An echo provider entry
    pub fn echo<I, S>(name: impl Into<String>, models: I, latency: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            models: models.into_iter().map(Into::into).collect(),
            kind: ProviderKind::Echo,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            host: None,
            port: None,
        }
    }

    /// Construct the provider this entry describes
    #[must_use]
    pub fn build(&self) -> Arc<dyn Provider> {
        match self.kind {
            ProviderKind::Echo => Arc::new(EchoProvider::new(
                self.name.clone(),
                self.models.iter().cloned(),
                Duration::from_millis(self.latency_ms),
            )),
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(
                self.name.clone(),
                self.models.iter().cloned(),
                self.host.clone().unwrap_or_else(|| "localhost".to_string()),
                self.port.unwrap_or(DEFAULT_OLLAMA_PORT),
            )),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address (`":8600"`, `"127.0.0.1:8600"`)
    pub addr: Option<String>,
}

/// Trace section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceToml {
    /// Collector base URL (empty = no reporting)
    pub tokentrace_url: Option<String>,
    /// Service name on spans
    pub service_name: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InfermuxToml {
    /// Server section
    pub server: ServerToml,
    /// Trace section
    pub trace: TraceToml,
    /// Provider entries
    pub providers: Vec<ProviderConfig>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration
#[derive(Clone, Debug)]
pub struct InfermuxConfig {
    /// HTTP listen address
    pub listen_addr: String,
    /// Collector base URL; `None` means spans are dropped
    pub tokentrace_url: Option<String>,
    /// Service name on spans
    pub service_name: String,
    /// Providers to register, in order
    pub providers: Vec<ProviderConfig>,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for InfermuxConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            tokentrace_url: None,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            providers: vec![ProviderConfig::echo(
                "echo",
                ["echo-v1"],
                Duration::from_millis(1),
            )],
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl InfermuxConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that cannot be caught by parsing alone
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an unusable address, an empty service name
    /// or an empty provider list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_listen_addr(&self.listen_addr)?;
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name must not be empty".to_string(),
            ));
        }
        if self.providers.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one provider is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed listen address
    ///
    /// # Errors
    ///
    /// See [`parse_listen_addr`].
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_listen_addr(&self.listen_addr)
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/infermux/infermux.toml` or
/// `~/.config/infermux/infermux.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("infermux").join("infermux.toml"))
}

/// Load configuration from the default path plus environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<InfermuxConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path plus environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<InfermuxConfig, ConfigError> {
    let mut config = load_file_config(path)?;
    apply_env_config(&mut config);
    Ok(config)
}

/// Defaults overlaid with the TOML file at `path`, if it exists
fn load_file_config(path: Option<PathBuf>) -> Result<InfermuxConfig, ConfigError> {
    let mut config = InfermuxConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: InfermuxToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut InfermuxConfig, toml: InfermuxToml) {
    if let Some(addr) = toml.server.addr {
        config.listen_addr = addr;
    }
    if let Some(url) = toml.trace.tokentrace_url {
        config.tokentrace_url = non_empty(url);
    }
    if let Some(name) = toml.trace.service_name {
        config.service_name = name;
    }
    if !toml.providers.is_empty() {
        config.providers = toml.providers;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut InfermuxConfig) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

fn apply_env_from(config: &mut InfermuxConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(addr) = var(ENV_ADDR) {
        config.listen_addr = addr;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = var(ENV_TOKENTRACE) {
        config.tokentrace_url = non_empty(url);
        config.source = ConfigSource::Env;
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a listen address
///
/// Accepts full socket addresses and the `":PORT"` form, which binds every
/// interface. `localhost` maps to the IPv4 loopback.
///
/// # Errors
///
/// Returns `ValidationError` if the address cannot be parsed.
pub fn parse_listen_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    let addr = addr.trim();
    let invalid = || ConfigError::ValidationError(format!("invalid listen address {addr:?}"));

    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Some(port) = addr.strip_prefix("localhost:") {
        let port: u16 = port.parse().map_err(|_| invalid())?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }
    addr.parse().map_err(|_| invalid())
}

/// Register every configured provider, in order
///
/// # Errors
///
/// Fails on the first provider the registry rejects. A partially built
/// registry is never returned.
pub fn build_registry(providers: &[ProviderConfig]) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    for provider in providers {
        registry.register(provider.build())?;
    }
    Ok(registry)
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen address override
    pub listen_addr: Option<String>,

    /// Collector URL override (empty string disables reporting)
    pub tokentrace_url: Option<String>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set listen address override
    #[must_use]
    pub fn with_listen_addr(mut self, addr: String) -> Self {
        self.listen_addr = Some(addr);
        self
    }

    /// Set collector URL override
    #[must_use]
    pub fn with_tokentrace_url(mut self, url: String) -> Self {
        self.tokentrace_url = Some(url);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut InfermuxConfig) {
        if self.listen_addr.is_some() || self.tokentrace_url.is_some() {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref addr) = self.listen_addr {
            config.listen_addr.clone_from(addr);
        }

        if let Some(ref url) = self.tokentrace_url {
            config.tokentrace_url = non_empty(url.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    // =========================================================================
    // Default Configuration Tests
    // =========================================================================

    #[test]
    fn test_default_config() {
        let config = InfermuxConfig::default();

        assert_eq!(config.listen_addr, ":8600");
        assert_eq!(config.tokentrace_url, None);
        assert_eq!(config.service_name, "infermux");
        assert_eq!(
            config.providers,
            vec![ProviderConfig::echo("echo", ["echo-v1"], Duration::from_millis(1))]
        );
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        if let Some(p) = default_config_path() {
            assert!(p.ends_with("infermux/infermux.toml"));
        }
    }

    // =========================================================================
    // TOML Parsing Tests
    // =========================================================================

    #[test]
    fn test_parse_full_toml() {
        let file = write_toml(
            r#"
[server]
addr = "127.0.0.1:9000"

[trace]
tokentrace_url = "http://localhost:8700"
service_name = "router-a"

[[providers]]
name = "echo"
models = ["echo-v1", "echo-v2"]
latency_ms = 5

[[providers]]
name = "local"
kind = "ollama"
models = ["llama3.2"]
port = 11500
"#,
        );

        let config = load_file_config(Some(file.path().to_path_buf())).unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.tokentrace_url.as_deref(), Some("http://localhost:8700"));
        assert_eq!(config.service_name, "router-a");
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].latency_ms, 5);
        assert_eq!(config.providers[1].kind, ProviderKind::Ollama);
        assert_eq!(config.providers[1].port, Some(11500));
        assert_eq!(config.source(), ConfigSource::File);
        assert_eq!(config.config_file_path.as_deref(), Some(file.path()));

        let registry = build_registry(&config.providers).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("llama3.2").unwrap().provider.name(), "local");
    }

    #[test]
    fn test_partial_toml_keeps_default_providers() {
        let file = write_toml(
            r#"
[trace]
tokentrace_url = ""
"#,
        );

        let config = load_file_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.listen_addr, ":8600");
        assert_eq!(config.tokentrace_url, None);
        assert_eq!(config.providers, InfermuxConfig::default().providers);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config =
            load_file_config(Some(PathBuf::from("/nonexistent/infermux/infermux.toml"))).unwrap();
        assert_eq!(config.source(), ConfigSource::Default);
        assert!(config.config_file_path.is_none());
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let file = write_toml("[server\naddr = 1");
        let err = load_file_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_unknown_provider_kind_is_parse_error() {
        let file = write_toml(
            r#"
[[providers]]
name = "x"
kind = "carrier-pigeon"
models = ["m"]
"#,
        );
        let err = load_file_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    // =========================================================================
    // Environment and CLI Override Tests
    // =========================================================================

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_ADDR, ":9100"), (ENV_TOKENTRACE, "http://collector:8700")]);

        let mut config = InfermuxConfig::default();
        apply_env_from(&mut config, |key| env.get(key).map(ToString::to_string));

        assert_eq!(config.listen_addr, ":9100");
        assert_eq!(config.tokentrace_url.as_deref(), Some("http://collector:8700"));
        assert_eq!(config.source(), ConfigSource::Env);
    }

    #[test]
    fn test_cli_overrides_apply_last() {
        let mut config = InfermuxConfig::default();
        config.tokentrace_url = Some("http://from-file".to_string());

        ConfigOverrides::new()
            .with_listen_addr("127.0.0.1:0".to_string())
            .with_tokentrace_url(String::new())
            .apply(&mut config);

        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert_eq!(config.tokentrace_url, None);
        assert_eq!(config.source(), ConfigSource::Cli);
    }

    #[test]
    fn test_empty_overrides_keep_source() {
        let mut config = InfermuxConfig::default();
        ConfigOverrides::new().apply(&mut config);
        assert_eq!(config.source(), ConfigSource::Default);
    }

    // =========================================================================
    // Validation Tests
    // =========================================================================

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr(":8600").unwrap(),
            "0.0.0.0:8600".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr("localhost:8600").unwrap(),
            "127.0.0.1:8600".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            parse_listen_addr("[::1]:80").unwrap(),
            "[::1]:80".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_addr(":http").is_err());
        assert!(parse_listen_addr("nowhere").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = InfermuxConfig::default();
        config.providers.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = InfermuxConfig::default();
        config.listen_addr = "not an address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_registry_is_fatal_on_conflict() {
        let providers = vec![
            ProviderConfig::echo("a", ["shared"], Duration::from_millis(1)),
            ProviderConfig::echo("b", ["shared"], Duration::from_millis(1)),
        ];
        let err = build_registry(&providers).unwrap_err();
        assert!(matches!(err, RegistryError::Conflict { .. }));
    }
}
