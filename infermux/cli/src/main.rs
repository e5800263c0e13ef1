//! InferMux - Inference Request Router
//!
//! Command-line entry point. Two front doors share one routing core:
//!
//! - `serve`: the HTTP service (`/mist`, `/infer`, `/providers`, ...)
//! - `infer`: a single inference call, printing only the content to stdout
//!
//! # Usage
//!
//! ```bash
//! # Start the service on the default address (:8600)
//! infermux serve
//!
//! # Report spans to a collector
//! infermux serve --addr 127.0.0.1:8600 --tokentrace http://localhost:8700
//!
//! # One-shot inference
//! infermux infer --model echo-v1 --prompt "hello"
//! infermux infer "hello"
//!
//! # Verbose logging
//! RUST_LOG=debug infermux serve
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: graceful shutdown (`serve`), cancel the call (`infer`)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use infermux_core::config::ENV_CONFIG;
use infermux_core::gateway::{self, GatewayState};
use infermux_core::{
    build_registry, default_config_path, infer_from_cli, load_config_from_path, reporter_for,
    CallContext, ConfigOverrides, InfermuxConfig, NoopReporter, Router, AUTO_MODEL,
};

/// InferMux - route inference requests to model providers
#[derive(Parser, Debug)]
#[command(name = "infermux")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(short = 'l', long, global = true, env = "INFERMUX_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the InferMux inference router
    Serve(ServeArgs),
    /// Run a one-shot inference request
    Infer(InferArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address (`:PORT` binds every interface)
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,

    /// TokenTrace URL for span reporting (empty disables reporting)
    #[arg(long, value_name = "URL")]
    tokentrace: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = ENV_CONFIG, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InferArgs {
    /// Model to use
    #[arg(long, default_value = AUTO_MODEL)]
    model: String,

    /// Prompt text
    #[arg(long)]
    prompt: Option<String>,

    /// Prompt text, when `--prompt` is not given
    #[arg(value_name = "TEXT")]
    text: Option<String>,

    /// Give up after this many milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Configuration file path
    #[arg(short = 'c', long, env = ENV_CONFIG, value_name = "FILE")]
    config: Option<PathBuf>,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so `infer` keeps stdout for the content.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("infermux={level},infermux_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
}

/// Load configuration from `path`, or the default location
///
/// An explicitly named file must exist.
fn load_config(path: Option<PathBuf>) -> Result<InfermuxConfig> {
    if let Some(ref path) = path {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
    }
    let path = path.or_else(default_config_path);
    load_config_from_path(path).context("Failed to load configuration")
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("InferMux starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config)?;
    let mut overrides = ConfigOverrides::new();
    if let Some(addr) = args.addr {
        overrides = overrides.with_listen_addr(addr);
    }
    if let Some(url) = args.tokentrace {
        overrides = overrides.with_tokentrace_url(url);
    }
    overrides.apply(&mut config);
    config.validate()?;
    info!(source = %config.source(), "Configuration resolved");

    let addr = config.socket_addr()?;
    // A registry that cannot be fully built must never serve
    let registry = build_registry(&config.providers).context("Failed to build provider registry")?;
    let reporter = reporter_for(&config.service_name, config.tokentrace_url.as_deref());
    let router = Arc::new(Router::new(Arc::new(registry), reporter));
    let state = Arc::new(GatewayState::new(router, config.service_name.clone()));

    gateway::serve(state, addr, shutdown_signal()).await?;

    info!("InferMux stopped cleanly");
    Ok(())
}

async fn infer(args: InferArgs) -> Result<()> {
    let prompt = args
        .prompt
        .filter(|p| !p.is_empty())
        .or(args.text)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow::anyhow!("--prompt is required"))?;

    let config = load_config(args.config)?;
    let registry = build_registry(&config.providers).context("Failed to build provider registry")?;
    let router = Router::new(
        Arc::new(registry),
        Arc::new(NoopReporter::new(config.service_name.clone())),
    );

    let (ctx, handle) = CallContext::with_cancel();
    let ctx = match args.timeout_ms {
        Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
        None => ctx,
    };
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, cancelling request");
            handle.cancel();
        }
    });

    let result = infer_from_cli(&router, &ctx, &args.model, &prompt).await?;
    println!("{}", result.content);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Infer(args) => infer(args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // `infer` stays quiet unless asked, so stderr only carries errors
    let default_level = match cli.command {
        Command::Serve(_) => "info",
        Command::Infer(_) => "warn",
    };
    let level = cli.log_level.clone().unwrap_or_else(|| default_level.to_string());
    if let Err(e) = init_logging(&level) {
        eprintln!("{e:#}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("infermux: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_infer_defaults() {
        let cli = Cli::try_parse_from(["infermux", "infer", "hello"]).unwrap();
        let Command::Infer(args) = cli.command else {
            panic!("expected infer");
        };
        assert_eq!(args.model, "auto");
        assert_eq!(args.text.as_deref(), Some("hello"));
        assert!(args.prompt.is_none());
    }

    #[test]
    fn test_serve_flags() {
        let cli = Cli::try_parse_from([
            "infermux",
            "serve",
            "--addr",
            ":9000",
            "--tokentrace",
            "http://localhost:8700",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.addr.as_deref(), Some(":9000"));
        assert_eq!(args.tokentrace.as_deref(), Some("http://localhost:8700"));
    }

    #[tokio::test]
    async fn test_infer_requires_prompt() {
        let args = InferArgs {
            model: AUTO_MODEL.to_string(),
            prompt: None,
            text: None,
            timeout_ms: None,
            config: None,
        };
        let err = infer(args).await.unwrap_err();
        assert_eq!(err.to_string(), "--prompt is required");
    }
}
