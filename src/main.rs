#![forbid(unsafe_code)]

//! Command-line driver for an analysis service.
//!
//! Parses arguments, loads configuration, installs the Ctrl-C / SIGTERM
//! handler and runs one [`Session`] against the given directory.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use analysis_client::console::Console;
use analysis_client::session::Session;
use analysis_client::{AppError, ClientConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "analysis-client",
    about = "Analyze a directory with an analysis service and report issues",
    version,
    long_about = None
)]
struct Cli {
    /// Directory to analyze.
    directory: PathBuf,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the service executable.
    #[arg(long)]
    server: Option<String>,

    /// Argument for the service executable (repeatable, replaces the
    /// configured arguments).
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage errors exit 1; --help and --version exit 0.
            let code = if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            err.print().ok();
            return code;
        }
    };

    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "analysis-client exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<()> {
    // ── Validate target ─────────────────────────────────
    if !args.directory.is_dir() {
        eprintln!("Given directory does not exist: {}", args.directory.display());
        return Err(AppError::Config(format!(
            "directory does not exist: {}",
            args.directory.display()
        )));
    }
    let target = args.directory.canonicalize().map_err(|err| {
        eprintln!("Cannot resolve {}: {err}", args.directory.display());
        AppError::Io(format!("cannot resolve target directory: {err}"))
    })?;

    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path).inspect_err(|err| eprintln!("{err}"))?,
        None => ClientConfig::default(),
    };
    config.override_server(args.server, args.server_args);
    config.validate().inspect_err(|err| eprintln!("{err}"))?;
    info!(command = %config.server.command, "configuration loaded");

    // ── Interrupt handling ──────────────────────────────
    let interrupt = CancellationToken::new();
    let signal_token = interrupt.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    // ── Session ─────────────────────────────────────────
    let mut session = Session::new(config, Console::stdout());
    session.run(&target, interrupt).await
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
