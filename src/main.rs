//! callpop - Asterisk AMI answered-call watcher.
//!
//! Connects to an Asterisk Manager Interface, watches dial events for one
//! extension, and opens a ticket screen-pop for every answered call.
//!
//! # Commands
//!
//! - `callpop init-config`: Write a settings template to fill in
//! - `callpop run`: Start the daemon
//!
//! Logging goes to stderr; set `RUST_LOG` to adjust verbosity.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use callpop::ami::AmiClient;
use callpop::config::Config;
use callpop::correlate::CorrelationEngine;
use callpop::dispatch::{BrowserSink, Dispatcher};
use callpop::event::AmiEvent;

/// Capacity of the AMI event channel.
const EVENT_CHANNEL_SIZE: usize = 256;

/// callpop - Asterisk AMI answered-call watcher.
///
/// Watches AMI dial events for the configured extension and opens the
/// ticket frontend in the default browser when a call is answered.
#[derive(Parser, Debug)]
#[command(name = "callpop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to settings.json (default: next to the executable, then
    /// ~/.callpop/settings.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Write a settings.json template for the operator to fill in.
    InitConfig {
        /// Overwrite an existing settings file.
        #[arg(short, long)]
        force: bool,
    },

    /// Start the daemon.
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path().context("Failed to resolve settings path")?,
    };

    match cli.command {
        Command::InitConfig { force } => run_init_config(&config_path, force),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_daemon(&config_path))
        }
    }
}

/// Writes the settings template.
fn run_init_config(path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Settings file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::write_template(path).context("Failed to write settings template")?;
    println!("Settings template written to: {}", path.display());
    println!("Fill in host, username, secret and extension, then run `callpop run`.");
    Ok(())
}

/// Runs the daemon: connect, correlate, dispatch, until shutdown.
async fn run_daemon(config_path: &std::path::Path) -> Result<()> {
    init_logging();

    info!("Starting callpop");

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(callpop::ConfigError::NotFound(path)) => {
            // First start on this machine: leave a template behind so the
            // operator has something to fill in, then bail out.
            Config::write_template(&path)
                .context("Failed to write settings template")?;
            anyhow::bail!(
                "Settings file was missing; template created at {}. Fill it in and restart.",
                path.display()
            );
        }
        Err(e) => return Err(e).context("Failed to load configuration"),
    };

    info!(
        host = %config.host,
        port = config.port,
        extension = %config.extension,
        "Configuration loaded"
    );

    // Startup connection failure is fatal; reconnects only happen after a
    // successful first login.
    let client = AmiClient::connect(&config)
        .await
        .context("Failed to connect to AMI")?;

    let mut engine = CorrelationEngine::new(
        config.extension.clone(),
        config.id_source,
        config.include_internal_calls,
    );
    let dispatcher = Dispatcher::new(
        config.base_url.clone(),
        config.dept_id.clone(),
        Arc::new(BrowserSink),
    );

    let (event_tx, mut event_rx) = mpsc::channel::<AmiEvent>(EVENT_CHANNEL_SIZE);
    let client_task = tokio::spawn(client.run(event_tx));

    info!(extension = %config.extension, "Watching for answered calls. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            maybe_event = event_rx.recv() => {
                match maybe_event {
                    Some(event) => {
                        if let Some(request) = engine.handle(&event) {
                            // Fire and forget; a hanging browser must not
                            // stall event processing.
                            dispatcher.dispatch(request);
                        }
                    }
                    None => {
                        error!("AMI client task ended unexpectedly");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the receiver tells the client task to log off and stop.
    // In-flight screen-pop tasks are not awaited.
    drop(event_rx);
    let stats = engine.stats();
    debug!(
        pending_calls = stats.pending_calls,
        answer_entries = stats.answer_entries,
        "Final engine state"
    );

    client_task.abort();
    info!("callpop stopped");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
