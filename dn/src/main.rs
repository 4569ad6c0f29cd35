//! dronenet - supervised drone simulation core
//!
//! CLI entry point: standalone runs, networked peers and registry listing.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use dronenet::app::{App, Mode, spawn_input_pump};
use dronenet::cli::{Cli, Command, OutputFormat, get_log_path};
use dronenet::config::Config;
use dronenet::message::WorkerRole;
use dronenet::net::IoMode;
use dronenet::supervisor::SupervisorHandle;
use pidregistry::PidRegistry;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match cli_log_level.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let code = runtime.block_on(dispatch(cli.command, config))?;

    // A pending stdin read would otherwise hold the runtime open
    runtime.shutdown_background();
    std::process::exit(code);
}

async fn dispatch(command: Option<Command>, mut config: Config) -> Result<i32> {
    debug!(?command, "main: dispatching command");
    match command {
        None | Some(Command::Run) => {
            debug!("main: matched Run command");
            cmd_run(config, Mode::Standalone).await
        }
        Some(Command::Serve { port, io }) => {
            debug!(?port, ?io, "main: matched Serve command");
            apply_overrides(&mut config, None, port, io);
            let port = config.network.port;
            cmd_run(config, Mode::Serve { port }).await
        }
        Some(Command::Connect { address, port, io }) => {
            debug!(?address, ?port, ?io, "main: matched Connect command");
            apply_overrides(&mut config, address, port, io);
            let mode = Mode::Connect {
                address: config.network.address.clone(),
                port: config.network.port,
            };
            cmd_run(config, mode).await
        }
        Some(Command::Registry { format }) => {
            debug!(%format, "main: matched Registry command");
            cmd_registry(&config, format)?;
            Ok(0)
        }
    }
}

fn apply_overrides(config: &mut Config, address: Option<String>, port: Option<u16>, io: Option<IoMode>) {
    if let Some(address) = address {
        config.network.address = address;
    }
    if let Some(port) = port {
        config.network.port = port;
    }
    if let Some(io) = io {
        config.network.io_mode = io;
    }
}

async fn cmd_run(config: Config, mode: Mode) -> Result<i32> {
    debug!(?mode, "cmd_run: called");
    let mut app = App::new(config, mode);
    let handle = app.supervisor_handle();

    let input = app.attach(WorkerRole::Input);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    spawn_input_pump(stdin, input, &handle)
        .await
        .context("Failed to start input pump")?;

    let signals = tokio::spawn(forward_signals(handle));
    let report = app.run().await?;
    signals.abort();

    if let Some(e) = report.outcome.to_error() {
        eprintln!("{}", report.outcome);
        warn!(error = %e, "Run failed");
    } else {
        println!("{}", report.outcome);
    }
    info!(
        cycles = report.cycles,
        killed = report.killed.len(),
        "Run finished"
    );
    Ok(report.outcome.exit_code())
}

/// Turn SIGINT/SIGTERM into an operator interrupt
async fn forward_signals(handle: SupervisorHandle) {
    debug!("forward_signals: setting up signal handlers");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        info!("Ctrl-C received, shutting down");
    }

    if let Err(e) = handle.interrupt().await {
        debug!(error = %e, "forward_signals: supervisor already gone");
    }
}

fn cmd_registry(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(%format, "cmd_registry: called");
    let registry = PidRegistry::new(config.registry.path());
    let entries = registry.entries().context("Failed to read pid registry")?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&entries).context("Failed to serialize registry")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No entries in {}", registry.path().display());
            } else {
                println!("{:<8} PID", "TAG");
                for entry in entries {
                    println!("{:<8} {}", entry.tag, entry.pid);
                }
            }
        }
    }
    Ok(())
}
