use anyhow::Result;
use clap::{Args, Subcommand};

use crate::client::{DaemonClient, stop_daemon};
use crate::models::Config;
use crate::server::run_daemon;

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[command(subcommand)]
    pub command: Option<ServeCommand>,

    #[arg(long, hide = true)]
    pub daemon: bool,

    #[arg(long, hide = true)]
    pub foreground: bool,
}

#[derive(Debug, Subcommand)]
pub enum ServeCommand {
    Stop,
    Restart,
}

pub async fn handle_serve(args: ServeArgs) -> Result<()> {
    let config = Config::load()?;

    if args.daemon {
        return run_daemon_mode(config).await;
    }

    if args.foreground {
        eprintln!("Starting daemon in foreground mode...");
        return run_daemon_mode(config).await;
    }

    match args.command {
        Some(ServeCommand::Stop) => handle_stop(&config).await,
        Some(ServeCommand::Restart) => handle_restart(&config).await,
        None => handle_start(&config),
    }
}

fn handle_start(config: &Config) -> Result<()> {
    let client = DaemonClient::new(config);

    if client.is_running() {
        println!("Daemon is already running");
        return Ok(());
    }

    let exe = std::env::current_exe()?;

    std::process::Command::new(&exe)
        .args(["serve", "--daemon"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    println!("Daemon started");
    println!("Socket: {}", config.socket_path().display());
    Ok(())
}

async fn handle_stop(config: &Config) -> Result<()> {
    // Ask the daemon to drain and exit; fall back to SIGTERM via the pid
    // file when the socket is gone or unresponsive.
    let client = DaemonClient::new(config);
    if client.is_running() && client.shutdown().await.is_ok() {
        println!("Daemon stopped");
        return Ok(());
    }

    match stop_daemon(config) {
        Ok(_) => {
            println!("Daemon stopped");
            Ok(())
        }
        Err(crate::error::DaemonError::NotRunning) => {
            println!("Daemon is not running");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_restart(config: &Config) -> Result<()> {
    let _ = handle_stop(config).await;
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    handle_start(config)
}

async fn run_daemon_mode(config: Config) -> Result<()> {
    init_tracing();
    run_daemon(config).await
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
