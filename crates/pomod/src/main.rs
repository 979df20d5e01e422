//! pomod - Shared session timer daemon
//!
//! This binary runs the WebSocket server that keeps every participant of a
//! timer session in sync.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! pomod start
//!
//! # Start the daemon (background/daemonized)
//! pomod start -d
//!
//! # Listen somewhere else
//! pomod start --bind 127.0.0.1 --port 9000
//! POMOD_PORT=9000 pomod
//!
//! # Stop the daemon
//! pomod stop
//!
//! # Check daemon status
//! pomod status
//!
//! # Enable debug logging
//! RUST_LOG=pomod=debug pomod start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::fs::{self, File};
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pomod::config::{DaemonConfig, CONFIG_ENV};
use pomod::registry::spawn_registry;
use pomod::server::DaemonServer;

/// pomod - shared session timer daemon
#[derive(Parser, Debug)]
#[command(name = "pomod", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    listen: ListenArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon (the default)
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Settings layered over the config file.
#[derive(ClapArgs, Debug)]
struct ListenArgs {
    /// TCP port to listen on
    #[arg(long, global = true, env = "POMOD_PORT")]
    port: Option<u16>,

    /// Interface address to listen on
    #[arg(long, global = true, env = "POMOD_BIND")]
    bind: Option<IpAddr>,

    /// Path to a TOML config file
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,
}

impl ListenArgs {
    /// Resolves defaults < config file < environment < flags.
    fn resolve(&self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig::load(self.config.as_deref())?;
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        Ok(config)
    }
}

/// Returns the daemon's state directory.
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("pomosync")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("pomod.pid")
}

/// Returns the path to the file recording the listen address.
fn addr_file_path() -> PathBuf {
    state_dir().join("pomod.addr")
}

/// Returns the path to the log file.
fn log_file_path() -> PathBuf {
    state_dir().join("pomod.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
    let _ = fs::remove_file(addr_file_path());
}

/// Records the address the daemon listens on.
fn write_addr(path: &Path, addr: SocketAddr) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    fs::write(path, addr.to_string()).context("Failed to write address file")?;
    Ok(())
}

/// Reads the address recorded by a running daemon.
fn read_addr(path: &Path) -> Option<SocketAddr> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{}", pid)).exists()
}

/// Checks if the daemon is already running.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the daemon process.
fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let Ok(pid) = i32::try_from(pid) else {
            bail!("Invalid PID {}", pid);
        };
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {}", pid);
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command.unwrap_or(Command::Start { daemon: false }) {
        Command::Start { daemon } => {
            // Check if already running
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {})", pid);
                eprintln!("Use 'pomod stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before forking so config errors reach the terminal
            let config = args.listen.resolve()?;

            if daemon {
                // Daemonize before starting tokio runtime
                daemonize()?;
            }

            write_pid()?;
            write_addr(&addr_file_path(), config.socket_addr())?;

            let result = run_daemon(config);

            // Clean up PID file on exit
            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {})...", pid);
                stop_daemon(pid)?;

                // Wait for process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {})", pid);
                if let Some(addr) = read_addr(&addr_file_path()) {
                    println!("Listening: ws://{}", addr);
                }
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    // Ensure log directory exists
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pomod=info".parse()?)
                .add_directive("pomo_core=info".parse()?)
                .add_directive("pomo_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "pomod starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = spawn_registry(config.presets);
    info!(presets = ?config.presets, "Session registry started");

    let server = DaemonServer::new(config.socket_addr(), registry, cancel_token)
        .with_outbound_buffer(config.outbound_buffer);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("pomod stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_start() {
        let args = Args::try_parse_from(["pomod"]).unwrap();
        assert!(args.command.is_none());

        let args = Args::try_parse_from(["pomod", "start", "-d"]).unwrap();
        assert!(matches!(args.command, Some(Command::Start { daemon: true })));
    }

    #[test]
    fn test_listen_settings_layering() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1\"\nport = 9100").unwrap();
        let config_path = file.path().to_str().unwrap();

        // Config file over defaults
        let args = Args::try_parse_from(["pomod", "--config", config_path]).unwrap();
        let config = args.listen.resolve().unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9100");

        // Environment over config file, also without a subcommand
        std::env::set_var("POMOD_PORT", "19123");
        let args = Args::try_parse_from(["pomod", "--config", config_path]).unwrap();
        let from_env = args.listen.resolve();

        // Flags over environment, accepted after the subcommand
        let args =
            Args::try_parse_from(["pomod", "start", "--port", "9200", "--config", config_path])
                .unwrap();
        let from_flag = args.listen.resolve();
        std::env::remove_var("POMOD_PORT");

        let from_env = from_env.unwrap();
        assert_eq!(from_env.port, 19123);
        assert_eq!(from_env.bind.to_string(), "127.0.0.1");
        assert_eq!(from_flag.unwrap().port, 9200);
    }

    #[test]
    fn test_addr_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("pomod.addr");
        assert_eq!(read_addr(&path), None);

        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        write_addr(&path, addr).unwrap();
        assert_eq!(read_addr(&path), Some(addr));
    }
}
