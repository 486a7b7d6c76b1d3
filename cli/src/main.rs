//! devdash CLI - Live dashboard for dev processes and containers
//!
//! Shows dev processes, docker containers, all processes and system load,
//! with kill/stop actions and watched-port alerts.

mod commands;
mod tui;

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use devdash_core::{Config, ConfigStore};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "DEVDASH_LOG";

#[derive(Parser)]
#[command(name = "devdash")]
#[command(author, version, about = "Live dashboard for dev processes, containers and system load")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seconds between polls (overrides the config file)
    #[arg(long, global = true)]
    refresh_rate: Option<f64>,

    /// Port to watch; may be repeated (added to the config file's list)
    #[arg(long = "watch", value_name = "PORT", global = true)]
    watch: Vec<u16>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Disable interactive TUI mode
    #[arg(long, global = true)]
    no_tui: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List dev processes and containers once
    #[command(alias = "ls")]
    List,

    /// Write a JSON snapshot of every table
    Export,

    /// Kill a process (SIGTERM, then SIGKILL after a grace period)
    Kill {
        /// Process id
        pid: u32,

        /// Force kill (SIGKILL) without graceful shutdown
        #[arg(short, long)]
        force: bool,
    },

    /// Stop a docker container
    Stop {
        /// Container id or name
        container: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let interactive = cli.command.is_none() && !cli.no_tui && atty::is(atty::Stream::Stdout);
    init_logging(interactive);

    let config = load_config(&cli).await?;

    match cli.command {
        Some(Commands::List) => commands::list::run(&config, cli.json).await?,
        Some(Commands::Export) => commands::export::run(&config).await?,
        Some(Commands::Kill { pid, force }) => commands::kill::run(pid, force).await?,
        Some(Commands::Stop { container }) => commands::stop::run(&container).await?,
        None => {
            if interactive {
                tui::run(config).await?;
            } else {
                commands::list::run(&config, cli.json).await?;
            }
        }
    }

    Ok(())
}

/// Load the config file, falling back to defaults on any error, then apply
/// command-line overrides.
async fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let store = match &cli.config {
        Some(path) => Ok(ConfigStore::with_path(path.clone())),
        None => ConfigStore::new(),
    };

    let config = match store {
        Ok(store) => match store.load().await {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %store.path().display(), error = %e, "Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            warn!(error = %e, "Using default configuration");
            Config::default()
        }
    };

    apply_overrides(config, cli)
}

/// Apply `--refresh-rate` and `--watch`, then validate the result.
fn apply_overrides(mut config: Config, cli: &Cli) -> anyhow::Result<Config> {
    if let Some(rate) = cli.refresh_rate {
        config.refresh_rate = rate;
    }
    for port in &cli.watch {
        if !config.watched_ports.contains(port) {
            config.watched_ports.push(*port);
        }
    }
    config
        .validate()
        .context("Invalid command-line override")?;
    Ok(config)
}

/// Install the tracing subscriber. While the TUI owns the terminal, logs go
/// to `<data_local_dir>/devdash/devdash.log`; otherwise to stderr.
fn init_logging(to_file: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    if to_file {
        match open_log_file() {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
            }
            Err(_) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(io::sink)
                    .try_init();
            }
        }
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    }
}

fn open_log_file() -> anyhow::Result<std::fs::File> {
    let dir = devdash_core::application::default_export_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("devdash.log");
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_are_applied() {
        let cli = Cli::parse_from(["devdash", "--refresh-rate", "1.5", "--watch", "3000", "list"]);
        let config = apply_overrides(Config::default(), &cli).unwrap();
        assert_eq!(config.refresh_rate, 1.5);
        assert_eq!(config.watched_ports, vec![3000]);
    }

    #[test]
    fn test_out_of_range_refresh_rate_is_rejected() {
        for rate in ["inf", "1e300", "0"] {
            let cli = Cli::parse_from(["devdash", "--refresh-rate", rate]);
            assert!(apply_overrides(Config::default(), &cli).is_err(), "{}", rate);
        }
    }
}
