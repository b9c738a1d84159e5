mod cmd;
mod logging;
mod output;
mod root;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cmd::{broadcasts::BroadcastsSubcommand, config::ConfigSubcommand};
use rct_core::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rct",
    about = "Unattended daily live-broadcast orchestrator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .env, config/launchd/ or .git/)
    #[arg(long, global = true, env = "RCT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure the container runtime and capture application are running
    Prepare,

    /// Provision today's broadcast and start transmission at the configured time
    Start,

    /// Stop transmission, clean up today's broadcast and schedule tomorrow's
    Stop,

    /// Verify scheduled triggers, runtime liveness and yesterday's logs
    Health,

    /// Show the local control plane status
    Status,

    /// Write trigger descriptors derived from the configured start/stop times
    Schedule {
        /// Also register the descriptors with launchd
        #[arg(long)]
        install: bool,
    },

    /// Inspect and repair upcoming remote broadcasts
    Broadcasts {
        #[command(subcommand)]
        subcommand: BroadcastsSubcommand,
    },

    /// Validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

impl Commands {
    /// Runs started by launchd get a log file for next-day forensics.
    fn is_scheduled_run(&self) -> bool {
        matches!(
            self,
            Commands::Prepare | Commands::Start | Commands::Stop | Commands::Health
        )
    }
}

fn main() {
    let cli = Cli::parse();
    let root = root::resolve_root(cli.root.as_deref());
    let loaded = Config::load(&root);

    let log_dir = match &loaded {
        Ok(config) if cli.command.is_scheduled_run() => Some(config.log_dir()),
        _ => None,
    };
    let default_level = if cli.command.is_scheduled_run() {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    let tz = match &loaded {
        Ok(config) => config.schedule.timezone,
        Err(_) => chrono_tz::UTC,
    };
    let guard = logging::init(log_dir.as_deref(), tz, default_level);

    let result = loaded
        .context("failed to load configuration")
        .and_then(|config| {
            let json = cli.json;
            match cli.command {
                Commands::Prepare => cmd::prepare::run(&config),
                Commands::Start => cmd::stream::start(&config, json),
                Commands::Stop => cmd::stream::stop(&config, json),
                Commands::Health => cmd::health::run(&config, json),
                Commands::Status => cmd::status::run(&config, json),
                Commands::Schedule { install } => cmd::schedule::run(&config, install, json),
                Commands::Broadcasts { subcommand } => {
                    cmd::broadcasts::run(&config, subcommand, json)
                }
                Commands::Config { subcommand } => cmd::config::run(&config, subcommand, json),
            }
        });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        // process::exit skips destructors; flush the file writer first.
        drop(guard);
        std::process::exit(1);
    }
}
