mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{cache::CacheSubcommand, config::ConfigSubcommand, install::InstallArgs};
use frk_core::types::Channel;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "frk",
    about = "Install and update the SQL Server First Responder Kit across instances",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: ~/.frk/config.yaml)
    #[arg(long, global = true, env = "FRK_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the release cache (default: system temp dir)
    #[arg(long, global = true, env = "FRK_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update the kit's procedures on one or more instances
    Install(InstallArgs),

    /// Manage the local release cache
    Cache {
        #[command(subcommand)]
        subcommand: CacheSubcommand,
    },

    /// List cached scripts and their version requirements
    Scripts {
        /// stable or development (default: from config)
        #[arg(long)]
        channel: Option<Channel>,
    },

    /// Create or validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // `config init` writes the file the other commands would load.
    if let Commands::Config {
        subcommand: ConfigSubcommand::Init { force },
    } = cli.command
    {
        if let Err(e) = cmd::config::init(cli.config.as_deref(), force, cli.json) {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
        return;
    }

    let result = settings::Settings::load(cli.config.as_deref(), cli.data_root.as_deref())
        .and_then(|settings| match cli.command {
            Commands::Install(args) => cmd::install::run(&settings, args, cli.json),
            Commands::Cache { subcommand } => cmd::cache::run(&settings, subcommand, cli.json),
            Commands::Scripts { channel } => cmd::scripts::run(&settings, channel, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&settings, subcommand, cli.json),
        });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` when it is set and parses, WARN otherwise.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}
