//! Spindle CLI: the main entry point.
//!
//! Commands:
//! - `config init`: Write a default configuration file
//! - `config check`: Load and validate a configuration file
//! - `config show`: Print the effective configuration
//! - `config path`: Print the default configuration path
//! - `demo`: Drive one turn against an offline scripted model

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "spindle",
    about = "Spindle: an LLM agent turn loop with tools, retries and streaming",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run one turn against an offline model that knows a calculator tool
    Demo {
        /// What to ask, e.g. "12 * 7"
        #[arg(default_value = "12 * 7")]
        message: String,

        /// Print text as it streams in
        #[arg(short, long)]
        stream: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file
    Init {
        /// Target file (defaults to ~/.spindle/config.toml)
        #[arg(long)]
        path: Option<std::path::PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Load and validate a config file
    Check {
        /// File to check (defaults to $SPINDLE_CONFIG or ~/.spindle/config.toml)
        path: Option<std::path::PathBuf>,
    },

    /// Print the effective configuration as TOML
    Show,

    /// Print the default config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => commands::config_cmd::init(path, force)?,
            ConfigAction::Check { path } => commands::config_cmd::check(path)?,
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
        Commands::Demo {
            message,
            stream,
            json,
        } => commands::demo::run(message, stream, json).await?,
    }

    Ok(())
}
