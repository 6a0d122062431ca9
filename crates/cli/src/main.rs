//! Ragline CLI: the main entry point.
//!
//! Commands:
//! - `init`: print a default config
//! - `models`: list configured models
//! - `query`: answer one query from the terminal
//! - `serve`: start the HTTP gateway
//! - `doctor`: check config, documents, and backend credentials

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "ragline",
    about = "Ragline: grounded answers from a document archive",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file
    #[arg(short, long, global = true, env = "RAGLINE_CONFIG", default_value = ragline_config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a default configuration file
    Init,

    /// List configured models
    Models,

    /// Answer a single query
    Query(commands::query::QueryArgs),

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration, documents, and credentials
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Models => commands::models::run(&cli.config)?,
        Commands::Query(args) => commands::query::run(&cli.config, args).await?,
        Commands::Serve { port } => commands::serve::run(&cli.config, port).await?,
        Commands::Doctor => commands::doctor::run(&cli.config)?,
    }

    Ok(())
}
