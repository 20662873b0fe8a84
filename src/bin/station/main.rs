//! Sign Station CLI
//!
//! Operator tools: inspect requests and feeds, run the payout worker.

mod client;
mod commands;
mod style;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use style::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "station")]
#[command(version)]
#[command(about = "Sign Station operator CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Sign Station server URL
    #[arg(
        short,
        long,
        env = "STATION_URL",
        default_value = "http://127.0.0.1:3000",
        global = true
    )]
    url: String,

    /// Configuration file
    #[arg(
        short,
        long,
        env = "STATION_CONFIG",
        default_value = "config.toml",
        global = true
    )]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a sign request
    #[command(visible_alias = "st")]
    Status {
        request_key: String,

        /// Poll through the gallery route
        #[arg(long)]
        gallery: bool,
    },

    /// Latest gallery items
    Feed {
        /// Show the featured feed
        #[arg(short, long)]
        featured: bool,
    },

    /// Gallery submissions and reward state of an address
    Gallery { address: String },

    /// Run the payout dispatcher only
    #[command(visible_alias = "worker")]
    Scheduler,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let run_worker = matches!(cli.command, Commands::Scheduler);
    if cli.verbose || run_worker {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }

    let result = match cli.command {
        Commands::Status {
            request_key,
            gallery,
        } => commands::status::run(&cli.url, &request_key, gallery).await,
        Commands::Feed { featured } => commands::feed::run(&cli.url, featured).await,
        Commands::Gallery { address } => commands::gallery::run(&cli.url, &address).await,
        Commands::Scheduler => commands::scheduler::run(&cli.config).await,
        Commands::Config => commands::config::run(&cli.config),
    };

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
