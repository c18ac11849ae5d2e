//! Souk CLI - Database migrations and catalog maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run catalog database migrations
//! souk-cli migrate
//!
//! # Print the tag histogram
//! souk-cli tags
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "souk-cli")]
#[command(author, version, about = "Souk catalog CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Print the tag histogram
    Tags,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Tags => commands::tags::run().await,
    }
}
