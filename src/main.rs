//! ocivisor CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// ocivisor - host-side container registry store and configuration
#[derive(Parser, Debug)]
#[command(name = "ocivisor")]
#[command(about = "Container registry store and host configuration for the ocivisor toolkit")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect or adjust host-side defaults.
    #[command(subcommand)]
    Config(cli::config::ConfigCmd),

    /// Manage the container name registry (test facility).
    #[command(subcommand)]
    Registry(cli::registry::RegistryCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging();

    tracing::debug!(version = ocivisor::VERSION, "starting ocivisor");

    let result = match cli.command {
        Commands::Config(cmd) => cmd.run(),
        Commands::Registry(cmd) => cmd.run(),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ocivisor=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
