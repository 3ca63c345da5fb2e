//! Rivulet CLI - inspect and play node descriptions.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rivulet")]
#[command(author, version, about = "Rivulet audio node CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the channels, recyclings and templates of a node description
    Inspect(commands::inspect::InspectArgs),

    /// Build a node and run a playback pass over every output
    Play(commands::play::PlayArgs),

    /// List recalls that node descriptions can name
    Recalls(commands::recalls::RecallsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Recalls(args) => commands::recalls::run(args),
    }
}
