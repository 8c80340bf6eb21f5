// FeedFlow CLI
// Validate and plan YAML pipeline configurations

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "feedflow",
    version,
    about = "Validate and plan configuration-driven data pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a pipeline file for configuration errors
    Validate(commands::validate::ValidateArgs),
    /// Show the order in which a pipeline's actions would run
    Plan(commands::plan::PlanArgs),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Plan(args) => commands::plan::execute(args),
    }
}
