use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

use cli::{CacheCommand, Cli, Commands};
use output::OutputFormat;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so JSON output on stdout stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crs_sync=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(&args, format).await,
        Commands::Cache(CacheCommand::Show(args)) => commands::cache::show(&args, format),
        Commands::Cache(CacheCommand::Clear(args)) => commands::cache::clear(&args),
    }
}
