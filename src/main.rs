//! docio - background document loading and saving for text editors
//!
//! This is the main entry point. It parses CLI arguments, sets up logging
//! and configuration, and hands the files to the batch runner.

mod cli;
mod run;

use docio::config::Config;
use docio::user_config;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let cli = cli::Cli::parse()?;

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    // Load configuration
    let mut config = Config::default();
    user_config::configure(&mut config);

    // Apply CLI overrides
    cli.apply_to_config(&mut config)?;

    run::run_batch(&cli, &config)
}
