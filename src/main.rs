//! memesrc indexer CLI
//!
//! # Usage
//!
//! ```bash
//! indexer index --input /media/series --title "Some Show"
//! indexer status --id 2f6c0d1e-7b0f-4a52-9d1b-3c55c1b8a0e4
//! indexer captions --id 2f6c0d1e-7b0f-4a52-9d1b-3c55c1b8a0e4 --season 1 --episode 2
//! indexer rebuild --id 2f6c0d1e-7b0f-4a52-9d1b-3c55c1b8a0e4
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use memesrc_indexer::cli::{commands, Cli, Commands};
use memesrc_indexer::config_initialization::initialize_configuration_hierarchy;
use memesrc_indexer::utils::logging::init_logging;
use memesrc_indexer::{AppContainer, DefaultAppContainer};

/// Main entry point for the indexer CLI
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = initialize_configuration_hierarchy(&cli.config_overrides())?;
    init_logging(&config.logging);
    info!(processing_dir = %config.processing_dir.display(), "Starting memesrc indexer");

    let container = DefaultAppContainer::new(&config);
    let service = container.index_service();

    let result = match cli.command {
        Commands::Index(args) => commands::index(&service, args).await,
        Commands::Status(args) => commands::status(&service, args).await,
        Commands::Captions(args) => commands::captions(&service, args).await,
        Commands::Rebuild(args) => commands::rebuild(&service, args).await,
        Commands::Jobs(args) => commands::jobs(&service, args).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
