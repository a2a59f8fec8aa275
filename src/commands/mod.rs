pub mod import;
pub mod report;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};

use promocast::config::Config;
use promocast::engine::DistributionEngine;
use promocast::storage::Repositories;

// Re-export command functions for convenience
pub use import::import;
pub use report::{analytics, history, stats, AnalyticsView};
pub use run::{run, tick};

/// Load config, open the SQLite store and build the engine
pub fn open_engine(config_path: Option<&Path>) -> Result<DistributionEngine> {
    let config = Config::load(config_path)?;
    open_engine_with(config)
}

pub fn open_engine_with(config: Config) -> Result<DistributionEngine> {
    let repos = Repositories::sqlite(&config.database.sqlite_path).with_context(|| {
        format!("Failed to open database: {}", config.database.sqlite_path.display())
    })?;
    Ok(DistributionEngine::new(config, repos)?)
}
