use std::path::Path;

use anyhow::Result;

use promocast::storage::import_seed_file;

use super::open_engine;

/// Load content items and images from a TOML seed file
pub async fn import(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let engine = open_engine(config_path)?;
    let report = import_seed_file(engine.repositories().pool.as_ref(), file)?;

    println!("Imported from {}", file.display());
    println!("  Content items: {}", report.content);
    println!("  Images: {}", report.images);
    Ok(())
}
