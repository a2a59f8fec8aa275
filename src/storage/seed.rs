//! TOML seed import for the content and image pools
//!
//! ```toml
//! [[content]]
//! body = "Find the right brake pads in seconds."
//! hashtags = ["GarageBot", "Brakes"]
//! category = "cars"
//!
//! [[images]]
//! filename = "brake_parts.png"
//! category = "brakes"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::PoolRepository;
use crate::models::{NewContentItem, NewImageAsset};

/// Seed file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub content: Vec<NewContentItem>,
    #[serde(default)]
    pub images: Vec<NewImageAsset>,
}

impl SeedFile {
    /// Parse a seed file from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        let seed: SeedFile = toml::from_str(text).context("Failed to parse seed file")?;
        seed.validate()?;
        Ok(seed)
    }

    fn validate(&self) -> Result<()> {
        if let Some(pos) = self.content.iter().position(|c| c.body.trim().is_empty()) {
            bail!("content entry {} has an empty body", pos + 1);
        }
        if let Some(pos) = self.images.iter().position(|i| i.filename.trim().is_empty()) {
            bail!("image entry {} has an empty filename", pos + 1);
        }
        Ok(())
    }
}

/// Counts of imported rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub content: usize,
    pub images: usize,
}

/// Insert every entry of a seed file into the pools, in file order
pub fn import_seed(pool: &dyn PoolRepository, seed: &SeedFile) -> Result<ImportReport> {
    for item in &seed.content {
        pool.insert_content(item)?;
    }
    for image in &seed.images {
        pool.insert_image(image)?;
    }

    Ok(ImportReport {
        content: seed.content.len(),
        images: seed.images.len(),
    })
}

/// Read, validate and import a seed file
pub fn import_seed_file(pool: &dyn PoolRepository, path: &Path) -> Result<ImportReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let seed = SeedFile::parse(&text)?;
    let report = import_seed(pool, &seed)?;

    tracing::info!(
        path = %path.display(),
        content = report.content,
        images = report.images,
        "Seed file imported"
    );
    Ok(report)
}
