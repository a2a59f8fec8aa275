//! promocast - Scheduled multi-platform content distribution
//!
//! Decides when to post (hour-gated named schedules), what to post (fair
//! least-used rotation over content and image pools) and where (every
//! configured channel adapter), then records each attempt in a delivery
//! ledger and later refreshes engagement counters for analytics.
//!
//! # Architecture
//!
//! - [`scheduler`] - Hour-gated trigger state
//! - [`selection`] - Content and image rotation
//! - [`composer`] - Message rendering and site URLs
//! - [`dispatch`] - Fan-out to channel adapters
//! - [`channels`] - Facebook, Instagram, X and webhook adapters
//! - [`ledger`] - Append-only delivery log
//! - [`insights`] - Engagement counter refresh
//! - [`analytics`] - Read-only rollups
//! - [`engine`] - Wiring and background loops
//! - [`storage`] - SQLite and in-memory repositories
//! - [`api`] - Read-only HTTP API
//!
//! # Example
//!
//! ```no_run
//! use promocast::config::Config;
//! use promocast::engine::DistributionEngine;
//! use promocast::storage::Repositories;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let repos = Repositories::sqlite(&config.database.sqlite_path)?;
//!     let engine = DistributionEngine::new(config, repos)?;
//!     engine.start();
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod api;
pub mod channels;
pub mod composer;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod insights;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod selection;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::channels::{ChannelAdapter, ChannelCapabilities, ChannelRegistry, PublishOutcome};
    pub use crate::config::{Config, ScheduleConfig};
    pub use crate::engine::{CycleReport, DistributionEngine, EngineStats};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{
        ContentItem, DeliveryRecord, DeliveryStatus, EngagementMetrics, ImageAsset, PlatformScope, Season,
    };
    pub use crate::storage::Repositories;
}

// Direct re-exports for convenience
pub use engine::DistributionEngine;
pub use models::{ContentItem, DeliveryRecord, ImageAsset};
