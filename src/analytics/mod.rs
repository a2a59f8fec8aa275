//! Read-only analytics over the delivery ledger
//!
//! Rollups never feed back into selection.

pub mod rollups;

pub use rollups::{
    CombinationPerformance, ContentPerformance, HourlyEngagement, ImagePerformance, Performance,
};

use anyhow::Result;
use chrono::FixedOffset;

use crate::ledger::{DeliveryLedger, StatusTotals};

/// Default number of entries in a top-N query
pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Aggregates ledger rows for reporting
#[derive(Clone)]
pub struct AnalyticsAggregator {
    ledger: DeliveryLedger,
    offset: FixedOffset,
}

impl AnalyticsAggregator {
    /// `offset` is the reference timezone used for posting hours
    pub fn new(ledger: DeliveryLedger, offset: FixedOffset) -> Self {
        Self { ledger, offset }
    }

    pub fn status_totals(&self) -> Result<StatusTotals> {
        self.ledger.totals()
    }

    pub fn top_content(&self, limit: usize) -> Result<Vec<ContentPerformance>> {
        Ok(rollups::top_content(&self.ledger.all()?, limit))
    }

    pub fn top_images(&self, limit: usize) -> Result<Vec<ImagePerformance>> {
        Ok(rollups::top_images(&self.ledger.all()?, limit))
    }

    pub fn top_combinations(&self, limit: usize) -> Result<Vec<CombinationPerformance>> {
        Ok(rollups::top_combinations(&self.ledger.all()?, limit))
    }

    pub fn hourly_engagement(&self) -> Result<Vec<HourlyEngagement>> {
        Ok(rollups::hourly_engagement(&self.ledger.all()?, self.offset))
    }
}
