//! Delivery ledger
//!
//! Append-only log of dispatch attempts. The only mutation after append is the
//! overwrite of performance counters by the insights collector; rows are
//! never deleted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::metrics;
use crate::models::{DeliveryRecord, DeliveryStatus, EngagementMetrics, NewDeliveryRecord};
use crate::storage::SharedLedgerRepository;

/// Default page size for history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Row counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTotals {
    pub posted: usize,
    pub failed: usize,
    pub total: usize,
}

impl StatusTotals {
    pub fn new(posted: usize, failed: usize) -> Self {
        Self {
            posted,
            failed,
            total: posted + failed,
        }
    }
}

#[derive(Clone)]
pub struct DeliveryLedger {
    repo: SharedLedgerRepository,
}

impl DeliveryLedger {
    pub fn new(repo: SharedLedgerRepository) -> Self {
        Self { repo }
    }

    /// Append one attempt
    pub fn record(&self, record: NewDeliveryRecord, at: DateTime<Utc>) -> Result<DeliveryRecord> {
        let row = self.repo.append(&record, at)?;
        metrics::record_delivery(&row.platform, row.status.as_str());
        Ok(row)
    }

    /// Newest rows first
    pub fn history(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        self.repo.history(limit)
    }

    /// Every row, oldest first
    pub fn all(&self) -> Result<Vec<DeliveryRecord>> {
        self.repo.all_records()
    }

    /// One page of the rows the insights collector can refresh, oldest first
    ///
    /// Rows are only ever appended, so a page offset stays valid while new
    /// rows arrive.
    pub fn refreshable_page(&self, offset: usize, limit: usize) -> Result<Vec<DeliveryRecord>> {
        self.repo.posted_with_external_id(offset, limit)
    }

    /// Overwrite a row's counters with absolute values
    pub fn overwrite_metrics(&self, id: &str, metrics: &EngagementMetrics, at: DateTime<Utc>) -> Result<bool> {
        self.repo.update_metrics(id, metrics, at)
    }

    pub fn totals(&self) -> Result<StatusTotals> {
        Ok(StatusTotals::new(
            self.repo.count_by_status(DeliveryStatus::Posted)?,
            self.repo.count_by_status(DeliveryStatus::Failed)?,
        ))
    }
}
