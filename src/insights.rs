//! Insights collector
//!
//! Refreshes performance counters on every posted ledger row that carries an
//! external id, walking the ledger a page at a time. Each row is its own unit
//! of work: a failed fetch is logged and the row is left for the next refresh.

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::channels::ChannelRegistry;
use crate::ledger::DeliveryLedger;
use crate::metrics;
use crate::models::DeliveryRecord;

/// Outcome of one refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Rows whose counters were overwritten
    pub updated: usize,
    /// Rows without a registered, configured adapter
    pub skipped: usize,
    /// Rows whose fetch or write failed
    pub errors: usize,
}

impl RefreshReport {
    pub fn examined(&self) -> usize {
        self.updated + self.skipped + self.errors
    }
}

#[derive(Clone)]
pub struct InsightsCollector {
    registry: ChannelRegistry,
    ledger: DeliveryLedger,
    page_size: usize,
}

impl InsightsCollector {
    pub fn new(registry: ChannelRegistry, ledger: DeliveryLedger, page_size: usize) -> Self {
        Self {
            registry,
            ledger,
            page_size: page_size.max(1),
        }
    }

    /// Fetch and overwrite counters for every refreshable row
    ///
    /// Only a failure to list the rows is returned as an error.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        let mut offset = 0;

        loop {
            let page = self.ledger.refreshable_page(offset, self.page_size)?;
            let len = page.len();
            for row in page {
                self.refresh_row(&row, &mut report).await;
            }
            if len < self.page_size {
                break;
            }
            offset += len;
        }

        tracing::info!(
            updated = report.updated,
            skipped = report.skipped,
            errors = report.errors,
            "Insights refresh complete"
        );
        Ok(report)
    }

    async fn refresh_row(&self, row: &DeliveryRecord, report: &mut RefreshReport) {
        let Some(external_id) = row.external_id.as_deref() else {
            return;
        };

        let adapter = match self.registry.get(&row.platform) {
            Some(adapter) if adapter.is_configured() => adapter,
            _ => {
                report.skipped += 1;
                metrics::record_insights(&row.platform, "skipped");
                return;
            }
        };

        match adapter.fetch_metrics(external_id).await {
            Ok(counters) => match self.ledger.overwrite_metrics(&row.id, &counters, Utc::now()) {
                Ok(_) => {
                    report.updated += 1;
                    metrics::record_insights(&row.platform, "updated");
                }
                Err(e) => {
                    report.errors += 1;
                    metrics::record_insights(&row.platform, "error");
                    tracing::warn!(record_id = %row.id, error = %e, "Failed to store insights");
                }
            },
            Err(e) => {
                report.errors += 1;
                metrics::record_insights(&row.platform, "error");
                tracing::warn!(
                    platform = %row.platform,
                    external_id = %external_id,
                    error = %e,
                    "Failed to fetch insights"
                );
            }
        }
    }
}
