//! Platform dispatcher
//!
//! Fans one composed message out to every registered adapter, in
//! registration order. Per adapter:
//!
//! 1. skip (no row) when the adapter is not configured
//! 2. skip when the hour is outside its posting window, unless forced
//! 3. truncate to the adapter's character limit
//! 4. skip when the adapter needs an image and none was resolved
//! 5. publish and write exactly one ledger row
//!
//! Usage of the selected content item and image is recorded once, after the
//! first attempt, whatever its outcome.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::channels::ChannelRegistry;
use crate::ledger::DeliveryLedger;
use crate::metrics;
use crate::models::{DeliveryRecord, DeliveryStatus, NewDeliveryRecord};
use crate::storage::SharedPoolRepository;

const ELLIPSIS: &str = "...";

/// Cut `text` to at most `max_chars` characters
///
/// Longer text keeps `max_chars - 3` characters followed by `...`.
pub fn truncate(text: &str, max_chars: usize) -> Cow<'_, str> {
    if text.chars().count() <= max_chars {
        return Cow::Borrowed(text);
    }

    if max_chars < ELLIPSIS.len() {
        return Cow::Owned(text.chars().take(max_chars).collect());
    }

    let mut cut: String = text.chars().take(max_chars - ELLIPSIS.len()).collect();
    cut.push_str(ELLIPSIS);
    Cow::Owned(cut)
}

/// Why an adapter produced no ledger row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotConfigured,
    OutsideHours,
    NoImage,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::OutsideHours => "outside_hours",
            Self::NoImage => "no_image",
        }
    }
}

/// One cycle's message and its context
#[derive(Debug, Clone)]
pub struct Dispatch<'a> {
    pub text: &'a str,
    pub image_url: Option<&'a str>,
    /// Image filename recorded on each row
    pub image_ref: Option<&'a str>,
    pub content_id: Option<&'a str>,
    pub image_id: Option<&'a str>,
    pub schedule: Option<&'a str>,
    /// Hour of the reference day
    pub hour: u8,
    /// Ignore per-adapter posting windows
    pub force_channels: bool,
    pub at: DateTime<Utc>,
}

impl<'a> Dispatch<'a> {
    pub fn new(text: &'a str, hour: u8, at: DateTime<Utc>) -> Self {
        Self {
            text,
            image_url: None,
            image_ref: None,
            content_id: None,
            image_id: None,
            schedule: None,
            hour,
            force_channels: false,
            at,
        }
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub records: Vec<DeliveryRecord>,
    pub skipped: Vec<(String, SkipReason)>,
    /// Publish calls made, including ones whose row could not be stored
    pub attempts: usize,
    pub usage_recorded: bool,
}

impl DispatchReport {
    pub fn posted(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Posted)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Failed)
            .count()
    }
}

#[derive(Clone)]
pub struct PlatformDispatcher {
    registry: ChannelRegistry,
    ledger: DeliveryLedger,
    pool: SharedPoolRepository,
}

impl PlatformDispatcher {
    pub fn new(registry: ChannelRegistry, ledger: DeliveryLedger, pool: SharedPoolRepository) -> Self {
        Self {
            registry,
            ledger,
            pool,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Publish to every eligible adapter
    ///
    /// Adapter failures become failed rows and never stop the loop.
    pub async fn dispatch(&self, job: &Dispatch<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for adapter in self.registry.iter() {
            let platform = adapter.platform().to_string();
            let caps = adapter.capabilities();

            if !adapter.is_configured() {
                self.skip(&mut report, platform, SkipReason::NotConfigured);
                continue;
            }

            if !job.force_channels && !caps.allows_hour(job.hour) {
                self.skip(&mut report, platform, SkipReason::OutsideHours);
                continue;
            }

            let text = truncate(job.text, caps.max_chars);

            if caps.requires_image && job.image_url.is_none() {
                self.skip(&mut report, platform, SkipReason::NoImage);
                continue;
            }

            let record = match adapter.publish(&text, job.image_url).await {
                Ok(outcome) if outcome.success => {
                    tracing::info!(
                        platform = %platform,
                        external_id = ?outcome.external_id,
                        "Posted"
                    );
                    NewDeliveryRecord::posted(&platform, &*text, outcome.external_id)
                }
                Ok(outcome) => {
                    let error = outcome.error.unwrap_or_else(|| "unknown error".to_string());
                    tracing::warn!(platform = %platform, error = %error, "Post failed");
                    NewDeliveryRecord::failed(&platform, &*text, error)
                }
                Err(e) => {
                    tracing::warn!(platform = %platform, error = %e, "Adapter error");
                    NewDeliveryRecord::failed(&platform, &*text, e.to_string())
                }
            };

            let record = record
                .with_content_item(job.content_id.map(String::from))
                .with_image_ref(job.image_ref.map(String::from))
                .with_schedule(job.schedule.map(String::from));

            match self.ledger.record(record, job.at) {
                Ok(row) => report.records.push(row),
                Err(e) => tracing::error!(platform = %platform, error = %e, "Failed to write ledger row"),
            }

            report.attempts += 1;
            if report.attempts == 1 {
                report.usage_recorded = self.record_usage(job);
            }
        }

        report
    }

    fn skip(&self, report: &mut DispatchReport, platform: String, reason: SkipReason) {
        tracing::debug!(platform = %platform, reason = reason.as_str(), "Channel skipped");
        metrics::record_skip(&platform, reason.as_str());
        report.skipped.push((platform, reason));
    }

    fn record_usage(&self, job: &Dispatch<'_>) -> bool {
        let mut ok = true;

        if let Some(id) = job.content_id {
            if let Err(e) = self.pool.record_content_usage(id, job.at) {
                tracing::warn!(content_id = %id, error = %e, "Failed to record content usage");
                ok = false;
            }
        }

        if let Some(id) = job.image_id {
            if let Err(e) = self.pool.record_image_usage(id, job.at) {
                tracing::warn!(image_id = %id, error = %e, "Failed to record image usage");
                ok = false;
            }
        }

        ok
    }
}
