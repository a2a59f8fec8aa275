//! Pure rollups over ledger rows
//!
//! Engagement only counts posted rows. Groups are kept in first-appearance
//! order and sorted stably, so ties stay in ledger order.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{FixedOffset, Timelike};
use serde::Serialize;

use crate::ledger::StatusTotals;
use crate::models::{DeliveryRecord, DeliveryStatus};

/// Summed performance of one group of rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Performance {
    pub posts: usize,
    pub impressions: u64,
    pub reach: u64,
    pub clicks: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
    /// likes + comments + shares
    pub engagement: u64,
}

impl Performance {
    fn add(&mut self, row: &DeliveryRecord) {
        let m = &row.metrics;
        self.posts += 1;
        self.impressions += m.impressions;
        self.reach += m.reach;
        self.clicks += m.clicks;
        self.likes += m.likes;
        self.comments += m.comments;
        self.shares += m.shares;
        self.engagement += m.engagement_score();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentPerformance {
    pub content_item_id: String,
    /// Text of the first posted row, as sent
    pub sample: String,
    #[serde(flatten)]
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePerformance {
    pub image_ref: String,
    #[serde(flatten)]
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CombinationPerformance {
    pub content_item_id: String,
    pub image_ref: String,
    #[serde(flatten)]
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyEngagement {
    /// Hour of the reference day
    pub hour: u8,
    pub posts: usize,
    pub total_engagement: u64,
    pub average_engagement: f64,
}

/// Group posted rows by key, preserving first appearance
fn group_posted<'a, K, F>(rows: &'a [DeliveryRecord], key: F) -> Vec<(K, &'a DeliveryRecord, Performance)>
where
    K: Eq + Hash + Clone,
    F: Fn(&'a DeliveryRecord) -> Option<K>,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, &'a DeliveryRecord, Performance)> = Vec::new();

    for row in rows.iter().filter(|r| r.status == DeliveryStatus::Posted) {
        let Some(k) = key(row) else {
            continue;
        };
        let slot = *index.entry(k.clone()).or_insert_with(|| {
            groups.push((k, row, Performance::default()));
            groups.len() - 1
        });
        groups[slot].2.add(row);
    }

    groups
}

/// Stable descending sort by engagement, then cut to `limit`
fn rank<T>(mut items: Vec<T>, limit: usize, engagement: impl Fn(&T) -> u64) -> Vec<T> {
    items.sort_by(|a, b| engagement(b).cmp(&engagement(a)));
    items.truncate(limit);
    items
}

pub fn status_totals(rows: &[DeliveryRecord]) -> StatusTotals {
    let posted = rows
        .iter()
        .filter(|r| r.status == DeliveryStatus::Posted)
        .count();
    StatusTotals::new(posted, rows.len() - posted)
}

pub fn top_content(rows: &[DeliveryRecord], limit: usize) -> Vec<ContentPerformance> {
    let groups: Vec<ContentPerformance> = group_posted(rows, |r| r.content_item_id.clone())
        .into_iter()
        .map(|(id, first, performance)| ContentPerformance {
            content_item_id: id,
            sample: first.content.clone(),
            performance,
        })
        .collect();
    rank(groups, limit, |c| c.performance.engagement)
}

pub fn top_images(rows: &[DeliveryRecord], limit: usize) -> Vec<ImagePerformance> {
    let groups: Vec<ImagePerformance> = group_posted(rows, |r| r.image_ref.clone())
        .into_iter()
        .map(|(image_ref, _, performance)| ImagePerformance {
            image_ref,
            performance,
        })
        .collect();
    rank(groups, limit, |i| i.performance.engagement)
}

pub fn top_combinations(rows: &[DeliveryRecord], limit: usize) -> Vec<CombinationPerformance> {
    let groups: Vec<CombinationPerformance> = group_posted(rows, |r| {
        Some((r.content_item_id.clone()?, r.image_ref.clone()?))
    })
    .into_iter()
    .map(|((content_item_id, image_ref), _, performance)| CombinationPerformance {
        content_item_id,
        image_ref,
        performance,
    })
    .collect();
    rank(groups, limit, |c| c.performance.engagement)
}

/// Average engagement per posting hour, ascending by hour
pub fn hourly_engagement(rows: &[DeliveryRecord], offset: FixedOffset) -> Vec<HourlyEngagement> {
    let mut buckets = [(0usize, 0u64); 24];

    for row in rows.iter().filter(|r| r.status == DeliveryStatus::Posted) {
        let posted = row.posted_at.unwrap_or(row.created_at);
        let hour = posted.with_timezone(&offset).hour() as usize;
        buckets[hour].0 += 1;
        buckets[hour].1 += row.engagement_score();
    }

    buckets
        .iter()
        .enumerate()
        .filter(|(_, (posts, _))| *posts > 0)
        .map(|(hour, (posts, total))| HourlyEngagement {
            hour: hour as u8,
            posts: *posts,
            total_engagement: *total,
            average_engagement: *total as f64 / *posts as f64,
        })
        .collect()
}
