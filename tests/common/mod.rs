//! Common test utilities

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use promocast::channels::{
    ChannelAdapter, ChannelCapabilities, ChannelError, ChannelRegistry, ChannelResult, PublishOutcome,
};
use promocast::config::{Config, ScheduleConfig};
use promocast::engine::DistributionEngine;
use promocast::models::{EngagementMetrics, NewContentItem, NewImageAsset};
use promocast::storage::Repositories;

/// What a fake channel does when asked to publish
#[allow(dead_code)]
#[derive(Clone, Copy)]
pub enum FakeBehavior {
    Post,
    Refuse,
    Break,
}

/// In-process channel recording every publish call
pub struct FakeChannel {
    caps: ChannelCapabilities,
    configured: bool,
    behavior: FakeBehavior,
    delay: Option<Duration>,
    pub sent: Mutex<Vec<(String, Option<String>)>>,
}

#[allow(dead_code)]
impl FakeChannel {
    pub fn new(platform: &str, max_chars: usize) -> Self {
        Self {
            caps: ChannelCapabilities::new(platform, max_chars),
            configured: true,
            behavior: FakeBehavior::Post,
            delay: None,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn requiring_image(mut self) -> Self {
        self.caps = self.caps.with_requires_image(true);
        self
    }

    pub fn with_hours(mut self, hours: Vec<u8>) -> Self {
        self.caps = self.caps.with_allowed_hours(Some(hours));
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn behaving(mut self, behavior: FakeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Take this long before the platform answers
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelAdapter for FakeChannel {
    fn capabilities(&self) -> &ChannelCapabilities {
        &self.caps
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> ChannelResult<PublishOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((text.to_string(), image_url.map(String::from)));
        let n = sent.len();

        match self.behavior {
            FakeBehavior::Post => Ok(PublishOutcome::posted(Some(format!("{}-{n}", self.caps.platform)))),
            FakeBehavior::Refuse => Ok(PublishOutcome::failed("refused by platform")),
            FakeBehavior::Break => Err(ChannelError::Unavailable("connection reset".to_string())),
        }
    }

    async fn fetch_metrics(&self, _external_id: &str) -> ChannelResult<EngagementMetrics> {
        Ok(EngagementMetrics {
            impressions: 50,
            likes: 2,
            comments: 1,
            shares: 1,
            ..Default::default()
        })
    }
}

/// Config with one schedule, UTC reference time
#[allow(dead_code)]
pub fn config_with(schedules: Vec<ScheduleConfig>) -> Config {
    Config {
        schedules,
        ..Config::default()
    }
}

/// 2025-04-02 (spring) at the given UTC hour
#[allow(dead_code)]
pub fn spring_at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 2, hour, minute, 0).unwrap()
}

/// Engine over a fresh in-memory store with the given adapters
#[allow(dead_code)]
pub fn engine_with(config: Config, channels: &[Arc<FakeChannel>]) -> (DistributionEngine, Repositories) {
    let repos = Repositories::memory();
    let registry = channels
        .iter()
        .fold(ChannelRegistry::new(), |registry, channel| registry.with(channel.clone()));
    let engine = DistributionEngine::with_registry(config, repos.clone(), registry).unwrap();
    (engine, repos)
}

/// Seed a content item and return its id
#[allow(dead_code)]
pub fn seed_content(repos: &Repositories, body: &str) -> String {
    repos
        .pool
        .insert_content(&NewContentItem::new(body).with_hashtags(["GarageBot"]))
        .unwrap()
        .id
}

/// Seed an image and return its id
#[allow(dead_code)]
pub fn seed_image(repos: &Repositories, filename: &str) -> String {
    repos.pool.insert_image(&NewImageAsset::new(filename)).unwrap().id
}
