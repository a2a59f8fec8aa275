//! Broadcast channel adapters
//!
//! One adapter per platform. Each adapter declares its limits through a
//! [`ChannelCapabilities`] descriptor and is driven by the dispatcher through
//! the [`ChannelAdapter`] trait:
//!
//! - [`facebook`] - Facebook Page posts through the Graph API
//! - [`instagram`] - Instagram Business two-step container publishing
//! - [`x`] - X (Twitter) v2 posts
//! - [`webhook`] - Generic JSON webhook broadcast (Discord/Slack style)

pub mod facebook;
pub mod instagram;
pub mod webhook;
pub mod x;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::config::{ChannelsConfig, PlatformChannelConfig};
use crate::models::{ChannelIntegration, EngagementMetrics};

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Integration credentials shared by every adapter of one engine
pub type SharedCredentials = Arc<RwLock<ChannelIntegration>>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Credentials for the platform are missing
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// Channel temporarily unavailable
    #[error("Channel temporarily unavailable: {0}")]
    Unavailable(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Platform API answered with an error payload
    #[error("{platform} rejected the request{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Rejected {
        platform: String,
        code: Option<i64>,
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Check if a later attempt could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::Unavailable(_) | Self::RateLimited(_)
        )
    }
}

// ============================================================================
// Capabilities and Outcomes
// ============================================================================

/// Static limits of a broadcast platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCapabilities {
    /// Platform name written to the ledger
    pub platform: String,
    /// Maximum message length in characters
    pub max_chars: usize,
    /// Whether a publish needs an image URL
    pub requires_image: bool,
    /// Hours of the reference day the platform may be posted to (None = any)
    pub allowed_hours: Option<Vec<u8>>,
}

impl ChannelCapabilities {
    pub fn new(platform: impl Into<String>, max_chars: usize) -> Self {
        Self {
            platform: platform.into(),
            max_chars,
            requires_image: false,
            allowed_hours: None,
        }
    }

    pub fn with_requires_image(mut self, requires_image: bool) -> Self {
        self.requires_image = requires_image;
        self
    }

    pub fn with_allowed_hours(mut self, hours: Option<Vec<u8>>) -> Self {
        self.allowed_hours = hours;
        self
    }

    /// Apply per-deployment overrides from config
    pub fn with_overrides(mut self, overrides: &PlatformChannelConfig) -> Self {
        if let Some(max) = overrides.max_chars {
            self.max_chars = max;
        }
        if overrides.allowed_hours.is_some() {
            self.allowed_hours = overrides.allowed_hours.clone();
        }
        self
    }

    /// Check whether `hour` is inside the platform's posting window
    pub fn allows_hour(&self, hour: u8) -> bool {
        self.allowed_hours
            .as_ref()
            .map_or(true, |hours| hours.contains(&hour))
    }
}

/// Result of a single publish call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutcome {
    /// Whether the platform accepted the post
    pub success: bool,
    /// Platform-assigned post id
    pub external_id: Option<String>,
    /// Platform error text on failure
    pub error: Option<String>,
}

impl PublishOutcome {
    /// Create a successful outcome
    pub fn posted(external_id: Option<String>) -> Self {
        Self {
            success: true,
            external_id,
            error: None,
        }
    }

    /// Create a failed outcome
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Trait for broadcast platform adapters
///
/// `publish` returns `Ok` with a failed outcome when the platform answered
/// and refused, and `Err` when the call itself broke. The dispatcher turns
/// both into a failed ledger row.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Static limits of this adapter
    fn capabilities(&self) -> &ChannelCapabilities;

    /// Platform name
    fn platform(&self) -> &str {
        &self.capabilities().platform
    }

    /// Whether the adapter has everything it needs to publish
    fn is_configured(&self) -> bool;

    /// Publish a message, optionally with an image
    async fn publish(&self, text: &str, image_url: Option<&str>) -> ChannelResult<PublishOutcome>;

    /// Read current absolute performance counters of a published post
    async fn fetch_metrics(&self, external_id: &str) -> ChannelResult<EngagementMetrics>;

    /// Get adapter configuration as JSON (credentials redacted)
    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "platform": self.platform(),
            "configured": self.is_configured(),
            "capabilities": self.capabilities(),
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Ordered set of adapters; dispatch follows registration order
#[derive(Default, Clone)]
pub struct ChannelRegistry {
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard adapter set from config
    ///
    /// Order: facebook, instagram, x, then webhooks as listed.
    pub fn from_config(config: &ChannelsConfig, credentials: SharedCredentials) -> ChannelResult<Self> {
        let client = build_http_client(Duration::from_secs(config.http_timeout_secs))?;
        let mut registry = Self::new();

        if config.facebook.enabled {
            let mut adapter = facebook::FacebookChannel::new(client.clone(), credentials.clone())
                .with_overrides(&config.facebook);
            if let Some(base) = &config.facebook.api_base_url {
                adapter = adapter.with_base_url(base);
            }
            registry.register(Arc::new(adapter));
        }

        if config.instagram.enabled {
            let mut adapter = instagram::InstagramChannel::new(client.clone(), credentials.clone())
                .with_overrides(&config.instagram);
            if let Some(base) = &config.instagram.api_base_url {
                adapter = adapter.with_base_url(base);
            }
            registry.register(Arc::new(adapter));
        }

        if config.x.enabled {
            let mut adapter = x::XChannel::new(client, credentials).with_overrides(&config.x);
            if let Some(base) = &config.x.api_base_url {
                adapter = adapter.with_base_url(base);
            }
            registry.register(Arc::new(adapter));
        }

        for webhook in &config.webhooks {
            registry.register(Arc::new(webhook::WebhookChannel::new(webhook.clone())?));
        }

        tracing::info!(
            adapters = ?registry.platforms(),
            "Channel registry initialized"
        );
        Ok(registry)
    }

    /// Append an adapter
    pub fn register(&mut self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.push(adapter);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Adapters in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ChannelAdapter>> {
        self.adapters.iter()
    }

    /// Find the adapter for a platform name
    pub fn get(&self, platform: &str) -> Option<&Arc<dyn ChannelAdapter>> {
        self.adapters.iter().find(|a| a.platform() == platform)
    }

    /// Registered platform names
    pub fn platforms(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.platform().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Build the HTTP client shared by platform adapters
pub fn build_http_client(timeout: Duration) -> ChannelResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(format!("promocast/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))
}

/// Snapshot the shared credentials
pub(crate) fn read_credentials(credentials: &SharedCredentials) -> ChannelIntegration {
    credentials
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Non-empty string value
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Check that an image URL answers HEAD with an `image/*` content type
pub(crate) async fn image_accessible(client: &Client, url: &str) -> bool {
    match client.head(url).timeout(Duration::from_secs(5)).send().await {
        Ok(response) => {
            let is_image = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ct| ct.starts_with("image/"));
            response.status().is_success() && is_image
        }
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "Image HEAD check failed");
            false
        }
    }
}
