//! X (Twitter) channel
//!
//! Posts through the v2 API with an OAuth 2.0 user-context bearer token.
//! Images are not attached; the composed text already carries the site link.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    present, read_credentials, ChannelAdapter, ChannelCapabilities, ChannelError, ChannelResult,
    PublishOutcome, SharedCredentials,
};
use crate::config::PlatformChannelConfig;
use crate::models::EngagementMetrics;

/// Default X API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

/// X post length limit
pub const MAX_CHARS: usize = 280;

#[derive(Debug, Deserialize)]
struct TweetEnvelope {
    data: Option<TweetData>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
    #[serde(default)]
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    quote_count: u64,
    #[serde(default)]
    impression_count: u64,
}

impl From<PublicMetrics> for EngagementMetrics {
    fn from(m: PublicMetrics) -> Self {
        Self {
            impressions: m.impression_count,
            reach: 0,
            clicks: 0,
            likes: m.like_count,
            comments: m.reply_count,
            shares: m.retweet_count + m.quote_count,
        }
    }
}

/// X v2 adapter
pub struct XChannel {
    client: Client,
    credentials: SharedCredentials,
    capabilities: ChannelCapabilities,
    base_url: String,
}

impl XChannel {
    pub fn new(client: Client, credentials: SharedCredentials) -> Self {
        Self {
            client,
            credentials,
            capabilities: ChannelCapabilities::new("x", MAX_CHARS),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at another API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_overrides(mut self, overrides: &PlatformChannelConfig) -> Self {
        self.capabilities = self.capabilities.with_overrides(overrides);
        self
    }

    fn token(&self) -> ChannelResult<String> {
        let creds = read_credentials(&self.credentials);
        present(&creds.x_access_token)
            .map(str::to_string)
            .ok_or_else(|| ChannelError::NotConfigured("X".to_string()))
    }
}

#[async_trait]
impl ChannelAdapter for XChannel {
    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn is_configured(&self) -> bool {
        present(&read_credentials(&self.credentials).x_access_token).is_some()
    }

    async fn publish(&self, text: &str, _image_url: Option<&str>) -> ChannelResult<PublishOutcome> {
        let token = self.token()?;
        let url = format!("{}/2/tweets", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            if let Ok(TweetEnvelope { data: Some(tweet) }) = serde_json::from_str::<TweetEnvelope>(&body) {
                tracing::debug!(external_id = %tweet.id, "X post created");
                return Ok(PublishOutcome::posted(Some(tweet.id)));
            }
        }

        Ok(PublishOutcome::failed(format!("HTTP {status}: {body}")))
    }

    async fn fetch_metrics(&self, external_id: &str) -> ChannelResult<EngagementMetrics> {
        let token = self.token()?;
        let url = format!("{}/2/tweets/{external_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("tweet.fields", "public_metrics")])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChannelError::RateLimited(format!("X metrics for {external_id}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Rejected {
                platform: "x".to_string(),
                code: Some(i64::from(status.as_u16())),
                message: body,
            });
        }

        let envelope: TweetEnvelope = response.json().await?;
        let metrics = envelope
            .data
            .and_then(|d| d.public_metrics)
            .unwrap_or_default();

        Ok(metrics.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelIntegration;
    use std::sync::{Arc, RwLock};

    fn channel(token: Option<&str>) -> XChannel {
        let mut creds = ChannelIntegration::for_tenant("garagebot");
        creds.x_access_token = token.map(String::from);
        XChannel::new(Client::new(), Arc::new(RwLock::new(creds)))
    }

    #[test]
    fn test_capabilities() {
        let x = channel(Some("tok"));
        assert_eq!(x.platform(), "x");
        assert_eq!(x.capabilities().max_chars, 280);
        assert!(!x.capabilities().requires_image);
    }

    #[test]
    fn test_is_configured() {
        assert!(channel(Some("tok")).is_configured());
        assert!(!channel(None).is_configured());
        assert!(!channel(Some("  ")).is_configured());
    }

    #[test]
    fn test_public_metrics_mapping() {
        let metrics: EngagementMetrics = PublicMetrics {
            retweet_count: 2,
            reply_count: 3,
            like_count: 10,
            quote_count: 1,
            impression_count: 900,
        }
        .into();

        assert_eq!(metrics.impressions, 900);
        assert_eq!(metrics.likes, 10);
        assert_eq!(metrics.comments, 3);
        assert_eq!(metrics.shares, 3);
        assert_eq!(metrics.engagement_score(), 16);
    }

    #[tokio::test]
    async fn test_publish_without_token_errors() {
        let err = channel(None).publish("hello", None).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }
}
