//! Instagram Business channel
//!
//! Two-step publishing: create a media container from a public image URL,
//! then publish the container. Instagram has no text-only posts, so the
//! adapter requires an image.

use async_trait::async_trait;
use reqwest::Client;

use super::facebook::{parse_graph, rejected, GraphResponse, InsightsResponse, DEFAULT_BASE_URL};
use super::{
    image_accessible, present, read_credentials, ChannelAdapter, ChannelCapabilities, ChannelError,
    ChannelResult, PublishOutcome, SharedCredentials,
};
use crate::config::PlatformChannelConfig;
use crate::models::EngagementMetrics;

/// Instagram caption length limit
pub const MAX_CHARS: usize = 2_200;

/// Graph error codes for a token lacking publish permission
const PERMISSION_CODES: [i64; 2] = [10, 200];

/// Message used when the token lacks publish permission
pub const PERMISSION_MESSAGE: &str =
    "Instagram token is missing the instagram_content_publish permission; regenerate it with that permission granted";

/// Instagram Business adapter
pub struct InstagramChannel {
    client: Client,
    credentials: SharedCredentials,
    capabilities: ChannelCapabilities,
    base_url: String,
}

impl InstagramChannel {
    pub fn new(client: Client, credentials: SharedCredentials) -> Self {
        Self {
            client,
            credentials,
            capabilities: ChannelCapabilities::new("instagram", MAX_CHARS).with_requires_image(true),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at another Graph host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_overrides(mut self, overrides: &PlatformChannelConfig) -> Self {
        // Image requirement is intrinsic to the platform
        self.capabilities = self.capabilities.with_overrides(overrides).with_requires_image(true);
        self
    }

    /// Account id and the page token that owns it
    fn account_credentials(&self) -> ChannelResult<(String, String)> {
        let creds = read_credentials(&self.credentials);
        match (present(&creds.instagram_account_id), present(&creds.facebook_page_access_token)) {
            (Some(account), Some(token)) => Ok((account.to_string(), token.to_string())),
            _ => Err(ChannelError::NotConfigured("Instagram".to_string())),
        }
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> ChannelResult<(GraphResponse, String)> {
        let response = self.client.post(url).json(body).send().await?;
        let text = response.text().await?;
        Ok((parse_graph(&text), text))
    }
}

#[async_trait]
impl ChannelAdapter for InstagramChannel {
    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn is_configured(&self) -> bool {
        self.account_credentials().is_ok()
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> ChannelResult<PublishOutcome> {
        let (account, token) = self.account_credentials()?;

        let Some(image_url) = image_url else {
            return Ok(PublishOutcome::failed("Instagram requires an image"));
        };

        if !image_accessible(&self.client, image_url).await {
            return Ok(PublishOutcome::failed(format!(
                "Instagram image not publicly accessible ({image_url})"
            )));
        }

        let container_url = format!("{}/{account}/media", self.base_url);
        let body = serde_json::json!({ "image_url": image_url, "caption": text, "access_token": token });
        let (container, raw) = self.post_json(&container_url, &body).await?;

        let Some(creation_id) = container.id.clone() else {
            if container
                .error_code()
                .is_some_and(|code| PERMISSION_CODES.contains(&code))
            {
                return Ok(PublishOutcome::failed(PERMISSION_MESSAGE));
            }
            return Ok(PublishOutcome::failed(raw));
        };

        let publish_url = format!("{}/{account}/media_publish", self.base_url);
        let body = serde_json::json!({ "creation_id": creation_id, "access_token": token });
        let (published, raw) = self.post_json(&publish_url, &body).await?;

        Ok(match published.id {
            Some(id) => PublishOutcome::posted(Some(id)),
            None => PublishOutcome::failed(raw),
        })
    }

    async fn fetch_metrics(&self, external_id: &str) -> ChannelResult<EngagementMetrics> {
        let (_, token) = self.account_credentials()?;

        let url = format!("{}/{external_id}/insights", self.base_url);
        let body = self
            .client
            .get(&url)
            .query(&[
                ("metric", "impressions,reach,likes,comments,shares"),
                ("access_token", token.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;

        let insights: InsightsResponse = parse_graph(&body);
        if insights.error.is_some() {
            return Err(rejected("instagram", insights.error, &body));
        }

        Ok(EngagementMetrics {
            impressions: insights.value("impressions"),
            reach: insights.value("reach"),
            clicks: 0,
            likes: insights.value("likes"),
            comments: insights.value("comments"),
            shares: insights.value("shares"),
        })
    }
}
