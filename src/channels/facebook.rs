//! Facebook Page channel
//!
//! Publishes through the Graph API. A post with a reachable image goes to
//! `/{page}/photos`; otherwise it is a text post on `/{page}/feed`. When the
//! photo is rejected with error 324 the post is retried once as text.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{
    image_accessible, present, read_credentials, ChannelAdapter, ChannelCapabilities, ChannelError,
    ChannelResult, PublishOutcome, SharedCredentials,
};
use crate::config::PlatformChannelConfig;
use crate::models::EngagementMetrics;

/// Default Graph API base URL
pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v21.0";

/// Facebook post length limit
pub const MAX_CHARS: usize = 63_206;

/// Graph error code for an image the platform could not fetch or accept
const IMAGE_REJECTED: i64 = 324;

// ============================================================================
// Graph API payloads (shared with Instagram)
// ============================================================================

/// Graph API error body
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

/// Generic Graph API response
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GraphResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub post_id: Option<String>,
    #[serde(default)]
    pub error: Option<GraphError>,
}

impl GraphResponse {
    /// Created object id, preferring `id` over `post_id`
    pub fn created_id(&self) -> Option<String> {
        self.id.clone().or_else(|| self.post_id.clone())
    }

    pub fn error_code(&self) -> Option<i64> {
        self.error.as_ref().and_then(|e| e.code)
    }
}

/// `/insights` response
#[derive(Debug, Default, Deserialize)]
pub(crate) struct InsightsResponse {
    #[serde(default)]
    pub data: Vec<InsightMetric>,
    #[serde(default)]
    pub error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightMetric {
    pub name: String,
    #[serde(default)]
    pub values: Vec<InsightValue>,
    #[serde(default)]
    pub total_value: Option<InsightValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InsightValue {
    #[serde(default)]
    pub value: serde_json::Value,
}

impl InsightsResponse {
    /// Latest value of a named metric, 0 when absent
    pub fn value(&self, name: &str) -> u64 {
        self.data
            .iter()
            .find(|m| m.name == name)
            .and_then(|m| m.total_value.as_ref().or_else(|| m.values.last()))
            .and_then(|v| v.value.as_u64())
            .unwrap_or(0)
    }
}

/// Parse a Graph body, tolerating non-JSON error pages
pub(crate) fn parse_graph<T: serde::de::DeserializeOwned + Default>(body: &str) -> T {
    serde_json::from_str(body).unwrap_or_default()
}

/// Convert a Graph error payload into a channel error
pub(crate) fn rejected(platform: &str, error: Option<GraphError>, body: &str) -> ChannelError {
    match error {
        Some(e) => ChannelError::Rejected {
            platform: platform.to_string(),
            code: e.code,
            message: e.message,
        },
        None => ChannelError::Rejected {
            platform: platform.to_string(),
            code: None,
            message: body.to_string(),
        },
    }
}

#[derive(Debug, Default, Deserialize)]
struct CountSummary {
    #[serde(default)]
    total_count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryEdge {
    #[serde(default)]
    summary: CountSummary,
}

#[derive(Debug, Default, Deserialize)]
struct ShareCount {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, Default, Deserialize)]
struct PostEngagement {
    #[serde(default)]
    reactions: SummaryEdge,
    #[serde(default)]
    comments: SummaryEdge,
    #[serde(default)]
    shares: ShareCount,
    #[serde(default)]
    error: Option<GraphError>,
}

// ============================================================================
// Facebook Channel
// ============================================================================

/// Facebook Page adapter
pub struct FacebookChannel {
    client: Client,
    credentials: SharedCredentials,
    capabilities: ChannelCapabilities,
    base_url: String,
}

impl FacebookChannel {
    pub fn new(client: Client, credentials: SharedCredentials) -> Self {
        Self {
            client,
            credentials,
            capabilities: ChannelCapabilities::new("facebook", MAX_CHARS),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at another Graph host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_overrides(mut self, overrides: &PlatformChannelConfig) -> Self {
        self.capabilities = self.capabilities.with_overrides(overrides);
        self
    }

    fn page_credentials(&self) -> ChannelResult<(String, String)> {
        let creds = read_credentials(&self.credentials);
        match (present(&creds.facebook_page_id), present(&creds.facebook_page_access_token)) {
            (Some(page), Some(token)) => Ok((page.to_string(), token.to_string())),
            _ => Err(ChannelError::NotConfigured("Facebook".to_string())),
        }
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> ChannelResult<(GraphResponse, String)> {
        let response = self.client.post(url).json(body).send().await?;
        let text = response.text().await?;
        Ok((parse_graph(&text), text))
    }

    async fn post_text(&self, page: &str, token: &str, message: &str) -> ChannelResult<PublishOutcome> {
        let url = format!("{}/{page}/feed", self.base_url);
        let body = serde_json::json!({ "message": message, "access_token": token });
        let (data, raw) = self.post_json(&url, &body).await?;

        Ok(match data.created_id() {
            Some(id) => PublishOutcome::posted(Some(id)),
            None => PublishOutcome::failed(raw),
        })
    }
}

#[async_trait]
impl ChannelAdapter for FacebookChannel {
    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn is_configured(&self) -> bool {
        self.page_credentials().is_ok()
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> ChannelResult<PublishOutcome> {
        let (page, token) = self.page_credentials()?;

        let image = match image_url {
            Some(url) if image_accessible(&self.client, url).await => Some(url),
            Some(url) => {
                tracing::info!(image_url = %url, "Image not accessible, posting text-only");
                None
            }
            None => None,
        };

        let Some(image) = image else {
            return self.post_text(&page, &token, text).await;
        };

        let url = format!("{}/{page}/photos", self.base_url);
        let body = serde_json::json!({ "url": image, "message": text, "access_token": token });
        let (data, raw) = self.post_json(&url, &body).await?;

        if let Some(id) = data.created_id() {
            return Ok(PublishOutcome::posted(Some(id)));
        }

        if data.error_code() == Some(IMAGE_REJECTED) {
            tracing::info!("Image rejected by Facebook, retrying as text-only post");
            return self.post_text(&page, &token, text).await;
        }

        Ok(PublishOutcome::failed(raw))
    }

    async fn fetch_metrics(&self, external_id: &str) -> ChannelResult<EngagementMetrics> {
        let (_, token) = self.page_credentials()?;

        let insights_url = format!("{}/{external_id}/insights", self.base_url);
        let body = self
            .client
            .get(&insights_url)
            .query(&[
                ("metric", "post_impressions,post_impressions_unique,post_clicks"),
                ("access_token", token.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;
        let insights: InsightsResponse = parse_graph(&body);
        if insights.error.is_some() {
            return Err(rejected("facebook", insights.error, &body));
        }

        let fields_url = format!("{}/{external_id}", self.base_url);
        let body = self
            .client
            .get(&fields_url)
            .query(&[
                ("fields", "reactions.summary(true),comments.summary(true),shares"),
                ("access_token", token.as_str()),
            ])
            .send()
            .await?
            .text()
            .await?;
        let engagement: PostEngagement = parse_graph(&body);
        if engagement.error.is_some() {
            return Err(rejected("facebook", engagement.error, &body));
        }

        Ok(EngagementMetrics {
            impressions: insights.value("post_impressions"),
            reach: insights.value("post_impressions_unique"),
            clicks: insights.value("post_clicks"),
            likes: engagement.reactions.summary.total_count,
            comments: engagement.comments.summary.total_count,
            shares: engagement.shares.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChannelIntegration;
    use std::sync::{Arc, RwLock};

    #[test]
    fn test_graph_response_created_id() {
        let r: GraphResponse = parse_graph(r#"{"id":"1_2"}"#);
        assert_eq!(r.created_id().as_deref(), Some("1_2"));

        let r: GraphResponse = parse_graph(r#"{"post_id":"3_4"}"#);
        assert_eq!(r.created_id().as_deref(), Some("3_4"));

        let r: GraphResponse = parse_graph(r#"{"error":{"message":"bad image","code":324}}"#);
        assert!(r.created_id().is_none());
        assert_eq!(r.error_code(), Some(324));

        let r: GraphResponse = parse_graph("<html>502</html>");
        assert!(r.created_id().is_none());
    }

    #[test]
    fn test_insights_value() {
        let r: InsightsResponse = parse_graph(
            r#"{"data":[
                {"name":"post_impressions","values":[{"value":120}]},
                {"name":"post_clicks","values":[{"value":4}]}
            ]}"#,
        );
        assert_eq!(r.value("post_impressions"), 120);
        assert_eq!(r.value("post_clicks"), 4);
        assert_eq!(r.value("post_impressions_unique"), 0);
    }

    #[test]
    fn test_is_configured_needs_page_and_token() {
        let mut creds = ChannelIntegration::for_tenant("garagebot");
        creds.facebook_page_id = Some("123".to_string());
        let shared = Arc::new(RwLock::new(creds));
        let channel = FacebookChannel::new(Client::new(), shared.clone());
        assert!(!channel.is_configured());

        shared.write().unwrap().facebook_page_access_token = Some("tok".to_string());
        assert!(channel.is_configured());
        assert_eq!(channel.capabilities().max_chars, 63_206);
    }
}
