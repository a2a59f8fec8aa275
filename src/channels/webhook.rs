//! Webhook broadcast channel
//!
//! This module provides a channel that broadcasts each composed message as a
//! JSON payload via HTTP POST (Discord, Slack or any custom relay).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use super::{ChannelAdapter, ChannelCapabilities, ChannelError, ChannelResult, PublishOutcome};
use crate::models::EngagementMetrics;

/// Webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Platform name recorded in the ledger
    #[serde(default = "default_name")]
    pub name: String,
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Maximum message length in characters
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Hours of the reference day the webhook may be posted to
    #[serde(default)]
    pub allowed_hours: Option<Vec<u8>>,
}

fn default_name() -> String {
    "webhook".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_max_chars() -> usize {
    4000
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            url: url.into(),
            auth_token: None,
            headers: HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            max_chars: default_max_chars(),
            allowed_hours: None,
        }
    }

    /// Set the platform name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the character limit
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Webhook name cannot be empty".to_string());
        }

        let parsed = url::Url::parse(&self.url).map_err(|e| format!("Invalid webhook URL '{}': {e}", self.url))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.max_chars <= 3 {
            return Err("max_chars must be greater than 3".to_string());
        }

        if let Some(hours) = &self.allowed_hours {
            if let Some(bad) = hours.iter().find(|h| **h > 23) {
                return Err(format!("allowed hour {bad} is out of range 0-23"));
            }
        }

        Ok(())
    }
}

/// Webhook broadcast channel
///
/// # Payload Format
///
/// ```json
/// {
///   "content": "Rendered message text",
///   "text": "Rendered message text",
///   "image_url": "https://garagebot.io/generated_images/brake_parts.png",
///   "source": "promocast",
///   "sent_at": "2024-01-01T12:00:00Z"
/// }
/// ```
///
/// `content` is read by Discord, `text` by Slack.
///
/// Webhooks return no post id, so their rows are never refreshed by insights.
pub struct WebhookChannel {
    config: WebhookConfig,
    capabilities: ChannelCapabilities,
    client: Client,
}

impl WebhookChannel {
    /// Create a new webhook channel
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;

        let capabilities = ChannelCapabilities::new(config.name.clone(), config.max_chars)
            .with_allowed_hours(config.allowed_hours.clone());

        Ok(Self {
            config,
            capabilities,
            client,
        })
    }

    /// Create a simple webhook channel with just a URL
    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Build the webhook payload from a message
    fn build_payload(&self, text: &str, image_url: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "content": text,
            "text": text,
            "image_url": image_url,
            "source": "promocast",
            "sent_at": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Send the request with retry logic
    async fn send_with_retry(&self, payload: &serde_json::Value) -> ChannelResult<()> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s...
                let delay = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
                tracing::debug!(
                    channel = %self.config.name,
                    "Retrying webhook request (attempt {}/{})",
                    attempt + 1,
                    self.config.max_retries + 1
                );
            }

            let mut request = self.client.post(&self.config.url);

            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }

            match request.json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        tracing::debug!(
                            channel = %self.config.name,
                            status = %status,
                            "Webhook delivered"
                        );
                        return Ok(());
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unable to read response body".to_string());

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ChannelError::RateLimited(format!("HTTP {status}: {body}")));
                        continue;
                    }

                    // Client errors will not improve on retry
                    if status.is_client_error() {
                        last_error = Some(ChannelError::Rejected {
                            platform: self.config.name.clone(),
                            code: Some(i64::from(status.as_u16())),
                            message: body,
                        });
                        break;
                    }

                    last_error = Some(ChannelError::Unavailable(format!("HTTP {status}: {body}")));
                }
                Err(e) => {
                    last_error = Some(ChannelError::HttpError(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ChannelError::Other("Unknown error".to_string())))
    }
}

#[async_trait]
impl ChannelAdapter for WebhookChannel {
    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn is_configured(&self) -> bool {
        !self.config.url.is_empty()
    }

    async fn publish(&self, text: &str, image_url: Option<&str>) -> ChannelResult<PublishOutcome> {
        let payload = self.build_payload(text, image_url);

        match self.send_with_retry(&payload).await {
            Ok(()) => Ok(PublishOutcome::posted(None)),
            Err(e) => {
                tracing::warn!(channel = %self.config.name, error = %e, "Webhook delivery failed");
                Ok(PublishOutcome::failed(e.to_string()))
            }
        }
    }

    async fn fetch_metrics(&self, _external_id: &str) -> ChannelResult<EngagementMetrics> {
        Err(ChannelError::Other(format!(
            "{} does not report engagement metrics",
            self.config.name
        )))
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "platform": self.config.name,
            "host": url::Url::parse(&self.config.url)
                .ok()
                .and_then(|u| u.host_str().map(String::from)),
            "timeout_secs": self.config.timeout_secs,
            "max_retries": self.config.max_retries,
            "has_auth": self.config.auth_token.is_some(),
            "custom_headers": self.config.headers.keys().collect::<Vec<_>>(),
            "capabilities": self.capabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_validation() {
        let valid = WebhookConfig::new("https://example.com/webhook");
        assert!(valid.validate().is_ok());

        let empty_url = WebhookConfig::new("");
        assert!(empty_url.validate().is_err());

        let no_protocol = WebhookConfig::new("example.com/webhook");
        assert!(no_protocol.validate().is_err());

        let ftp = WebhookConfig::new("ftp://example.com/webhook");
        assert!(ftp.validate().is_err());

        let zero_timeout = WebhookConfig::new("https://example.com").with_timeout(0);
        assert!(zero_timeout.validate().is_err());

        let tiny = WebhookConfig::new("https://example.com").with_max_chars(3);
        assert!(tiny.validate().is_err());
    }

    #[test]
    fn test_webhook_config_builder() {
        let config = WebhookConfig::new("https://example.com/webhook")
            .with_name("discord")
            .with_auth_token("secret-token")
            .with_header("X-Custom", "value")
            .with_timeout(30)
            .with_max_retries(5)
            .with_max_chars(2000);

        assert_eq!(config.name, "discord");
        assert_eq!(config.auth_token, Some("secret-token".to_string()));
        assert_eq!(config.headers.get("X-Custom"), Some(&"value".to_string()));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.max_chars, 2000);
    }

    #[test]
    fn test_webhook_creation() {
        let channel = WebhookChannel::from_url("https://example.com/webhook").unwrap();
        assert_eq!(channel.platform(), "webhook");
        assert_eq!(channel.url(), "https://example.com/webhook");
        assert_eq!(channel.capabilities().max_chars, 4000);
        assert!(!channel.capabilities().requires_image);
        assert!(channel.is_configured());

        assert!(WebhookChannel::from_url("not-a-url").is_err());
    }

    #[test]
    fn test_webhook_payload_building() {
        let channel = WebhookChannel::from_url("https://example.com/webhook").unwrap();
        let payload = channel.build_payload("Save $40", Some("https://garagebot.io/generated_images/a.png"));

        assert_eq!(payload["content"], "Save $40");
        assert_eq!(payload["text"], "Save $40");
        assert_eq!(payload["image_url"], "https://garagebot.io/generated_images/a.png");
        assert!(payload["sent_at"].is_string());

        let text_only = channel.build_payload("hi", None);
        assert!(text_only["image_url"].is_null());
    }

    #[test]
    fn test_webhook_settings_hide_url() {
        let config = WebhookConfig::new("https://hooks.example.com/services/T000/B000/secret")
            .with_auth_token("secret-token");
        let channel = WebhookChannel::new(config).unwrap();
        let settings = channel.config();

        assert_eq!(settings["host"], "hooks.example.com");
        assert_eq!(settings["has_auth"], true);
        assert!(!settings.to_string().contains("secret"));
    }

    #[test]
    fn test_webhook_config_deserialize_defaults() {
        let config: WebhookConfig = toml::from_str(r#"url = "https://hooks.example.com/x""#).unwrap();
        assert_eq!(config.name, "webhook");
        assert_eq!(config.max_chars, 4000);
        assert_eq!(config.max_retries, 3);
        assert!(config.allowed_hours.is_none());
    }
}
