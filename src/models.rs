// Core data structures for promocast

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which platform a content item may be published to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PlatformScope {
    /// Eligible for every channel
    All,
    /// Eligible only when a cycle requests this platform
    Platform(String),
}

impl PlatformScope {
    /// Get string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Platform(p) => p.as_str(),
        }
    }

    /// Check whether an item carrying this scope is eligible for `requested`
    pub fn admits(&self, requested: &PlatformScope) -> bool {
        matches!(self, Self::All) || self == requested
    }
}

impl From<String> for PlatformScope {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&str> for PlatformScope {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "" | "all" => Self::All,
            other => Self::Platform(other.to_string()),
        }
    }
}

impl From<PlatformScope> for String {
    fn from(scope: PlatformScope) -> Self {
        scope.as_str().to_string()
    }
}

impl Default for PlatformScope {
    fn default() -> Self {
        Self::All
    }
}

impl fmt::Display for PlatformScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Season tag on a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
    All,
}

impl Season {
    /// Season for a calendar month (1-12), in fixed 3-month buckets
    ///
    /// Mar-May spring, Jun-Aug summer, Sep-Nov fall, Dec-Feb winter.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Fall,
            _ => Self::Winter,
        }
    }

    /// Season of the given instant's date
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self::from_month(date.month())
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Fall => "fall",
            Self::Winter => "winter",
            Self::All => "all",
        }
    }

    /// Check whether an item tagged with this season runs in `current`
    pub fn admits(&self, current: Season) -> bool {
        *self == Season::All || *self == current
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "spring" => Ok(Self::Spring),
            "summer" => Ok(Self::Summer),
            "fall" | "autumn" => Ok(Self::Fall),
            "winter" => Ok(Self::Winter),
            "all" | "all-year" | "" => Ok(Self::All),
            other => Err(format!("unknown season '{other}'")),
        }
    }
}

impl Default for Season {
    fn default() -> Self {
        Self::All
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Promotional content item from the content pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub body: String,
    pub platform: PlatformScope,
    pub hashtags: Vec<String>,
    pub target_site: String,
    pub category: Option<String>,
    pub season: Season,
    pub content_type: Option<String>,
    pub tone: Option<String>,
    pub cta: Option<String>,
    pub is_active: bool,
    pub usage_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insertable content item (no usage accounting yet)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContentItem {
    pub body: String,
    #[serde(default)]
    pub platform: PlatformScope,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default = "default_site")]
    pub target_site: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub season: Season,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub cta: Option<String>,
}

fn default_site() -> String {
    "garagebot".to_string()
}

impl NewContentItem {
    /// Create a content item for every platform
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            target_site: default_site(),
            ..Default::default()
        }
    }

    pub fn with_platform(mut self, platform: impl Into<PlatformScope>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_hashtags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hashtags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_season(mut self, season: Season) -> Self {
        self.season = season;
        self
    }

    pub fn with_target_site(mut self, site: impl Into<String>) -> Self {
        self.target_site = site.into();
        self
    }
}

/// Image from the image pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: String,
    pub filename: String,
    pub file_path: String,
    pub category: Option<String>,
    pub alt_text: Option<String>,
    pub is_active: bool,
    pub usage_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insertable image asset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewImageAsset {
    pub filename: String,
    /// Public path; defaults to `/generated_images/{filename}`
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
}

impl NewImageAsset {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Resolved public path of the image
    pub fn resolved_path(&self) -> String {
        self.file_path
            .clone()
            .unwrap_or_else(|| format!("/generated_images/{}", self.filename))
    }
}

/// Anything that takes part in least-used rotation
pub trait Rotatable {
    fn usage_count(&self) -> u32;
    fn last_used_at(&self) -> Option<DateTime<Utc>>;
}

impl<T: Rotatable + ?Sized> Rotatable for &T {
    fn usage_count(&self) -> u32 {
        (**self).usage_count()
    }

    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        (**self).last_used_at()
    }
}

impl Rotatable for ContentItem {
    fn usage_count(&self) -> u32 {
        self.usage_count
    }

    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }
}

impl Rotatable for ImageAsset {
    fn usage_count(&self) -> u32 {
        self.usage_count
    }

    fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }
}

/// Outcome of a dispatch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Posted,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown delivery status '{other}'")),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Absolute performance counters reported by a platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub impressions: u64,
    pub reach: u64,
    pub clicks: u64,
    pub likes: u64,
    pub comments: u64,
    pub shares: u64,
}

impl EngagementMetrics {
    /// Engagement score: likes + comments + shares
    ///
    /// Impressions, reach and clicks never contribute.
    pub fn engagement_score(&self) -> u64 {
        self.likes + self.comments + self.shares
    }
}

/// One row of the delivery ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub platform: String,
    pub content: String,
    pub status: DeliveryStatus,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub content_item_id: Option<String>,
    pub image_ref: Option<String>,
    pub schedule: Option<String>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub metrics: EngagementMetrics,
    pub metrics_updated_at: Option<DateTime<Utc>>,
}

impl DeliveryRecord {
    /// Engagement score of this row
    pub fn engagement_score(&self) -> u64 {
        self.metrics.engagement_score()
    }
}

/// Insertable ledger row
///
/// `posted_at` is derived from `status` when the row is appended.
#[derive(Debug, Clone)]
pub struct NewDeliveryRecord {
    pub platform: String,
    pub content: String,
    pub status: DeliveryStatus,
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub content_item_id: Option<String>,
    pub image_ref: Option<String>,
    pub schedule: Option<String>,
}

impl NewDeliveryRecord {
    /// Successful publish
    pub fn posted(platform: impl Into<String>, content: impl Into<String>, external_id: Option<String>) -> Self {
        Self {
            platform: platform.into(),
            content: content.into(),
            status: DeliveryStatus::Posted,
            external_id,
            error: None,
            content_item_id: None,
            image_ref: None,
            schedule: None,
        }
    }

    /// Failed publish
    pub fn failed(platform: impl Into<String>, content: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            content: content.into(),
            status: DeliveryStatus::Failed,
            external_id: None,
            error: Some(error.into()),
            content_item_id: None,
            image_ref: None,
            schedule: None,
        }
    }

    pub fn with_content_item(mut self, id: Option<String>) -> Self {
        self.content_item_id = id;
        self
    }

    pub fn with_image_ref(mut self, image: Option<String>) -> Self {
        self.image_ref = image;
        self
    }

    pub fn with_schedule(mut self, schedule: Option<String>) -> Self {
        self.schedule = schedule;
        self
    }
}

/// Per-tenant channel credentials and connection flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelIntegration {
    pub tenant_id: String,
    pub facebook_page_id: Option<String>,
    #[serde(skip_serializing)]
    pub facebook_page_access_token: Option<String>,
    pub facebook_connected: bool,
    pub instagram_account_id: Option<String>,
    pub instagram_connected: bool,
    #[serde(skip_serializing)]
    pub x_access_token: Option<String>,
    pub x_connected: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChannelIntegration {
    /// Empty integration for a tenant
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Overlay the present fields of `other` onto `self` and recompute flags
    pub fn merge(&mut self, other: &ChannelIntegration) {
        if other.facebook_page_id.is_some() {
            self.facebook_page_id = other.facebook_page_id.clone();
        }
        if other.facebook_page_access_token.is_some() {
            self.facebook_page_access_token = other.facebook_page_access_token.clone();
        }
        if other.instagram_account_id.is_some() {
            self.instagram_account_id = other.instagram_account_id.clone();
        }
        if other.x_access_token.is_some() {
            self.x_access_token = other.x_access_token.clone();
        }
        self.refresh_flags();
    }

    /// Recompute connection flags from the credentials present
    pub fn refresh_flags(&mut self) {
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        self.facebook_connected = has(&self.facebook_page_id) && has(&self.facebook_page_access_token);
        self.instagram_connected = has(&self.instagram_account_id) && has(&self.facebook_page_access_token);
        self.x_connected = has(&self.x_access_token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_buckets() {
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(5), Season::Spring);
        assert_eq!(Season::from_month(6), Season::Summer);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(9), Season::Fall);
        assert_eq!(Season::from_month(11), Season::Fall);
        assert_eq!(Season::from_month(12), Season::Winter);
    }

    #[test]
    fn test_season_parse() {
        assert_eq!("autumn".parse::<Season>().unwrap(), Season::Fall);
        assert_eq!("all-year".parse::<Season>().unwrap(), Season::All);
        assert!("monsoon".parse::<Season>().is_err());
    }

    #[test]
    fn test_platform_scope_admits() {
        let x = PlatformScope::from("x");
        assert!(PlatformScope::All.admits(&x));
        assert!(x.admits(&x));
        assert!(!PlatformScope::from("facebook").admits(&x));
        assert!(!x.admits(&PlatformScope::All));
    }

    #[test]
    fn test_engagement_score_ignores_reach() {
        let metrics = EngagementMetrics {
            impressions: 1000,
            reach: 500,
            clicks: 40,
            likes: 3,
            comments: 1,
            shares: 0,
        };
        assert_eq!(metrics.engagement_score(), 4);
    }

    #[test]
    fn test_integration_merge_keeps_existing() {
        let mut existing = ChannelIntegration::for_tenant("garagebot");
        existing.facebook_page_id = Some("123".to_string());
        existing.facebook_page_access_token = Some("tok".to_string());
        existing.refresh_flags();
        assert!(existing.facebook_connected);
        assert!(!existing.instagram_connected);

        let mut incoming = ChannelIntegration::for_tenant("garagebot");
        incoming.instagram_account_id = Some("ig-1".to_string());
        existing.merge(&incoming);

        assert_eq!(existing.facebook_page_id.as_deref(), Some("123"));
        assert!(existing.instagram_connected);
        assert!(!existing.x_connected);
    }
}
