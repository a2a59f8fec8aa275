//! Message composition
//!
//! Renders a content item into the final text shared by every channel of a
//! cycle. Length limits are applied later, per adapter, by the dispatcher.

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::models::ContentItem;

/// Built-in site key → public URL
const DEFAULT_SITES: &[(&str, &str)] = &[
    ("garagebot", "https://garagebot.io"),
    ("dwtl", "https://dwtl.io"),
    ("tlid", "https://tlid.io"),
    ("trustshield", "https://trustshield.io"),
];

/// Used when neither the site nor the default site is known
const FALLBACK_URL: &str = "https://garagebot.io";

/// Site key → URL table with a default-site fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteDirectory {
    sites: BTreeMap<String, String>,
    default_site: String,
}

impl Default for SiteDirectory {
    fn default() -> Self {
        Self::new("garagebot")
    }
}

impl SiteDirectory {
    /// Built-in table with the given default site
    pub fn new(default_site: impl Into<String>) -> Self {
        Self {
            sites: DEFAULT_SITES
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            default_site: default_site.into(),
        }
    }

    /// Layer config entries over the built-in table
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        for (key, url) in overrides {
            self.sites.insert(key.clone(), url.clone());
        }
        self
    }

    /// URL for a site key, falling back to the default site
    pub fn resolve(&self, site: &str) -> &str {
        self.sites
            .get(site)
            .or_else(|| self.sites.get(&self.default_site))
            .map(String::as_str)
            .unwrap_or(FALLBACK_URL)
    }

    pub fn default_site(&self) -> &str {
        &self.default_site
    }

    pub fn sites(&self) -> &BTreeMap<String, String> {
        &self.sites
    }
}

/// Normalize a hashtag to a single leading `#`; None for blank tags
pub fn normalize_hashtag(tag: &str) -> Option<String> {
    let bare = tag.trim().trim_start_matches('#');
    (!bare.is_empty()).then(|| format!("#{bare}"))
}

/// Public image URL from the engine base URL and an image's file path
///
/// Absolute file paths pass through unchanged. A path on the base URL is
/// kept, so `https://host/app` serves images under `/app/`.
pub fn image_url(base_url: &str, file_path: &str) -> String {
    if Url::parse(file_path).is_ok() {
        return file_path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    let path = file_path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Renders content items into post text
#[derive(Debug, Clone, Default)]
pub struct MessageComposer {
    sites: SiteDirectory,
}

impl MessageComposer {
    pub fn new(sites: SiteDirectory) -> Self {
        Self { sites }
    }

    pub fn sites(&self) -> &SiteDirectory {
        &self.sites
    }

    /// `body`, blank line, site URL, then hashtags on their own paragraph
    pub fn compose(&self, item: &ContentItem) -> String {
        self.render(&item.body, &item.hashtags, &item.target_site)
    }

    pub fn render(&self, body: &str, hashtags: &[String], site: &str) -> String {
        let mut text = format!("{body}\n\n{}", self.sites.resolve(site));

        let tags: Vec<String> = hashtags.iter().filter_map(|t| normalize_hashtag(t)).collect();
        if !tags.is_empty() {
            text.push_str("\n\n");
            text.push_str(&tags.join(" "));
        }

        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_with_hashtags() {
        let composer = MessageComposer::default();
        let text = composer.render("Save $40", &tags(&["GarageBot", "Deal"]), "garagebot");
        assert_eq!(text, "Save $40\n\nhttps://garagebot.io\n\n#GarageBot #Deal");
        assert!(text.ends_with("https://garagebot.io\n\n#GarageBot #Deal"));
    }

    #[test]
    fn test_render_without_hashtags() {
        let composer = MessageComposer::default();
        let text = composer.render("Trust first.", &[], "trustshield");
        assert_eq!(text, "Trust first.\n\nhttps://trustshield.io");
    }

    #[test]
    fn test_existing_hash_not_doubled() {
        let composer = MessageComposer::default();
        let text = composer.render("x", &tags(&["#Winter", " ##Tires ", "  "]), "dwtl");
        assert!(text.ends_with("https://dwtl.io\n\n#Winter #Tires"));
    }

    #[test]
    fn test_unknown_site_falls_back_to_default() {
        let sites = SiteDirectory::new("tlid");
        assert_eq!(sites.resolve("nowhere"), "https://tlid.io");

        let sites = SiteDirectory::new("missing");
        assert_eq!(sites.resolve("nowhere"), "https://garagebot.io");
    }

    #[test]
    fn test_site_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("garagebot".to_string(), "https://staging.garagebot.io".to_string());
        overrides.insert("orbit".to_string(), "https://orbit.example".to_string());

        let sites = SiteDirectory::default().with_overrides(&overrides);
        assert_eq!(sites.resolve("garagebot"), "https://staging.garagebot.io");
        assert_eq!(sites.resolve("orbit"), "https://orbit.example");
        assert_eq!(sites.resolve("dwtl"), "https://dwtl.io");
    }

    #[test]
    fn test_image_url() {
        assert_eq!(
            image_url("https://garagebot.io", "/generated_images/brake_parts.png"),
            "https://garagebot.io/generated_images/brake_parts.png"
        );
        assert_eq!(
            image_url("https://garagebot.io/", "/generated_images/a.png"),
            "https://garagebot.io/generated_images/a.png"
        );
        assert_eq!(
            image_url("https://garagebot.io", "https://cdn.example.com/a.png"),
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn test_image_url_keeps_base_path() {
        assert_eq!(
            image_url("https://host.example/app", "/generated_images/a.png"),
            "https://host.example/app/generated_images/a.png"
        );
        assert_eq!(
            image_url("https://host.example/app/", "generated_images/a.png"),
            "https://host.example/app/generated_images/a.png"
        );
    }
}
