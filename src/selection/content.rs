//! Content selection

use anyhow::Result;
use chrono::{DateTime, TimeZone};

use super::least_used;
use crate::models::{ContentItem, PlatformScope, Season};
use crate::storage::SharedPoolRepository;

/// Eligibility filter for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentQuery {
    /// Requested platform scope
    pub platform: PlatformScope,
    /// Current season
    pub season: Season,
    /// Optional category restriction
    pub category: Option<String>,
}

impl ContentQuery {
    pub fn new(platform: impl Into<PlatformScope>, season: Season) -> Self {
        Self {
            platform: platform.into(),
            season,
            category: None,
        }
    }

    /// Query for the season of `now`, read in `now`'s own timezone
    pub fn at<Tz: TimeZone>(platform: impl Into<PlatformScope>, now: &DateTime<Tz>) -> Self {
        Self::new(platform, Season::of(&now.date_naive()))
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Check whether `item` may be published by this cycle
    pub fn matches(&self, item: &ContentItem) -> bool {
        item.is_active
            && item.platform.admits(&self.platform)
            && item.season.admits(self.season)
            && self
                .category
                .as_deref()
                .map_or(true, |wanted| item.category.as_deref() == Some(wanted))
    }
}

/// Pick the next content item from a pool snapshot
pub fn select_content<'a>(pool: &'a [ContentItem], query: &ContentQuery) -> Option<&'a ContentItem> {
    least_used(pool.iter().filter(|item| query.matches(item)))
}

/// Content selector over the pool repository
#[derive(Clone)]
pub struct ContentSelector {
    pool: SharedPoolRepository,
}

impl ContentSelector {
    pub fn new(pool: SharedPoolRepository) -> Self {
        Self { pool }
    }

    /// Next content item for the query, or None when nothing is eligible
    pub fn select(&self, query: &ContentQuery) -> Result<Option<ContentItem>> {
        let pool = self.pool.active_content()?;
        let picked = select_content(&pool, query).cloned();

        match &picked {
            Some(item) => tracing::debug!(
                content_id = %item.id,
                usage = item.usage_count,
                platform = %query.platform,
                season = %query.season,
                "Content selected"
            ),
            None => tracing::debug!(
                platform = %query.platform,
                season = %query.season,
                category = ?query.category,
                "No eligible content"
            ),
        }

        Ok(picked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewContentItem;
    use crate::storage::{MemoryStore, PoolRepository};
    use chrono::{FixedOffset, TimeZone, Utc};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn selector_with(items: Vec<NewContentItem>) -> (ContentSelector, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for item in &items {
            store.insert_content(item).unwrap();
        }
        (ContentSelector::new(store.clone()), store)
    }

    #[test]
    fn test_query_season_uses_local_date() {
        // 23:30 UTC on Nov 30 is already Dec 1 at UTC+2
        let utc = Utc.with_ymd_and_hms(2025, 11, 30, 23, 30, 0).unwrap();
        assert_eq!(ContentQuery::at("all", &utc).season, Season::Fall);

        let local = utc.with_timezone(&FixedOffset::east_opt(2 * 3600).unwrap());
        assert_eq!(ContentQuery::at("all", &local).season, Season::Winter);
    }

    #[test]
    fn test_filter_platform_and_season() {
        let (selector, _) = selector_with(vec![
            NewContentItem::new("summer only").with_season(Season::Summer),
            NewContentItem::new("facebook only").with_platform("facebook"),
            NewContentItem::new("winter x").with_platform("x").with_season(Season::Winter),
        ]);

        let query = ContentQuery::new("x", Season::Winter);
        assert_eq!(selector.select(&query).unwrap().unwrap().body, "winter x");

        let query = ContentQuery::new("all", Season::Summer);
        assert_eq!(selector.select(&query).unwrap().unwrap().body, "summer only");

        let query = ContentQuery::new("x", Season::Spring);
        assert!(selector.select(&query).unwrap().is_none());
    }

    #[test]
    fn test_filter_category() {
        let (selector, _) = selector_with(vec![
            NewContentItem::new("boat").with_category("marine"),
            NewContentItem::new("car").with_category("cars"),
        ]);

        let query = ContentQuery::new("all", Season::All).with_category(Some("cars".into()));
        assert_eq!(selector.select(&query).unwrap().unwrap().body, "car");

        let query = ContentQuery::new("all", Season::All).with_category(Some("drones".into()));
        assert!(selector.select(&query).unwrap().is_none());
    }

    #[test]
    fn test_inactive_never_selected() {
        let (selector, store) = selector_with(vec![NewContentItem::new("retired")]);
        let id = store.active_content().unwrap()[0].id.clone();
        store.set_content_active(&id, false).unwrap();

        assert!(selector.select(&ContentQuery::new("all", Season::Fall)).unwrap().is_none());
    }

    #[test]
    fn test_n_selections_cover_every_item_once() {
        let n = 6;
        let (selector, store) =
            selector_with((0..n).map(|i| NewContentItem::new(format!("item {i}"))).collect());
        let query = ContentQuery::new("all", Season::Spring);

        let mut seen = HashSet::new();
        let base = Utc::now();
        for step in 0..n {
            let item = selector.select(&query).unwrap().unwrap();
            assert!(seen.insert(item.id.clone()), "item selected twice");
            store
                .record_content_usage(&item.id, base + chrono::Duration::seconds(step as i64))
                .unwrap();
        }
        assert_eq!(seen.len(), n);
    }
}
