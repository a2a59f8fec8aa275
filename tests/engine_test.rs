//! End-to-end tests for the distribution engine over in-process channels

mod common;

use std::sync::Arc;

use chrono::Duration;
use serial_test::serial;

use common::{config_with, engine_with, seed_content, seed_image, spring_at, FakeBehavior, FakeChannel};
use promocast::config::ScheduleConfig;
use promocast::dispatch::SkipReason;
use promocast::engine::DistributionEngine;
use promocast::error::ErrorCategory;
use promocast::models::{ChannelIntegration, DeliveryStatus, NewContentItem, NewDeliveryRecord};
use promocast::scheduler::SchedulerError;
use promocast::storage::Repositories;

fn marketing(hours: &[u8]) -> ScheduleConfig {
    ScheduleConfig::new("marketing", hours.to_vec())
}

#[tokio::test]
async fn test_schedule_fires_once_per_hour() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10, 11])]), &[x.clone()]);
    seed_content(&repos, "Find the right part");

    let mut cycles = 0;
    let mut now = spring_at(9, 30);
    while now < spring_at(12, 30) {
        cycles += engine.tick_at(now).await.len();
        now += Duration::seconds(20);
    }

    assert_eq!(cycles, 2);
    assert_eq!(x.sent_count(), 2);
    assert_eq!(engine.get_history(10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_rotation_picks_least_recently_used() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10, 12])]), &[x.clone()]);
    let first = seed_content(&repos, "First offer");
    let second = seed_content(&repos, "Second offer");

    let cycle1 = engine.tick_at(spring_at(10, 0)).await;
    assert_eq!(cycle1[0].content_item_id.as_deref(), Some(first.as_str()));

    let item = repos.pool.get_content(&first).unwrap().unwrap();
    assert_eq!(item.usage_count, 1);
    assert_eq!(item.last_used_at, Some(spring_at(10, 0)));

    let cycle2 = engine.tick_at(spring_at(12, 0)).await;
    assert_eq!(cycle2[0].content_item_id.as_deref(), Some(second.as_str()));
}

#[tokio::test]
async fn test_image_required_channel_skipped_without_image() {
    let facebook = Arc::new(FakeChannel::new("facebook", 63_206));
    let instagram = Arc::new(FakeChannel::new("instagram", 2_200).requiring_image());
    let (engine, repos) = engine_with(
        config_with(vec![marketing(&[10])]),
        &[facebook.clone(), instagram.clone()],
    );
    seed_content(&repos, "No image today");

    let reports = engine.tick_at(spring_at(10, 0)).await;
    let dispatch = reports[0].dispatch.as_ref().unwrap();

    assert_eq!(dispatch.posted(), 1);
    assert_eq!(dispatch.skipped, vec![("instagram".to_string(), SkipReason::NoImage)]);
    assert_eq!(instagram.sent_count(), 0);

    let history = engine.get_history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].platform, "facebook");
}

#[tokio::test]
async fn test_image_url_and_category_table() {
    let instagram = Arc::new(FakeChannel::new("instagram", 2_200).requiring_image());
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10])]), &[instagram.clone()]);
    repos
        .pool
        .insert_content(&NewContentItem::new("Outboard season is here").with_category("marine"))
        .unwrap();
    seed_image(&repos, "brake_parts.png");
    seed_image(&repos, "boat_marine.png");

    let reports = engine.tick_at(spring_at(10, 0)).await;
    assert_eq!(reports[0].image_ref.as_deref(), Some("boat_marine.png"));

    let sent = instagram.sent.lock().unwrap();
    assert_eq!(
        sent[0].1.as_deref(),
        Some("https://garagebot.io/generated_images/boat_marine.png")
    );
}

#[tokio::test]
async fn test_long_message_truncated_per_channel() {
    let relay = Arc::new(FakeChannel::new("relay", 4000));
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10])]), &[relay.clone(), x.clone()]);
    seed_content(&repos, &"a".repeat(4500));

    engine.tick_at(spring_at(10, 0)).await;

    let relayed = relay.sent.lock().unwrap()[0].0.clone();
    assert_eq!(relayed.chars().count(), 4000);
    assert!(relayed.ends_with("..."));
    assert_eq!(&relayed[..3997], "a".repeat(3997));

    let tweeted = x.sent.lock().unwrap()[0].0.clone();
    assert_eq!(tweeted.chars().count(), 280);
}

#[tokio::test]
async fn test_failures_become_rows_and_do_not_stop_fanout() {
    let broken = Arc::new(FakeChannel::new("facebook", 63_206).behaving(FakeBehavior::Break));
    let refusing = Arc::new(FakeChannel::new("webhook", 4000).behaving(FakeBehavior::Refuse));
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(
        config_with(vec![marketing(&[10])]),
        &[broken, refusing, x.clone()],
    );
    let id = seed_content(&repos, "Still goes out");

    let reports = engine.tick_at(spring_at(10, 0)).await;
    assert_eq!(reports[0].outcome(), "posted");

    let history = engine.get_history(10).unwrap();
    let statuses: Vec<_> = history.iter().rev().map(|r| (r.platform.as_str(), r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            ("facebook", DeliveryStatus::Failed),
            ("webhook", DeliveryStatus::Failed),
            ("x", DeliveryStatus::Posted),
        ]
    );
    assert!(history[2].error.as_deref().unwrap().contains("connection reset"));

    // Usage counted once for the whole cycle
    assert_eq!(repos.pool.get_content(&id).unwrap().unwrap().usage_count, 1);
}

#[tokio::test]
async fn test_unconfigured_and_off_hours_channels_leave_no_rows() {
    let off = Arc::new(FakeChannel::new("facebook", 63_206).unconfigured());
    let evening = Arc::new(FakeChannel::new("x", 280).with_hours(vec![19, 20]));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10])]), &[off, evening.clone()]);
    let id = seed_content(&repos, "Quiet morning");

    let reports = engine.tick_at(spring_at(10, 0)).await;
    assert_eq!(reports[0].outcome(), "idle");
    assert!(engine.get_history(10).unwrap().is_empty());

    // Nothing was attempted, so the item keeps its place in the rotation
    assert_eq!(repos.pool.get_content(&id).unwrap().unwrap().usage_count, 0);
}

#[tokio::test]
async fn test_force_channels_ignores_posting_windows() {
    let evening = Arc::new(FakeChannel::new("x", 280).with_hours(vec![19, 20]));
    let forced = marketing(&[10]).with_force_channels(true);
    let (engine, repos) = engine_with(config_with(vec![forced]), &[evening.clone()]);
    seed_content(&repos, "Flash sale");

    engine.tick_at(spring_at(10, 0)).await;
    assert_eq!(evening.sent_count(), 1);
}

#[tokio::test]
async fn test_no_content_ends_cycle_without_rows() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let x_only = ScheduleConfig::new("x-only", vec![10]).with_platform("x");
    let (engine, repos) = engine_with(config_with(vec![x_only]), &[x.clone()]);
    repos
        .pool
        .insert_content(&NewContentItem::new("Facebook only").with_platform("facebook"))
        .unwrap();

    let reports = engine.tick_at(spring_at(10, 0)).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].outcome(), "no_content");
    assert_eq!(x.sent_count(), 0);
    assert!(engine.get_history(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_fire_runs_outside_hours_and_claims_marker() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10])]), &[x.clone()]);
    seed_content(&repos, "On demand");

    let report = engine.fire_at("marketing", spring_at(15, 5)).await.unwrap();
    assert_eq!(report.hour, 15);
    assert_eq!(x.sent_count(), 1);
    assert_eq!(engine.scheduler().marker("marketing").await, Some(15));

    // Firing at 10 blocks the regular 10:00 tick
    engine.fire_at("marketing", spring_at(10, 0)).await.unwrap();
    assert!(engine.tick_at(spring_at(10, 1)).await.is_empty());
    assert_eq!(x.sent_count(), 2);
}

#[tokio::test]
async fn test_fire_unknown_schedule() {
    let (engine, _) = engine_with(config_with(vec![marketing(&[10])]), &[]);

    let err = engine.fire("nightly").await.unwrap_err();
    match err {
        SchedulerError::UnknownSchedule { name, valid_options } => {
            assert_eq!(name, "nightly");
            assert_eq!(valid_options, vec!["marketing".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_config_is_config_error() {
    let config = config_with(vec![ScheduleConfig::new("late", vec![24])]);
    let err = DistributionEngine::with_registry(config, Repositories::memory(), Default::default())
        .err()
        .unwrap();

    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(!err.is_recoverable());
    assert!(err.to_string().contains("late"));
}

#[tokio::test]
async fn test_insights_refresh_feeds_analytics() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10])]), &[x]);
    let id = seed_content(&repos, "Measure me");

    engine.tick_at(spring_at(10, 0)).await;
    let report = engine.refresh_insights().await.unwrap();
    assert_eq!(report.updated, 1);

    let top = engine.analytics().top_content(10).unwrap();
    assert_eq!(top[0].content_item_id, id);
    assert_eq!(top[0].performance.engagement, 4);

    let hourly = engine.analytics().hourly_engagement().unwrap();
    assert_eq!(hourly[0].hour, 10);
}

#[tokio::test]
async fn test_insights_refresh_covers_every_posted_row() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(config_with(vec![marketing(&[10])]), &[x]);
    let page = engine.config().engine.insights_page_size;
    let total = page + 50;

    let at = spring_at(10, 0);
    for i in 0..total {
        repos
            .ledger
            .append(&NewDeliveryRecord::posted("x", "archived post", Some(format!("x-{i}"))), at)
            .unwrap();
    }

    let report = engine.refresh_insights().await.unwrap();
    assert_eq!(report.updated, total);
    assert_eq!(report.errors, 0);

    let stale = repos
        .ledger
        .all_records()
        .unwrap()
        .into_iter()
        .filter(|r| r.metrics_updated_at.is_none())
        .count();
    assert_eq!(stale, 0);
}

#[tokio::test]
async fn test_stats() {
    let x = Arc::new(FakeChannel::new("x", 280));
    let (engine, repos) = engine_with(
        config_with(vec![marketing(&[20, 8]), ScheduleConfig::new("late", vec![22])]),
        &[x],
    );
    seed_content(&repos, "one");
    seed_image(&repos, "brake_parts.png");
    engine.tick_at(spring_at(8, 0)).await;

    let stats = tokio_test::assert_ok!(engine.get_stats());
    assert_eq!(stats.active_content, 1);
    assert_eq!(stats.active_images, 1);
    assert_eq!(stats.total_posted, 1);
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.schedules["marketing"], vec![8, 20]);
    assert_eq!(stats.schedules["late"], vec![22]);
    assert_eq!(stats.channels[0].platform, "x");
    assert_eq!(stats.channels[0].settings["platform"], "x");
    assert!(stats.image_categories.contains(&"cars".to_string()));
    assert!(stats.image_categories.windows(2).all(|w| w[0] < w[1]));
    assert!(!stats.running);
}

#[tokio::test]
#[serial]
async fn test_start_twice_spawns_one_set_of_loops() {
    let (engine, _) = engine_with(config_with(vec![marketing(&[10])]), &[]);

    assert!(engine.start());
    assert!(!engine.start());
    assert_eq!(engine.task_count(), 3);
    assert!(engine.is_running());

    engine.stop().await;
    assert_eq!(engine.task_count(), 0);
    assert!(!engine.is_running());

    // A stopped engine can be started again
    assert!(engine.start());
    assert_eq!(engine.task_count(), 3);
    engine.stop().await;
}

#[tokio::test]
#[serial]
async fn test_stop_lets_cycle_in_flight_finish() {
    let x = Arc::new(FakeChannel::new("x", 280).with_delay(std::time::Duration::from_millis(300)));
    let every_hour: Vec<u8> = (0..24).collect();
    let (engine, repos) = engine_with(config_with(vec![marketing(&every_hour)]), &[x.clone()]);
    let id = seed_content(&repos, "Slow platform");

    assert!(engine.start());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    engine.stop().await;

    assert_eq!(x.sent_count(), 1);
    let history = engine.get_history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, DeliveryStatus::Posted);
    assert_eq!(repos.pool.get_content(&id).unwrap().unwrap().usage_count, 1);
    assert_eq!(engine.task_count(), 0);
}

#[test]
#[serial]
fn test_bootstrap_merges_environment_credentials() {
    let repos = Repositories::memory();
    let mut stored = ChannelIntegration::for_tenant("garagebot");
    stored.x_access_token = Some("stored-x".to_string());
    repos.integrations.upsert_integration(&stored).unwrap();

    std::env::set_var("FACEBOOK_PAGE_ID", "page-1");
    std::env::set_var("FACEBOOK_PAGE_ACCESS_TOKEN", "page-token");
    std::env::remove_var("INSTAGRAM_ACCOUNT_ID");
    std::env::remove_var("X_ACCESS_TOKEN");

    let engine = DistributionEngine::new(config_with(vec![marketing(&[10])]), repos.clone()).unwrap();
    let merged = engine.bootstrap_integration().unwrap();

    std::env::remove_var("FACEBOOK_PAGE_ID");
    std::env::remove_var("FACEBOOK_PAGE_ACCESS_TOKEN");

    assert_eq!(merged.facebook_page_id.as_deref(), Some("page-1"));
    assert_eq!(merged.x_access_token.as_deref(), Some("stored-x"));
    assert!(merged.facebook_connected);
    assert!(merged.x_connected);
    assert!(!merged.instagram_connected);

    let row = repos.integrations.get_integration("garagebot").unwrap().unwrap();
    assert_eq!(row, merged);

    // Adapters read the refreshed credentials
    let stats = engine.get_stats().unwrap();
    let facebook = stats.channels.iter().find(|c| c.platform == "facebook").unwrap();
    assert!(facebook.configured);
    let instagram = stats.channels.iter().find(|c| c.platform == "instagram").unwrap();
    assert!(!instagram.configured);
}

#[tokio::test]
async fn test_ledger_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("promocast.db");

    {
        let repos = Repositories::sqlite(&db).unwrap();
        seed_content(&repos, "Persist me");
        let registry = promocast::channels::ChannelRegistry::new().with(Arc::new(FakeChannel::new("x", 280)));
        let engine = DistributionEngine::with_registry(config_with(vec![marketing(&[10])]), repos, registry).unwrap();
        engine.tick_at(spring_at(10, 0)).await;
    }

    let repos = Repositories::sqlite(&db).unwrap();
    let engine = DistributionEngine::with_registry(
        config_with(vec![marketing(&[10])]),
        repos.clone(),
        promocast::channels::ChannelRegistry::new(),
    )
    .unwrap();

    let history = engine.get_history(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].external_id.as_deref(), Some("x-1"));
    assert_eq!(repos.pool.active_content().unwrap()[0].usage_count, 1);

    // Markers are not persisted: the same hour fires again after a restart
    assert_eq!(engine.tick_at(spring_at(10, 30)).await.len(), 1);
}
