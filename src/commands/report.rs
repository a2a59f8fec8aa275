use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;

use promocast::analytics::Performance;

use super::open_engine;

/// Analytics query selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalyticsView {
    /// Totals by delivery status
    Status,
    /// Top content items by engagement
    Content,
    /// Top images by engagement
    Images,
    /// Top content and image pairs by engagement
    Combos,
    /// Average engagement by posting hour
    Hourly,
}

/// Print the newest ledger rows
pub async fn history(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let engine = open_engine(config_path)?;
    let rows = engine.get_history(limit)?;

    println!("Delivery History ({} rows)", rows.len());
    println!("================");

    for row in rows {
        let when = row.posted_at.unwrap_or(row.created_at);
        let detail = row
            .error
            .as_deref()
            .or(row.external_id.as_deref())
            .unwrap_or("-");
        println!(
            "{}  {:<12} {:<7} {:<5} {}",
            when.format("%Y-%m-%d %H:%M"),
            row.platform,
            row.status.as_str(),
            row.metrics.engagement_score(),
            detail
        );
    }
    Ok(())
}

/// Print pool, ledger and schedule statistics
pub async fn stats(config_path: Option<&Path>) -> Result<()> {
    let engine = open_engine(config_path)?;
    let stats = engine.get_stats()?;

    println!("Engine Statistics");
    println!("=================");
    println!("Active content: {}", stats.active_content);
    println!("Active images: {}", stats.active_images);
    println!("Posted: {}", stats.total_posted);
    println!("Failed: {}", stats.total_failed);

    println!("\nSchedules");
    println!("---------");
    for (name, hours) in &stats.schedules {
        println!("{name}: {hours:?}");
    }

    println!("\nChannels");
    println!("--------");
    for channel in &stats.channels {
        println!(
            "{:<12} {:<14} max {} chars{}",
            channel.platform,
            if channel.configured { "configured" } else { "not configured" },
            channel.max_chars,
            if channel.requires_image { ", image required" } else { "" }
        );
    }
    Ok(())
}

/// Print one analytics view
pub async fn analytics(config_path: Option<&Path>, view: AnalyticsView, limit: usize) -> Result<()> {
    let engine = open_engine(config_path)?;
    let analytics = engine.analytics();

    match view {
        AnalyticsView::Status => {
            let totals = analytics.status_totals()?;
            println!("Posted: {}", totals.posted);
            println!("Failed: {}", totals.failed);
            println!("Total: {}", totals.total);
        }
        AnalyticsView::Content => {
            for entry in analytics.top_content(limit)? {
                print_performance(&entry.content_item_id, &entry.performance);
            }
        }
        AnalyticsView::Images => {
            for entry in analytics.top_images(limit)? {
                print_performance(&entry.image_ref, &entry.performance);
            }
        }
        AnalyticsView::Combos => {
            for entry in analytics.top_combinations(limit)? {
                let label = format!("{} + {}", entry.content_item_id, entry.image_ref);
                print_performance(&label, &entry.performance);
            }
        }
        AnalyticsView::Hourly => {
            for bucket in analytics.hourly_engagement()? {
                println!(
                    "{:02}:00  posts {:<4} engagement {:<6} avg {:.2}",
                    bucket.hour, bucket.posts, bucket.total_engagement, bucket.average_engagement
                );
            }
        }
    }
    Ok(())
}

fn print_performance(label: &str, p: &Performance) {
    println!(
        "{label:<48} posts {:<4} engagement {:<6} impressions {}",
        p.posts, p.engagement, p.impressions
    );
}
