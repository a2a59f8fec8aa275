use std::path::Path;

use anyhow::{Context, Result};

use promocast::api::ApiServer;
use promocast::engine::CycleReport;
use promocast::metrics;

use super::open_engine;

/// Start the engine loops, optionally with the read API, until Ctrl-C
pub async fn run(config_path: Option<&Path>, serve: bool) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registry unavailable");
    }

    let engine = open_engine(config_path)?;

    println!("Starting promocast engine");
    println!("=========================");
    for (name, hours) in engine.scheduler().hour_sets() {
        println!("Schedule {name}: {hours:?}");
    }

    engine.start();

    if serve {
        let server = ApiServer::new(engine.config().server.clone(), engine.clone());
        println!("Read API: http://{}", server.bind_address());

        server
            .serve_with_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
            })
            .await
            .context("Read API failed")?;
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
    }

    println!("\nShutdown signal received, stopping...");
    engine.stop().await;
    Ok(())
}

/// Run one schedule's cycle now
pub async fn tick(config_path: Option<&Path>, schedule: &str) -> Result<()> {
    let engine = open_engine(config_path)?;
    engine.bootstrap_integration()?;

    let report = engine.fire(schedule).await?;
    print_cycle(&report);
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    println!("Cycle: {} (hour {})", report.schedule, report.hour);
    println!("Outcome: {}", report.outcome());

    let Some(dispatch) = &report.dispatch else {
        println!("No content available");
        return;
    };

    if let Some(id) = &report.content_item_id {
        println!("Content: {id}");
    }
    println!("Image: {}", report.image_ref.as_deref().unwrap_or("-"));
    println!();

    for record in &dispatch.records {
        match &record.error {
            Some(error) => println!("  {:<12} {:<7} {error}", record.platform, record.status.as_str()),
            None => println!(
                "  {:<12} {:<7} {}",
                record.platform,
                record.status.as_str(),
                record.external_id.as_deref().unwrap_or("-")
            ),
        }
    }
    for (platform, reason) in &dispatch.skipped {
        println!("  {:<12} skipped {}", platform, reason.as_str());
    }
}
