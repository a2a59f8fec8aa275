//! Prometheus metrics for promocast
//!
//! This module provides metrics tracking for:
//! - Dispatch: deliveries by platform and status, silent skips by reason
//! - Trigger Engine: cycles by schedule and outcome
//! - Insights: refresh outcomes by platform
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all engine metrics
struct EngineMetrics {
    deliveries: CounterVec,
    skips: CounterVec,
    cycles: CounterVec,
    cycle_duration: HistogramVec,
    insights: CounterVec,
    engine_running: Gauge,
}

/// Global storage for engine metrics
static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, subsequent metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = promocast::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
///     // Application can continue without metrics
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = EngineMetrics {
        deliveries: register_counter_vec!(
            "promocast_deliveries_total",
            "Ledger rows written by platform and status",
            &["platform", "status"]
        )?,
        skips: register_counter_vec!(
            "promocast_dispatch_skips_total",
            "Adapters skipped without a ledger row, by platform and reason",
            &["platform", "reason"]
        )?,
        cycles: register_counter_vec!(
            "promocast_cycles_total",
            "Distribution cycles by schedule and outcome",
            &["schedule", "outcome"]
        )?,
        cycle_duration: register_histogram_vec!(
            "promocast_cycle_duration_seconds",
            "Distribution cycle duration in seconds",
            &["schedule"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
        )?,
        insights: register_counter_vec!(
            "promocast_insights_refresh_total",
            "Insights refresh results by platform and outcome",
            &["platform", "outcome"]
        )?,
        engine_running: register_gauge!(
            "promocast_engine_running",
            "Whether the engine loops are running (1 = yes, 0 = no)"
        )?,
    };

    ENGINE_METRICS
        .set(metrics)
        .map_err(|_| "Engine metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    ENGINE_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record a ledger row
pub fn record_delivery(platform: &str, status: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.deliveries.with_label_values(&[platform, status]).inc();
    }
}

/// Record an adapter skipped by the dispatcher
pub fn record_skip(platform: &str, reason: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.skips.with_label_values(&[platform, reason]).inc();
    }
}

/// Record a finished cycle
pub fn record_cycle(schedule: &str, outcome: &str, duration_secs: f64) {
    let Some(m) = ENGINE_METRICS.get() else {
        return;
    };

    m.cycles.with_label_values(&[schedule, outcome]).inc();
    m.cycle_duration
        .with_label_values(&[schedule])
        .observe(duration_secs);
}

/// Record one insights refresh result
pub fn record_insights(platform: &str, outcome: &str) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.insights.with_label_values(&[platform, outcome]).inc();
    }
}

/// Update the running flag
pub fn set_engine_running(running: bool) {
    if let Some(m) = ENGINE_METRICS.get() {
        m.engine_running.set(if running { 1.0 } else { 0.0 });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // Idempotent
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_delivery("x", "posted");
        let text = encode_metrics().unwrap();
        assert!(text.contains("promocast_deliveries_total"));
    }

    #[test]
    fn test_recording_does_not_panic() {
        ensure_metrics_initialized();
        record_skip("instagram", "no_image");
        record_cycle("marketing", "completed", 0.42);
        record_insights("facebook", "updated");
        set_engine_running(true);
        set_engine_running(false);
    }
}
