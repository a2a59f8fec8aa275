//! REST handlers for the read API

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::analytics::DEFAULT_TOP_LIMIT;
use crate::error::{Error, ErrorCategory};
use crate::ledger::DEFAULT_HISTORY_LIMIT;
use crate::metrics;

use super::server::AppState;

/// Upper bound on any `limit` query parameter
pub const MAX_LIMIT: usize = 1000;

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub engine_running: bool,
}

/// `?limit=` query
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_LIMIT)
    }
}

/// HTTP status for a failed read
pub fn status_for(category: ErrorCategory) -> StatusCode {
    match category {
        ErrorCategory::Storage => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCategory::Network | ErrorCategory::Platform => StatusCode::BAD_GATEWAY,
        ErrorCategory::Scheduler => StatusCode::NOT_FOUND,
        ErrorCategory::Config => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wrap an engine read into a JSON response
fn respond<T: Serialize>(result: crate::error::Result<T>, what: &str) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))).into_response(),
        Err(e) => {
            let category = e.category();
            tracing::error!(category = category.as_str(), error = %e, "Failed to read {what}");
            (
                status_for(category),
                Json(ApiResponse::<()>::error(format!("Failed to read {what}"))),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/history", get(get_history))
        .route("/api/stats", get(get_stats))
        .route("/api/analytics/status", get(analytics_status))
        .route("/api/analytics/top-content", get(analytics_top_content))
        .route("/api/analytics/top-images", get(analytics_top_images))
        .route("/api/analytics/top-combinations", get(analytics_top_combinations))
        .route("/api/analytics/hourly", get(analytics_hourly))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        engine_running: state.engine.is_running(),
    }))
}

/// Newest ledger rows first
async fn get_history(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let limit = query.resolve(DEFAULT_HISTORY_LIMIT);
    respond(state.engine.get_history(limit), "history")
}

async fn get_stats(State(state): State<AppState>) -> Response {
    respond(state.engine.get_stats(), "stats")
}

async fn analytics_status(State(state): State<AppState>) -> Response {
    respond(state.engine.analytics().status_totals().map_err(Error::storage), "status totals")
}

async fn analytics_top_content(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let limit = query.resolve(DEFAULT_TOP_LIMIT);
    respond(state.engine.analytics().top_content(limit).map_err(Error::storage), "top content")
}

async fn analytics_top_images(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let limit = query.resolve(DEFAULT_TOP_LIMIT);
    respond(state.engine.analytics().top_images(limit).map_err(Error::storage), "top images")
}

async fn analytics_top_combinations(State(state): State<AppState>, Query(query): Query<LimitQuery>) -> Response {
    let limit = query.resolve(DEFAULT_TOP_LIMIT);
    respond(state.engine.analytics().top_combinations(limit).map_err(Error::storage), "top combinations")
}

async fn analytics_hourly(State(state): State<AppState>) -> Response {
    respond(state.engine.analytics().hourly_engagement().map_err(Error::storage), "hourly engagement")
}

/// Prometheus text exposition
async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
