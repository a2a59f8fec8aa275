//! Distribution engine
//!
//! Owns the scheduler state and every pipeline stage, and runs the three
//! periodic loops:
//!
//! ```text
//! ┌──────────────┐   due schedules   ┌───────────┐   ┌───────────┐   ┌────────────┐
//! │  tick loop   │ ────────────────► │ selectors │──►│ composer  │──►│ dispatcher │──► ledger
//! └──────────────┘                   └───────────┘   └───────────┘   └────────────┘
//! ┌──────────────┐                                                        ▲
//! │insights loop │ ───────────────────────────────────────────────────────┘ (counters)
//! └──────────────┘
//! ┌──────────────┐
//! │ housekeeping │ ──► channel_integrations upsert ──► shared credentials
//! └──────────────┘
//! ```
//!
//! A cycle error is logged at the tick boundary and never reaches the loop.
//! Shutdown is observed between ticks, so a cycle that has started always
//! finishes and records its ledger rows.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::analytics::AnalyticsAggregator;
use crate::channels::{ChannelRegistry, SharedCredentials};
use crate::composer::{self, MessageComposer, SiteDirectory};
use crate::config::{Config, ScheduleConfig};
use crate::dispatch::{Dispatch, DispatchReport, PlatformDispatcher};
use crate::error::{Error, Result};
use crate::insights::{InsightsCollector, RefreshReport};
use crate::ledger::DeliveryLedger;
use crate::metrics;
use crate::models::{ChannelIntegration, DeliveryRecord};
use crate::scheduler::{SchedulerError, SchedulerResult, SchedulerState};
use crate::selection::{CategoryImageMap, ContentQuery, ContentSelector, ImageSelector};
use crate::storage::Repositories;

/// Environment variables read by the integration bootstrap
pub const ENV_FACEBOOK_PAGE_ID: &str = "FACEBOOK_PAGE_ID";
pub const ENV_FACEBOOK_PAGE_ACCESS_TOKEN: &str = "FACEBOOK_PAGE_ACCESS_TOKEN";
pub const ENV_INSTAGRAM_ACCOUNT_ID: &str = "INSTAGRAM_ACCOUNT_ID";
pub const ENV_X_ACCESS_TOKEN: &str = "X_ACCESS_TOKEN";

/// Credentials present in the environment, unset or empty values left out
pub fn integration_from_env(tenant_id: &str) -> ChannelIntegration {
    let read = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    ChannelIntegration {
        facebook_page_id: read(ENV_FACEBOOK_PAGE_ID),
        facebook_page_access_token: read(ENV_FACEBOOK_PAGE_ACCESS_TOKEN),
        instagram_account_id: read(ENV_INSTAGRAM_ACCOUNT_ID),
        x_access_token: read(ENV_X_ACCESS_TOKEN),
        ..ChannelIntegration::for_tenant(tenant_id)
    }
}

// ============================================================================
// Reports
// ============================================================================

/// What one distribution cycle did
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub schedule: String,
    /// Hour of the reference day the cycle ran for
    pub hour: u8,
    pub content_item_id: Option<String>,
    pub image_ref: Option<String>,
    /// None when no content was available
    pub dispatch: Option<DispatchReport>,
}

impl CycleReport {
    /// Short label used for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match &self.dispatch {
            None => "no_content",
            Some(report) if report.attempts == 0 => "idle",
            Some(report) if report.posted() > 0 => "posted",
            Some(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub platform: String,
    pub configured: bool,
    pub max_chars: usize,
    pub requires_image: bool,
    /// Adapter settings with credentials redacted
    pub settings: serde_json::Value,
}

/// Snapshot returned by [`DistributionEngine::get_stats`]
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub active_content: usize,
    pub active_images: usize,
    pub total_posted: usize,
    pub total_failed: usize,
    /// Schedule name → hours of the reference day
    pub schedules: BTreeMap<String, Vec<u8>>,
    pub channels: Vec<ChannelStatus>,
    /// Categories with a dedicated image set
    pub image_categories: Vec<String>,
    pub running: bool,
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner {
    config: Config,
    repos: Repositories,
    credentials: SharedCredentials,
    scheduler: SchedulerState,
    content: ContentSelector,
    images: ImageSelector,
    composer: MessageComposer,
    dispatcher: PlatformDispatcher,
    ledger: DeliveryLedger,
    insights: InsightsCollector,
    analytics: AnalyticsAggregator,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

/// Scheduled multi-platform distribution engine
///
/// Cloning is cheap; every clone drives the same state.
#[derive(Clone)]
pub struct DistributionEngine {
    inner: Arc<EngineInner>,
}

impl DistributionEngine {
    /// Build an engine with the adapters described by `config.channels`
    ///
    /// Credentials start from the stored integration row of the tenant.
    pub fn new(config: Config, repos: Repositories) -> Result<Self> {
        let credentials = load_credentials(&repos, &config.engine.tenant_id)?;
        let registry = ChannelRegistry::from_config(&config.channels, credentials.clone())?;
        Self::build(config, repos, registry, credentials)
    }

    /// Build an engine around an explicit adapter registry
    pub fn with_registry(config: Config, repos: Repositories, registry: ChannelRegistry) -> Result<Self> {
        let credentials = load_credentials(&repos, &config.engine.tenant_id)?;
        Self::build(config, repos, registry, credentials)
    }

    fn build(
        config: Config,
        repos: Repositories,
        registry: ChannelRegistry,
        credentials: SharedCredentials,
    ) -> Result<Self> {
        config.validate().map_err(Error::config)?;
        let offset = config.reference_offset().map_err(Error::config)?;
        let scheduler = SchedulerState::new(config.schedules.clone(), offset)?;

        let ledger = DeliveryLedger::new(repos.ledger.clone());
        let sites = SiteDirectory::new(config.engine.default_site.clone()).with_overrides(&config.sites);
        let table = CategoryImageMap::default().with_overrides(&config.image_categories);

        let inner = EngineInner {
            content: ContentSelector::new(repos.pool.clone()),
            images: ImageSelector::new(repos.pool.clone(), table),
            composer: MessageComposer::new(sites),
            dispatcher: PlatformDispatcher::new(registry.clone(), ledger.clone(), repos.pool.clone()),
            insights: InsightsCollector::new(registry, ledger.clone(), config.engine.insights_page_size),
            analytics: AnalyticsAggregator::new(ledger.clone(), offset),
            ledger,
            scheduler,
            credentials,
            repos,
            config,
            tasks: Mutex::new(Vec::new()),
            shutdown: watch::channel(false).0,
        };

        tracing::info!(
            schedules = inner.scheduler.schedules().len(),
            channels = ?inner.dispatcher.registry().platforms(),
            offset = %offset,
            "Distribution engine created"
        );

        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.inner.repos
    }

    pub fn scheduler(&self) -> &SchedulerState {
        &self.inner.scheduler
    }

    pub fn analytics(&self) -> &AnalyticsAggregator {
        &self.inner.analytics
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler.is_started()
    }

    /// Number of live background loops
    pub fn task_count(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Spawn the tick, insights and housekeeping loops
    ///
    /// Returns false, spawning nothing, when the engine is already running.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> bool {
        if !self.inner.scheduler.try_start() {
            tracing::debug!("Engine already started");
            return false;
        }

        self.inner.shutdown.send_replace(false);

        let config = &self.inner.config;
        let handles = vec![
            self.spawn_loop("tick", config.tick_interval(), true, |engine| async move {
                engine.tick().await;
            }),
            self.spawn_loop("insights", config.insights_interval(), false, |engine| async move {
                if let Err(e) = engine.refresh_insights().await {
                    tracing::error!(
                        category = e.category().as_str(),
                        recoverable = e.is_recoverable(),
                        error = %e,
                        "Insights refresh failed"
                    );
                }
            }),
            self.spawn_loop("housekeeping", config.housekeeping_interval(), true, |engine| async move {
                if let Err(e) = engine.bootstrap_integration() {
                    tracing::error!(
                        category = e.category().as_str(),
                        recoverable = e.is_recoverable(),
                        error = %e,
                        "Integration bootstrap failed"
                    );
                }
            }),
        ];

        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(handles);

        metrics::set_engine_running(true);
        tracing::info!(
            tick_secs = config.engine.tick_interval_secs,
            insights_secs = config.engine.insights_interval_secs,
            housekeeping_secs = config.engine.housekeeping_interval_secs,
            "Engine started"
        );
        true
    }

    /// Signal the background loops to exit and wait for them
    ///
    /// A cycle in flight runs to completion first.
    pub async fn stop(&self) {
        self.inner.shutdown.send_replace(true);

        let handles: Vec<JoinHandle<()>> = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.inner.scheduler.mark_stopped();
        metrics::set_engine_running(false);
        tracing::info!("Engine stopped");
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, immediate: bool, job: F) -> JoinHandle<()>
    where
        F: Fn(DistributionEngine) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let engine = self.clone();
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let first = if immediate {
                tokio::time::Instant::now()
            } else {
                tokio::time::Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::debug!(task = name, period_secs = period.as_secs(), "Loop started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        tracing::debug!(task = name, "Loop shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        job(engine.clone()).await;
                    }
                }
            }
        })
    }

    // ------------------------------------------------------------------------
    // Trigger
    // ------------------------------------------------------------------------

    /// Run every schedule due now
    pub async fn tick(&self) -> Vec<CycleReport> {
        self.tick_at(Utc::now()).await
    }

    /// Run every schedule due at `now`
    ///
    /// Failed cycles are logged and left out of the result.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<CycleReport> {
        let due = self.inner.scheduler.due_at(now).await;
        let mut reports = Vec::with_capacity(due.len());

        for schedule in due {
            match self.run_cycle(schedule, now).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    metrics::record_cycle(&schedule.name, "error", 0.0);
                    tracing::error!(schedule = %schedule.name, error = %e, "Cycle failed");
                }
            }
        }

        reports
    }

    /// Run one schedule now, whatever its hour set
    ///
    /// The schedule's marker is set to the current hour, so the next tick in
    /// this hour does not fire it again.
    pub async fn fire(&self, name: &str) -> SchedulerResult<CycleReport> {
        self.fire_at(name, Utc::now()).await
    }

    pub async fn fire_at(&self, name: &str, now: DateTime<Utc>) -> SchedulerResult<CycleReport> {
        let scheduler = &self.inner.scheduler;
        let schedule = scheduler.find(name)?;
        scheduler.claim(name, scheduler.hour_at(now)).await;
        self.run_cycle(schedule, now).await
    }

    /// Select, compose and dispatch once for `schedule`
    async fn run_cycle(&self, schedule: &ScheduleConfig, now: DateTime<Utc>) -> SchedulerResult<CycleReport> {
        let started = Instant::now();
        let inner = &*self.inner;
        let local = now.with_timezone(&inner.scheduler.offset());
        let hour = inner.scheduler.hour_at(now);

        tracing::info!(schedule = %schedule.name, hour, "Cycle started");

        let query = ContentQuery::at(schedule.platform.clone(), &local).with_category(schedule.category.clone());
        let item = inner
            .content
            .select(&query)
            .map_err(|e| SchedulerError::storage("select content", format!("{e:#}")))?;

        let Some(item) = item else {
            tracing::warn!(
                schedule = %schedule.name,
                platform = %query.platform,
                season = %query.season,
                "No content available"
            );
            let report = CycleReport {
                schedule: schedule.name.clone(),
                hour,
                content_item_id: None,
                image_ref: None,
                dispatch: None,
            };
            metrics::record_cycle(&schedule.name, report.outcome(), started.elapsed().as_secs_f64());
            return Ok(report);
        };

        let image = match inner.images.select(item.category.as_deref()) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(schedule = %schedule.name, error = %e, "Image selection failed, continuing without image");
                None
            }
        };

        let text = inner.composer.compose(&item);
        let image_url = image
            .as_ref()
            .map(|img| composer::image_url(&inner.config.engine.base_url, &img.file_path));

        let mut job = Dispatch::new(&text, hour, now);
        job.image_url = image_url.as_deref();
        job.image_ref = image.as_ref().map(|img| img.filename.as_str());
        job.image_id = image.as_ref().map(|img| img.id.as_str());
        job.content_id = Some(item.id.as_str());
        job.schedule = Some(schedule.name.as_str());
        job.force_channels = schedule.force_channels;

        let dispatch = inner.dispatcher.dispatch(&job).await;

        let report = CycleReport {
            schedule: schedule.name.clone(),
            hour,
            content_item_id: Some(item.id.clone()),
            image_ref: image.map(|img| img.filename),
            dispatch: Some(dispatch),
        };

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_cycle(&schedule.name, report.outcome(), elapsed);
        tracing::info!(
            schedule = %schedule.name,
            content_id = %item.id,
            outcome = report.outcome(),
            elapsed_ms = (elapsed * 1000.0) as u64,
            "Cycle complete"
        );

        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Insights and housekeeping
    // ------------------------------------------------------------------------

    pub async fn refresh_insights(&self) -> Result<RefreshReport> {
        self.inner.insights.refresh().await.map_err(Error::storage)
    }

    /// Merge environment credentials into the tenant's integration row
    ///
    /// Only variables that are set replace stored values. The merged row is
    /// written back and becomes the adapters' credentials.
    pub fn bootstrap_integration(&self) -> Result<ChannelIntegration> {
        let inner = &*self.inner;
        let tenant = inner.config.engine.tenant_id.as_str();

        let mut integration = inner
            .repos
            .integrations
            .get_integration(tenant)
            .context("Failed to load channel integration")
            .map_err(Error::storage)?
            .unwrap_or_else(|| ChannelIntegration::for_tenant(tenant));

        integration.merge(&integration_from_env(tenant));
        integration.updated_at = Some(Utc::now());

        inner
            .repos
            .integrations
            .upsert_integration(&integration)
            .context("Failed to store channel integration")
            .map_err(Error::storage)?;

        *inner.credentials.write().unwrap_or_else(PoisonError::into_inner) = integration.clone();

        tracing::info!(
            tenant = %tenant,
            facebook = integration.facebook_connected,
            instagram = integration.instagram_connected,
            x = integration.x_connected,
            "Channel integration bootstrapped"
        );
        Ok(integration)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Newest ledger rows first
    pub fn get_history(&self, limit: usize) -> Result<Vec<DeliveryRecord>> {
        self.inner.ledger.history(limit).map_err(Error::storage)
    }

    pub fn get_stats(&self) -> Result<EngineStats> {
        let inner = &*self.inner;
        let totals = inner.ledger.totals().map_err(Error::storage)?;

        let channels = inner
            .dispatcher
            .registry()
            .iter()
            .map(|adapter| {
                let caps = adapter.capabilities();
                ChannelStatus {
                    platform: adapter.platform().to_string(),
                    configured: adapter.is_configured(),
                    max_chars: caps.max_chars,
                    requires_image: caps.requires_image,
                    settings: adapter.config(),
                }
            })
            .collect();

        Ok(EngineStats {
            active_content: inner.repos.pool.count_active_content().map_err(Error::storage)?,
            active_images: inner.repos.pool.count_active_images().map_err(Error::storage)?,
            total_posted: totals.posted,
            total_failed: totals.failed,
            schedules: inner.scheduler.hour_sets(),
            channels,
            image_categories: inner.images.table().categories().map(String::from).collect(),
            running: inner.scheduler.is_started(),
        })
    }
}

fn load_credentials(repos: &Repositories, tenant_id: &str) -> Result<SharedCredentials> {
    let mut integration = repos
        .integrations
        .get_integration(tenant_id)
        .context("Failed to load channel integration")
        .map_err(Error::storage)?
        .unwrap_or_else(|| ChannelIntegration::for_tenant(tenant_id));
    integration.refresh_flags();
    Ok(Arc::new(RwLock::new(integration)))
}
