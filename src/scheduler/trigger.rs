//! Hour-gated schedule triggers
//!
//! Each tick reads the hour of the reference timezone. A schedule is due when
//! that hour is in its hour set and differs from the last hour it fired for.
//! Markers live in memory only, so a restart may fire a schedule once more
//! within the same hour.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use tokio::sync::Mutex;

use super::error::{SchedulerError, SchedulerResult};
use crate::config::ScheduleConfig;

/// Scheduler state owned by the engine
///
/// Holds the configured schedules, their last-processed-hour markers and the
/// started flag of the engine loops.
pub struct SchedulerState {
    schedules: Vec<ScheduleConfig>,
    offset: FixedOffset,
    markers: Mutex<HashMap<String, u8>>,
    started: AtomicBool,
}

impl SchedulerState {
    /// Validate schedules and create empty state
    pub fn new(schedules: Vec<ScheduleConfig>, offset: FixedOffset) -> SchedulerResult<Self> {
        let mut seen = HashSet::new();

        for schedule in &schedules {
            if schedule.name.trim().is_empty() {
                return Err(SchedulerError::trigger_config("name", "Schedule name cannot be empty"));
            }
            if !seen.insert(schedule.name.as_str()) {
                return Err(SchedulerError::trigger_config(
                    "name",
                    format!("Duplicate schedule '{}'", schedule.name),
                ));
            }
            if let Some(bad) = schedule.hours.iter().find(|h| **h > 23) {
                return Err(SchedulerError::invalid_hour(u32::from(*bad)));
            }
        }

        Ok(Self {
            schedules,
            offset,
            markers: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        })
    }

    pub fn schedules(&self) -> &[ScheduleConfig] {
        &self.schedules
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Hour of the reference day at `now`
    pub fn hour_at(&self, now: DateTime<Utc>) -> u8 {
        now.with_timezone(&self.offset).hour() as u8
    }

    /// Look up a schedule by name
    pub fn find(&self, name: &str) -> SchedulerResult<&ScheduleConfig> {
        self.schedules.iter().find(|s| s.name == name).ok_or_else(|| {
            SchedulerError::unknown_schedule(
                name,
                self.schedules.iter().map(|s| s.name.clone()).collect(),
            )
        })
    }

    /// Schedules due at `now`; their markers are set before returning
    pub async fn due_at(&self, now: DateTime<Utc>) -> Vec<&ScheduleConfig> {
        let hour = self.hour_at(now);
        let mut markers = self.markers.lock().await;

        self.schedules
            .iter()
            .filter(|schedule| schedule.hours.contains(&hour))
            .filter(|schedule| {
                if markers.get(&schedule.name) == Some(&hour) {
                    return false;
                }
                markers.insert(schedule.name.clone(), hour);
                true
            })
            .collect()
    }

    /// Record that `name` ran for `hour` outside the hour gate
    pub async fn claim(&self, name: &str, hour: u8) {
        self.markers.lock().await.insert(name.to_string(), hour);
    }

    /// Last hour a schedule fired for
    pub async fn marker(&self, name: &str) -> Option<u8> {
        self.markers.lock().await.get(name).copied()
    }

    /// Schedule name → sorted hour set
    pub fn hour_sets(&self) -> BTreeMap<String, Vec<u8>> {
        self.schedules
            .iter()
            .map(|s| {
                let mut hours = s.hours.clone();
                hours.sort_unstable();
                hours.dedup();
                (s.name.clone(), hours)
            })
            .collect()
    }

    /// Flip the started flag; false if it was already set
    pub fn try_start(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn mark_stopped(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}
