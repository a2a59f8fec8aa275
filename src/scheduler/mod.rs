//! Hour-based trigger engine
//!
//! Named schedules fire at most once per hour of the reference day. The
//! engine loop calls [`SchedulerState::due_at`] on every tick and runs one
//! distribution cycle per due schedule.
//!
//! # Architecture
//!
//! ```text
//! tick ──► SchedulerState::due_at(now)
//!              │  hour ∈ schedule.hours && marker != hour
//!              ▼
//!          marker := hour ──► distribution cycle
//! ```
//!
//! # Modules
//!
//! - [`trigger`] - Schedule validation, markers and the started flag
//! - [`error`] - Scheduler-specific errors

pub mod error;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use trigger::SchedulerState;
