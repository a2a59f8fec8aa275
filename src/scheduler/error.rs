//! Error types for the scheduler module

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid hour value (must be 0-23)
    #[error("Invalid hour '{hour}'. Must be 0-23")]
    InvalidHour { hour: u32 },

    /// No schedule with this name is configured
    #[error("Unknown schedule '{name}'. Configured: {}", .valid_options.join(", "))]
    UnknownSchedule {
        name: String,
        valid_options: Vec<String>,
    },

    /// Trigger configuration error
    #[error("Trigger config error in '{field}': {reason}")]
    TriggerConfigError { field: String, reason: String },

    /// Content or ledger store failed
    #[error("Storage error during '{operation}': {reason}")]
    StorageError { operation: String, reason: String },
}

impl SchedulerError {
    /// Create an invalid hour error
    pub fn invalid_hour(hour: u32) -> Self {
        Self::InvalidHour { hour }
    }

    /// Create an unknown schedule error
    pub fn unknown_schedule(name: impl Into<String>, valid_options: Vec<String>) -> Self {
        Self::UnknownSchedule {
            name: name.into(),
            valid_options,
        }
    }

    /// Create a trigger config error
    pub fn trigger_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TriggerConfigError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error with context
    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageError {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    ///
    /// A failed store call is retried by the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StorageError { .. })
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        Self::StorageError {
            operation: "store".to_string(),
            reason: format!("{err:#}"),
        }
    }
}
