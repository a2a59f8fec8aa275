//! Unified error handling for the promocast crate
//!
//! Domain errors stay close to where they are raised ([`ChannelError`] in
//! the adapters, [`SchedulerError`] in the trigger engine). The engine's
//! public operations fold them, and failures of the storage layer, into a
//! single [`Error`]. The read API maps its [`ErrorCategory`] to an HTTP status.
//!
//! ```rust,ignore
//! use promocast::error::Error;
//!
//! fn report(err: &Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = err.category().as_str(), "Retrying next tick: {err}");
//!     } else {
//!         tracing::error!(category = err.category().as_str(), "{err}");
//!     }
//! }
//! ```

use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::channels::ChannelError;
pub use crate::scheduler::error::SchedulerError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Platform API rejected the request
    Platform,
    /// Content pool, ledger or integration store
    Storage,
    /// Configuration and validation errors
    Config,
    /// Unknown schedules and bad trigger input
    Scheduler,
}

impl ErrorCategory {
    /// Short human-readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Platform => "platform",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
        }
    }
}

/// Unified error type for the promocast crate
#[derive(Error, Debug)]
pub enum Error {
    /// Channel adapter errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Scheduler and timing errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Store read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Channel(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Storage(_) => true,
            Self::Config(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Channel(e) => match e {
                ChannelError::HttpError(_) | ChannelError::Unavailable(_) | ChannelError::RateLimited(_) => {
                    ErrorCategory::Network
                }
                ChannelError::InvalidConfig(_) | ChannelError::NotConfigured(_) => ErrorCategory::Config,
                _ => ErrorCategory::Platform,
            },
            Self::Scheduler(SchedulerError::StorageError { .. }) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Wrap a storage-layer failure, keeping its context chain
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    /// Wrap a configuration failure, keeping its context chain
    pub fn config(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
