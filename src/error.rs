//! Error types for Parallel Reactions.

use crate::worker::state::TaskId;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors returned by the orchestration core before or while starting a batch.
///
/// Simulated failures and cancellations are never errors; they are reported
/// as [`UnitOutcome`](crate::worker::state::UnitOutcome) values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("Batch size {requested} is out of range (expected 1..={max})")]
    InvalidBatchSize { requested: usize, max: usize },

    #[error("Task {task_id} is already registered for user {user_id}")]
    DuplicateTask { user_id: String, task_id: TaskId },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
