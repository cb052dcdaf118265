//! Error taxonomy for the Autoflow engine.

use thiserror::Error;

/// Convenience result alias used across all Autoflow crates.
pub type Result<T> = std::result::Result<T, AutoflowError>;

/// All errors the automation core can surface.
#[derive(Error, Debug)]
pub enum AutoflowError {
    /// Durable store failure (open, migrate, query).
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration load/parse/save failure, or a missing required setting.
    #[error("Config error: {0}")]
    Config(String),

    /// An action handler raised an error. Propagates uncaught to the
    /// dispatcher's caller; the queue records it as a failed execution.
    #[error("Handler error: {0}")]
    Handler(String),

    /// A referenced entity (workflow, enrollment, action, job) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Delay queue failure (schedule, claim, cancel).
    #[error("Queue error: {0}")]
    Queue(String),

    /// Channel selection/send failure (no identifier, no connected channel).
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
