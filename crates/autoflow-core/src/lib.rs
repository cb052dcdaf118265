//! # Autoflow Core
//!
//! Shared foundation for the Autoflow automation engine: domain types,
//! configuration, and the error taxonomy used across all crates.
//!
//! ## Architecture
//! ```text
//! Event → WorkflowEngine (autoflow-engine)
//!   ├── trigger matching → Enrollment
//!   ├── action dispatch  → ActionHandler registry
//!   │     └── delayed?   → DelayQueue (autoflow-queue) → poll loop → re-dispatch
//!   └── conditional split → Condition Evaluator → branch steps
//!
//! JobOrchestrator (autoflow-jobs)
//!   └── ComposedPipeline: step → Job lifecycle → JobLogEntry audit trail
//!
//! ChannelSelector (autoflow-channels)
//!   └── engagement scoring over message history → best channel
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::AutoflowConfig;
pub use error::{AutoflowError, Result};
