//! # Autoflow Jobs
//! Generic lifecycle for long-running units of work (create / start /
//! progress / complete / fail-with-retry, structured audit logs) and the
//! composed pipeline that chains several jobs into a named, partially
//! skippable sequence.

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::JobOrchestrator;
pub use pipeline::{
    ComposedPipeline, PipelineResult, PipelineStatus, PipelineStep, StepConfig, StepOutcome,
    StepRunner, StepStatus,
};
