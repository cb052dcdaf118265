//! The durable store boundary.
//!
//! Everything the core needs from persistence: create, update-by-id, and a
//! handful of bounded predicate queries (notably "pending and due").

use async_trait::async_trait;
use autoflow_core::error::Result;
use autoflow_core::types::{
    ActionExecution, Enrollment, EnrollmentStatus, Job, JobLogEntry, WorkflowDefinition,
};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Durable store for all automation state.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ── Workflow definitions ───────────────────────────────

    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()>;
    async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>>;
    /// All ACTIVE definitions whose trigger tag equals `trigger_type`.
    async fn active_workflows_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<WorkflowDefinition>>;

    // ── Enrollments ────────────────────────────────────────

    async fn create_enrollment(&self, enrollment: &Enrollment) -> Result<()>;
    async fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>>;
    async fn set_enrollment_status(&self, id: &str, status: EnrollmentStatus) -> Result<()>;

    // ── Scheduled action executions ────────────────────────

    async fn create_execution(&self, execution: &ActionExecution) -> Result<()>;
    async fn get_execution(&self, id: &str) -> Result<Option<ActionExecution>>;
    /// Bounded batch of PENDING rows with `scheduled_for <= now`, oldest first.
    async fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ActionExecution>>;
    /// Lease/claim step: PENDING → IN_PROGRESS, bumping the attempt counter.
    /// Returns false when the row was not PENDING (already claimed, skipped,
    /// or finished) — the caller must back off.
    async fn claim_execution(&self, id: &str) -> Result<bool>;
    async fn complete_execution(&self, id: &str, result: &Value) -> Result<()>;
    async fn fail_execution(&self, id: &str, error: &str) -> Result<()>;
    /// Cancellation: mark every PENDING row for the enrollment SKIPPED.
    /// Returns how many rows changed (0 is a valid no-op).
    async fn skip_pending_executions(&self, enrollment_id: &str) -> Result<usize>;
    async fn executions_for_enrollment(&self, enrollment_id: &str)
        -> Result<Vec<ActionExecution>>;

    // ── Jobs & logs ────────────────────────────────────────

    async fn create_job(&self, job: &Job) -> Result<()>;
    async fn update_job(&self, job: &Job) -> Result<()>;
    async fn get_job(&self, id: &str) -> Result<Option<Job>>;
    async fn jobs_by_correlation(&self, correlation_id: &str) -> Result<Vec<Job>>;
    async fn append_job_log(&self, entry: &JobLogEntry) -> Result<()>;
    /// Most-recent-first tail for status displays.
    async fn job_log_tail(&self, job_id: &str, limit: usize) -> Result<Vec<JobLogEntry>>;
}
