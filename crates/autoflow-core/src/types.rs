//! Domain types — the core data model for workflows, enrollments,
//! scheduled executions, and long-running jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved action tag handled by the dispatcher itself (branching).
pub const CONDITIONAL_SPLIT: &str = "conditional_split";

/// Trigger tag whose match is defined entirely by its keyword list; with no
/// keywords configured it can never fire.
pub const KEYWORD_TRIGGER: &str = "message_keywords";

/// Trigger tags that carry a message payload. These require a channel type
/// in the context when the workflow restricts channels.
pub const MESSAGE_TRIGGERS: &[&str] = &["message_received", KEYWORD_TRIGGER];

// ─── Workflow definition ──────────────────────────────────

/// A declarative workflow: trigger + ordered action list.
///
/// Logically immutable once an enrollment references it — edits do not
/// retroactively alter in-flight enrollments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    /// Trigger tag: "message_received", "message_keywords", "status_changed",
    /// "amount_threshold", "record_created", ...
    pub trigger_type: String,
    /// Free-form trigger options: keyword list, channel allow-list,
    /// status filter, threshold, extra conditions.
    pub trigger_config: Value,
    /// Ordered action list (ascending `position`).
    pub actions: Vec<ActionDefinition>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(name: &str, trigger_type: &str, trigger_config: Value) -> Self {
        Self {
            id: format!("wf-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            trigger_type: trigger_type.to_string(),
            trigger_config,
            actions: Vec::new(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Append an action at the next ordinal position.
    pub fn add_action(&mut self, action_type: &str, delay_minutes: u32, config: Value) -> &ActionDefinition {
        let position = self.actions.len() as u32;
        self.actions.push(ActionDefinition {
            id: format!("act-{}", uuid::Uuid::new_v4()),
            action_type: action_type.to_string(),
            position,
            delay_minutes,
            config,
        });
        &self.actions[position as usize]
    }

    /// Find an action by id.
    pub fn action(&self, action_id: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|a| a.id == action_id)
    }

    /// Resolve a list of action ids into definitions, ordinal order.
    pub fn actions_by_ids(&self, ids: &[String]) -> Vec<ActionDefinition> {
        let mut found: Vec<ActionDefinition> = self
            .actions
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.position);
        found
    }
}

/// One step in a workflow's ordered action list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub id: String,
    /// Type tag — drives handler dispatch.
    pub action_type: String,
    /// Ordinal position within the workflow.
    pub position: u32,
    /// Delay before execution; 0 means inline.
    pub delay_minutes: u32,
    /// Opaque config blob, interpreted only by the matching handler.
    pub config: Value,
}

// ─── Enrollment & execution ───────────────────────────────

/// One run-instance of a workflow against one subject entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub workflow_id: String,
    /// Subject entity references (contact and/or record).
    pub contact_id: Option<String>,
    pub record_id: Option<String>,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    pub fn new(workflow_id: &str, contact_id: Option<&str>, record_id: Option<&str>) -> Self {
        Self {
            id: format!("enr-{}", uuid::Uuid::new_v4()),
            workflow_id: workflow_id.to_string(),
            contact_id: contact_id.map(str::to_string),
            record_id: record_id.map(str::to_string),
            status: EnrollmentStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Enrollment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Failed,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Active,
        }
    }
}

/// The durable unit the delay queue polls: one scheduled action run.
///
/// Valid transitions: Pending→InProgress→{Completed|Failed}, or
/// Pending→Skipped via cancellation. Nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecution {
    pub id: String,
    pub enrollment_id: String,
    pub action_id: String,
    pub status: ExecutionStatus,
    pub scheduled_for: DateTime<Utc>,
    /// Attempt counter — part of the (enrollment, action, attempt)
    /// idempotency token that makes timer/poll races safe.
    pub attempt: u32,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl ActionExecution {
    pub fn pending(enrollment_id: &str, action_id: &str, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: format!("exe-{}", uuid::Uuid::new_v4()),
            enrollment_id: enrollment_id.to_string(),
            action_id: action_id.to_string(),
            status: ExecutionStatus::Pending,
            scheduled_for,
            attempt: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            executed_at: None,
        }
    }
}

/// Scheduled execution state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "skipped" => Self::Skipped,
            _ => Self::Pending,
        }
    }
}

// ─── Conditions ───────────────────────────────────────────

/// How a condition joins with the running result during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CombineLogic {
    #[default]
    And,
    Or,
}

/// A single boolean test over nested data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-separated field path, e.g. "lead.status".
    pub field: String,
    /// "equals", "not_equals", "contains", "not_contains", "greater_than",
    /// "less_than", "is_empty", "is_not_empty". Unknown ⇒ false.
    pub operator: String,
    #[serde(default)]
    pub value: Value,
    /// Joins THIS condition with the accumulated result (left fold).
    #[serde(default)]
    pub logic: CombineLogic,
}

/// Config blob of a `conditional_split` action: conditions plus the two
/// branch action-id lists. Exactly one branch executes per evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalBranch {
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub true_actions: Vec<String>,
    #[serde(default)]
    pub false_actions: Vec<String>,
}

// ─── Jobs ─────────────────────────────────────────────────

/// An independently tracked unit of autonomous, possibly long-running work
/// with its own retry/progress/log lifecycle. Mutated only through the
/// orchestrator's lifecycle methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Owning entity (tenant/user/contact).
    pub owner_id: String,
    /// Correlation across a composed pipeline run.
    pub correlation_id: Option<String>,
    pub job_type: String,
    pub status: JobStatus,
    /// Clamped to [0, 100].
    pub progress: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub input: Value,
    pub output: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Job {
    pub fn new(owner_id: &str, job_type: &str, input: Value, max_retries: u32) -> Self {
        Self {
            id: format!("job-{}", uuid::Uuid::new_v4()),
            owner_id: owner_id.to_string(),
            correlation_id: None,
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            retry_count: 0,
            max_retries,
            input,
            output: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// Job state machine: Pending → Running → Completed | Pending (retry) |
/// Failed (terminal, budget exhausted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Append-only, time-ordered audit entry for a job. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub id: String,
    pub job_id: String,
    pub level: LogLevel,
    pub message: String,
    pub payload: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl JobLogEntry {
    pub fn new(job_id: &str, level: LogLevel, message: &str, payload: Option<Value>) -> Self {
        Self {
            id: format!("log-{}", uuid::Uuid::new_v4()),
            job_id: job_id.to_string(),
            level,
            message: message.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Severity of a job log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "warning" => Self::Warning,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_action_positions() {
        let mut wf = WorkflowDefinition::new("welcome", "message_received", serde_json::json!({}));
        wf.add_action("send_message", 0, serde_json::json!({"message": "hi"}));
        wf.add_action("change_status", 30, serde_json::json!({"status": "CONTACTED"}));
        assert_eq!(wf.actions[0].position, 0);
        assert_eq!(wf.actions[1].position, 1);
        assert_eq!(wf.actions[1].delay_minutes, 30);
    }

    #[test]
    fn test_actions_by_ids_keeps_ordinal_order() {
        let mut wf = WorkflowDefinition::new("t", "record_created", serde_json::json!({}));
        wf.add_action("a", 0, Value::Null);
        wf.add_action("b", 0, Value::Null);
        wf.add_action("c", 0, Value::Null);
        // Request out of order — resolution must come back ordinal
        let ids = vec![wf.actions[2].id.clone(), wf.actions[0].id.clone()];
        let resolved = wf.actions_by_ids(&ids);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].action_type, "a");
        assert_eq!(resolved[1].action_type, "c");
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            ExecutionStatus::Pending,
            ExecutionStatus::InProgress,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Skipped,
        ] {
            assert_eq!(ExecutionStatus::parse(s.as_str()), s);
        }
        for s in [JobStatus::Pending, JobStatus::Running, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(JobStatus::parse(s.as_str()), s);
        }
    }

    #[test]
    fn test_condition_defaults() {
        let c: Condition =
            serde_json::from_value(serde_json::json!({"field": "a", "operator": "equals"}))
                .unwrap();
        assert_eq!(c.logic, CombineLogic::And);
        assert!(c.value.is_null());
    }
}
