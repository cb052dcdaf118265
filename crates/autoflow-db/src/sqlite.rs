//! SQLite-backed `WorkflowStore` — survives restarts, bundled, zero setup.
//!
//! JSON blobs (trigger config, action lists, payloads) are stored as TEXT
//! columns; timestamps as RFC 3339 strings.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use autoflow_core::error::{AutoflowError, Result};
use autoflow_core::types::{
    ActionExecution, Enrollment, EnrollmentStatus, ExecutionStatus, Job, JobLogEntry, JobStatus,
    LogLevel, WorkflowDefinition,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;

use crate::store::WorkflowStore;

/// SQLite store. The connection is guarded by a mutex — the core is a
/// single-process, single-poller system, so contention stays trivial.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| AutoflowError::Database(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AutoflowError::Database(format!("DB open: {e}")))?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AutoflowError::Database(format!("DB lock poisoned: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                trigger_config TEXT NOT NULL DEFAULT '{}',
                actions TEXT NOT NULL DEFAULT '[]',     -- JSON array of ActionDefinition
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS enrollments (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                contact_id TEXT,
                record_id TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS action_executions (
                id TEXT PRIMARY KEY,
                enrollment_id TEXT NOT NULL,
                action_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                scheduled_for TEXT NOT NULL,
                attempt INTEGER NOT NULL DEFAULT 0,
                result TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                executed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_exec_due
                ON action_executions(status, scheduled_for);
            CREATE INDEX IF NOT EXISTS idx_exec_enrollment
                ON action_executions(enrollment_id);

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                correlation_id TEXT,
                job_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                input TEXT NOT NULL DEFAULT '{}',
                output TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_correlation
                ON jobs(correlation_id);

            CREATE TABLE IF NOT EXISTS job_logs (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                level TEXT NOT NULL DEFAULT 'info',
                message TEXT NOT NULL,
                payload TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_job_logs_job
                ON job_logs(job_id, created_at);
         ",
            )
            .map_err(|e| AutoflowError::Database(format!("Migration: {e}")))?;
        Ok(())
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn parse_json(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_default()
}

fn row_to_workflow(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkflowDefinition> {
    let trigger_config: String = row.get(3)?;
    let actions: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(WorkflowDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        trigger_type: row.get(2)?,
        trigger_config: parse_json(&trigger_config),
        actions: serde_json::from_str(&actions).unwrap_or_default(),
        active: row.get::<_, i32>(5)? != 0,
        created_at: parse_ts(&created_at),
    })
}

fn row_to_enrollment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Enrollment> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(Enrollment {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        contact_id: row.get(2)?,
        record_id: row.get(3)?,
        status: EnrollmentStatus::parse(&status),
        created_at: parse_ts(&created_at),
        completed_at: parse_opt_ts(row.get(6)?),
    })
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActionExecution> {
    let status: String = row.get(3)?;
    let scheduled_for: String = row.get(4)?;
    let result: Option<String> = row.get(6)?;
    let created_at: String = row.get(8)?;
    Ok(ActionExecution {
        id: row.get(0)?,
        enrollment_id: row.get(1)?,
        action_id: row.get(2)?,
        status: ExecutionStatus::parse(&status),
        scheduled_for: parse_ts(&scheduled_for),
        attempt: row.get(5)?,
        result: result.map(|r| parse_json(&r)),
        error: row.get(7)?,
        created_at: parse_ts(&created_at),
        executed_at: parse_opt_ts(row.get(9)?),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(4)?;
    let input: String = row.get(8)?;
    let output: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;
    Ok(Job {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        correlation_id: row.get(2)?,
        job_type: row.get(3)?,
        status: JobStatus::parse(&status),
        progress: row.get(5)?,
        retry_count: row.get(6)?,
        max_retries: row.get(7)?,
        input: parse_json(&input),
        output: output.map(|o| parse_json(&o)),
        created_at: parse_ts(&created_at),
        started_at: parse_opt_ts(row.get(11)?),
        completed_at: parse_opt_ts(row.get(12)?),
        duration_ms: row.get(13)?,
    })
}

fn row_to_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobLogEntry> {
    let level: String = row.get(2)?;
    let payload: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(JobLogEntry {
        id: row.get(0)?,
        job_id: row.get(1)?,
        level: LogLevel::parse(&level),
        message: row.get(3)?,
        payload: payload.map(|p| parse_json(&p)),
        created_at: parse_ts(&created_at),
    })
}

const WORKFLOW_COLS: &str = "id, name, trigger_type, trigger_config, actions, active, created_at";
const ENROLLMENT_COLS: &str =
    "id, workflow_id, contact_id, record_id, status, created_at, completed_at";
const EXECUTION_COLS: &str = "id, enrollment_id, action_id, status, scheduled_for, attempt, \
     result, error, created_at, executed_at";
const JOB_COLS: &str = "id, owner_id, correlation_id, job_type, status, progress, retry_count, \
     max_retries, input, output, created_at, started_at, completed_at, duration_ms";

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn save_workflow(&self, workflow: &WorkflowDefinition) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO workflows
                 (id, name, trigger_type, trigger_config, actions, active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    workflow.id,
                    workflow.name,
                    workflow.trigger_type,
                    workflow.trigger_config.to_string(),
                    serde_json::to_string(&workflow.actions)?,
                    workflow.active as i32,
                    workflow.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| AutoflowError::Database(format!("Save workflow: {e}")))?;
        Ok(())
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<WorkflowDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {WORKFLOW_COLS} FROM workflows WHERE id = ?1"))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        let workflow = stmt
            .query_row([id], row_to_workflow)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(AutoflowError::Database(e.to_string())),
            })?;
        Ok(workflow)
    }

    async fn active_workflows_by_trigger(
        &self,
        trigger_type: &str,
    ) -> Result<Vec<WorkflowDefinition>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WORKFLOW_COLS} FROM workflows
                 WHERE active = 1 AND trigger_type = ?1 ORDER BY created_at"
            ))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([trigger_type], row_to_workflow)
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn create_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO enrollments
                 (id, workflow_id, contact_id, record_id, status, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    enrollment.id,
                    enrollment.workflow_id,
                    enrollment.contact_id,
                    enrollment.record_id,
                    enrollment.status.as_str(),
                    enrollment.created_at.to_rfc3339(),
                    enrollment.completed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| AutoflowError::Database(format!("Create enrollment: {e}")))?;
        Ok(())
    }

    async fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {ENROLLMENT_COLS} FROM enrollments WHERE id = ?1"))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        stmt.query_row([id], row_to_enrollment)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(AutoflowError::Database(e.to_string())),
            })
    }

    async fn set_enrollment_status(&self, id: &str, status: EnrollmentStatus) -> Result<()> {
        let completed_at = match status {
            EnrollmentStatus::Completed | EnrollmentStatus::Failed => {
                Some(Utc::now().to_rfc3339())
            }
            EnrollmentStatus::Active => None,
        };
        self.conn()?
            .execute(
                "UPDATE enrollments SET status = ?1, completed_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), completed_at, id],
            )
            .map_err(|e| AutoflowError::Database(format!("Update enrollment: {e}")))?;
        Ok(())
    }

    async fn create_execution(&self, execution: &ActionExecution) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO action_executions
                 (id, enrollment_id, action_id, status, scheduled_for, attempt,
                  result, error, created_at, executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    execution.id,
                    execution.enrollment_id,
                    execution.action_id,
                    execution.status.as_str(),
                    execution.scheduled_for.to_rfc3339(),
                    execution.attempt,
                    execution.result.as_ref().map(|r| r.to_string()),
                    execution.error,
                    execution.created_at.to_rfc3339(),
                    execution.executed_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| AutoflowError::Database(format!("Create execution: {e}")))?;
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<ActionExecution>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EXECUTION_COLS} FROM action_executions WHERE id = ?1"
            ))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        stmt.query_row([id], row_to_execution)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(AutoflowError::Database(e.to_string())),
            })
    }

    async fn due_executions(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ActionExecution>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EXECUTION_COLS} FROM action_executions
                 WHERE status = 'pending' AND scheduled_for <= ?1
                 ORDER BY scheduled_for LIMIT ?2"
            ))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(
                rusqlite::params![now.to_rfc3339(), limit as i64],
                row_to_execution,
            )
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn claim_execution(&self, id: &str) -> Result<bool> {
        // The WHERE status='pending' guard is the lease: of two racing
        // claimants (timer vs poll loop), exactly one sees an affected row.
        let changed = self
            .conn()?
            .execute(
                "UPDATE action_executions
                 SET status = 'in_progress', attempt = attempt + 1, executed_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                rusqlite::params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| AutoflowError::Database(format!("Claim execution: {e}")))?;
        Ok(changed == 1)
    }

    async fn complete_execution(&self, id: &str, result: &Value) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE action_executions SET status = 'completed', result = ?1
                 WHERE id = ?2 AND status = 'in_progress'",
                rusqlite::params![result.to_string(), id],
            )
            .map_err(|e| AutoflowError::Database(format!("Complete execution: {e}")))?;
        Ok(())
    }

    async fn fail_execution(&self, id: &str, error: &str) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE action_executions SET status = 'failed', error = ?1
                 WHERE id = ?2 AND status = 'in_progress'",
                rusqlite::params![error, id],
            )
            .map_err(|e| AutoflowError::Database(format!("Fail execution: {e}")))?;
        Ok(())
    }

    async fn skip_pending_executions(&self, enrollment_id: &str) -> Result<usize> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE action_executions SET status = 'skipped'
                 WHERE enrollment_id = ?1 AND status = 'pending'",
                [enrollment_id],
            )
            .map_err(|e| AutoflowError::Database(format!("Skip executions: {e}")))?;
        Ok(changed)
    }

    async fn executions_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> Result<Vec<ActionExecution>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {EXECUTION_COLS} FROM action_executions
                 WHERE enrollment_id = ?1 ORDER BY created_at"
            ))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([enrollment_id], row_to_execution)
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO jobs
                 (id, owner_id, correlation_id, job_type, status, progress, retry_count,
                  max_retries, input, output, created_at, started_at, completed_at, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    job.id,
                    job.owner_id,
                    job.correlation_id,
                    job.job_type,
                    job.status.as_str(),
                    job.progress,
                    job.retry_count,
                    job.max_retries,
                    job.input.to_string(),
                    job.output.as_ref().map(|o| o.to_string()),
                    job.created_at.to_rfc3339(),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.duration_ms,
                ],
            )
            .map_err(|e| AutoflowError::Database(format!("Create job: {e}")))?;
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE jobs SET status = ?1, progress = ?2, retry_count = ?3, output = ?4,
                 started_at = ?5, completed_at = ?6, duration_ms = ?7 WHERE id = ?8",
                rusqlite::params![
                    job.status.as_str(),
                    job.progress,
                    job.retry_count,
                    job.output.as_ref().map(|o| o.to_string()),
                    job.started_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.duration_ms,
                    job.id,
                ],
            )
            .map_err(|e| AutoflowError::Database(format!("Update job: {e}")))?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {JOB_COLS} FROM jobs WHERE id = ?1"))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        stmt.query_row([id], row_to_job)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(AutoflowError::Database(e.to_string())),
            })
    }

    async fn jobs_by_correlation(&self, correlation_id: &str) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {JOB_COLS} FROM jobs WHERE correlation_id = ?1 ORDER BY created_at"
            ))
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([correlation_id], row_to_job)
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn append_job_log(&self, entry: &JobLogEntry) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO job_logs (id, job_id, level, message, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    entry.id,
                    entry.job_id,
                    entry.level.as_str(),
                    entry.message,
                    entry.payload.as_ref().map(|p| p.to_string()),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| AutoflowError::Database(format!("Append job log: {e}")))?;
        Ok(())
    }

    async fn job_log_tail(&self, job_id: &str, limit: usize) -> Result<Vec<JobLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, job_id, level, message, payload, created_at FROM job_logs
                 WHERE job_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![job_id, limit as i64], row_to_log)
            .map_err(|e| AutoflowError::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_core::types::{Job, WorkflowDefinition};
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_and_load_workflow() {
        let store = SqliteStore::in_memory().unwrap();
        let mut wf = WorkflowDefinition::new(
            "welcome",
            "message_received",
            serde_json::json!({"channel_types": ["sms"]}),
        );
        wf.add_action("send_message", 0, serde_json::json!({"message": "hi"}));
        store.save_workflow(&wf).await.unwrap();

        let loaded = store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "welcome");
        assert_eq!(loaded.actions.len(), 1);
        assert_eq!(loaded.actions[0].action_type, "send_message");

        let by_trigger = store
            .active_workflows_by_trigger("message_received")
            .await
            .unwrap();
        assert_eq!(by_trigger.len(), 1);
        assert!(store
            .active_workflows_by_trigger("status_changed")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_inactive_workflow_not_matched() {
        let store = SqliteStore::in_memory().unwrap();
        let mut wf = WorkflowDefinition::new("off", "record_created", serde_json::json!({}));
        wf.active = false;
        store.save_workflow(&wf).await.unwrap();
        assert!(store
            .active_workflows_by_trigger("record_created")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_claim_is_single_winner() {
        let store = SqliteStore::in_memory().unwrap();
        let exec = ActionExecution::pending("enr-1", "act-1", Utc::now());
        store.create_execution(&exec).await.unwrap();

        // First claim wins, second loses — the timer/poll race resolves here
        assert!(store.claim_execution(&exec.id).await.unwrap());
        assert!(!store.claim_execution(&exec.id).await.unwrap());

        let row = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(row.status, ExecutionStatus::InProgress);
        assert_eq!(row.attempt, 1);
    }

    #[tokio::test]
    async fn test_terminal_updates_require_in_progress() {
        let store = SqliteStore::in_memory().unwrap();
        let exec = ActionExecution::pending("enr-1", "act-1", Utc::now());
        store.create_execution(&exec).await.unwrap();

        // Completing without a claim leaves the row pending
        store
            .complete_execution(&exec.id, &serde_json::json!({"ok": true}))
            .await
            .unwrap();
        let row = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(row.status, ExecutionStatus::Pending);

        store.claim_execution(&exec.id).await.unwrap();
        store.fail_execution(&exec.id, "boom").await.unwrap();
        let row = store.get_execution(&exec.id).await.unwrap().unwrap();
        assert_eq!(row.status, ExecutionStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_due_executions_bounded_and_ordered() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        for i in 0..5 {
            let exec = ActionExecution::pending(
                "enr-1",
                &format!("act-{i}"),
                now - Duration::minutes(5 - i),
            );
            store.create_execution(&exec).await.unwrap();
        }
        // One in the future — must not be picked up
        let future = ActionExecution::pending("enr-1", "act-future", now + Duration::hours(1));
        store.create_execution(&future).await.unwrap();

        let due = store.due_executions(now, 3).await.unwrap();
        assert_eq!(due.len(), 3);
        assert_eq!(due[0].action_id, "act-0"); // oldest first
    }

    #[tokio::test]
    async fn test_skip_pending_is_noop_when_empty() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.skip_pending_executions("enr-none").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_job_roundtrip_and_correlation() {
        let store = SqliteStore::in_memory().unwrap();
        let mut job = Job::new("owner-1", "lead_enrichment", serde_json::json!({"x": 1}), 2);
        job.correlation_id = Some("pipe-1".into());
        store.create_job(&job).await.unwrap();

        job.status = JobStatus::Running;
        job.progress = 40;
        store.update_job(&job).await.unwrap();

        let loaded = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert_eq!(loaded.progress, 40);
        assert_eq!(loaded.input["x"], 1);

        let correlated = store.jobs_by_correlation("pipe-1").await.unwrap();
        assert_eq!(correlated.len(), 1);
    }

    #[tokio::test]
    async fn test_job_log_tail_most_recent_first() {
        let store = SqliteStore::in_memory().unwrap();
        for i in 0..5 {
            let mut entry =
                JobLogEntry::new("job-1", LogLevel::Info, &format!("step {i}"), None);
            entry.created_at = Utc::now() + Duration::seconds(i);
            store.append_job_log(&entry).await.unwrap();
        }
        let tail = store.job_log_tail("job-1", 3).await.unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].message, "step 4");
        assert_eq!(tail[2].message, "step 2");
    }
}
