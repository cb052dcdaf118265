//! Job lifecycle orchestration.
//!
//! State machine: Pending → Running → Completed (terminal) | Pending (retry,
//! budget remaining) | Failed (terminal, budget exhausted). The orchestrator
//! records transitions and audit logs; it never re-invokes the work itself —
//! whoever owns the execution loop re-picks-up retried jobs.

use std::sync::Arc;

use autoflow_core::config::JobsConfig;
use autoflow_core::error::{AutoflowError, Result};
use autoflow_core::types::{Job, JobLogEntry, JobStatus, LogLevel};
use autoflow_db::WorkflowStore;
use chrono::Utc;
use serde_json::Value;

pub struct JobOrchestrator {
    store: Arc<dyn WorkflowStore>,
    config: JobsConfig,
}

impl JobOrchestrator {
    pub fn new(store: Arc<dyn WorkflowStore>, config: JobsConfig) -> Self {
        Self { store, config }
    }

    /// Persist a new PENDING job with the default retry budget.
    pub async fn create_job(&self, owner_id: &str, job_type: &str, input: Value) -> Result<Job> {
        self.create_correlated_job(owner_id, job_type, input, None, None)
            .await
    }

    /// Full-control variant: explicit correlation id and retry budget.
    pub async fn create_correlated_job(
        &self,
        owner_id: &str,
        job_type: &str,
        input: Value,
        correlation_id: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<Job> {
        let mut job = Job::new(
            owner_id,
            job_type,
            input,
            max_retries.unwrap_or(self.config.default_max_retries),
        );
        job.correlation_id = correlation_id.map(str::to_string);
        self.store.create_job(&job).await?;
        self.log(&job.id, LogLevel::Info, &format!("Job created: {job_type}"), None)
            .await?;
        tracing::info!("📝 Job {} created ({job_type})", job.id);
        Ok(job)
    }

    /// PENDING → RUNNING, recording the start timestamp.
    pub async fn start_job(&self, job_id: &str) -> Result<Job> {
        let mut job = self.load(job_id).await?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.store.update_job(&job).await?;
        tracing::debug!("🏃 Job {job_id} started");
        Ok(job)
    }

    /// Clamp progress into [0, 100]; an optional message becomes an INFO log.
    pub async fn update_progress(
        &self,
        job_id: &str,
        progress: i32,
        message: Option<&str>,
    ) -> Result<Job> {
        let mut job = self.load(job_id).await?;
        job.progress = progress.clamp(0, 100);
        self.store.update_job(&job).await?;
        if let Some(msg) = message {
            self.log(job_id, LogLevel::Info, msg, None).await?;
        }
        Ok(job)
    }

    /// Terminal success: progress 100, wall-clock duration, output stored.
    pub async fn complete_job(&self, job_id: &str, output: Value) -> Result<Job> {
        let mut job = self.load(job_id).await?;
        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.completed_at = Some(now);
        job.duration_ms = Some(elapsed_ms(&job, now));
        job.output = Some(output);
        self.store.update_job(&job).await?;
        self.log(job_id, LogLevel::Success, "Job completed", None).await?;
        tracing::info!("✅ Job {job_id} completed in {:?}ms", job.duration_ms);
        Ok(job)
    }

    /// Failure with retry budget: back to PENDING with the progress reset and
    /// the attempt named in a WARNING log. Budget exhausted: terminal FAILED.
    pub async fn fail_job(&self, job_id: &str, error: &str) -> Result<Job> {
        let mut job = self.load(job_id).await?;
        if job.retry_count < job.max_retries {
            job.retry_count += 1;
            job.progress = 0;
            job.status = JobStatus::Pending;
            self.store.update_job(&job).await?;
            self.log(
                job_id,
                LogLevel::Warning,
                &format!(
                    "Job failed (attempt {}/{}), queued for retry: {error}",
                    job.retry_count, job.max_retries
                ),
                None,
            )
            .await?;
            tracing::warn!(
                "🔁 Job {job_id} failed, retry {}/{}",
                job.retry_count,
                job.max_retries
            );
        } else {
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
            job.duration_ms = Some(elapsed_ms(&job, now));
            self.store.update_job(&job).await?;
            self.log(
                job_id,
                LogLevel::Error,
                &format!("Job failed permanently: {error}"),
                None,
            )
            .await?;
            tracing::error!("❌ Job {job_id} failed permanently: {error}");
        }
        Ok(job)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<Job> {
        self.load(job_id).await
    }

    pub async fn get_jobs_by_correlation(&self, correlation_id: &str) -> Result<Vec<Job>> {
        self.store.jobs_by_correlation(correlation_id).await
    }

    /// Bounded most-recent-first log tail for status displays.
    pub async fn job_logs(&self, job_id: &str) -> Result<Vec<JobLogEntry>> {
        self.store
            .job_log_tail(job_id, self.config.log_tail_limit)
            .await
    }

    async fn load(&self, job_id: &str) -> Result<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| AutoflowError::NotFound(format!("job {job_id}")))
    }

    async fn log(
        &self,
        job_id: &str,
        level: LogLevel,
        message: &str,
        payload: Option<Value>,
    ) -> Result<()> {
        let entry = JobLogEntry::new(job_id, level, message, payload);
        self.store.append_job_log(&entry).await
    }
}

fn elapsed_ms(job: &Job, now: chrono::DateTime<Utc>) -> i64 {
    let from = job.started_at.unwrap_or(job.created_at);
    (now - from).num_milliseconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_db::SqliteStore;
    use serde_json::json;

    fn orchestrator() -> JobOrchestrator {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        JobOrchestrator::new(store, JobsConfig::default())
    }

    #[tokio::test]
    async fn test_create_starts_pending_with_info_log() {
        let orch = orchestrator();
        let job = orch
            .create_job("owner-1", "lead_enrichment", json!({"url": "example.com"}))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, 3);

        let logs = orch.job_logs(&job.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_progress_clamped_both_directions() {
        let orch = orchestrator();
        let job = orch.create_job("o", "t", json!({})).await.unwrap();
        orch.start_job(&job.id).await.unwrap();

        let job = orch.update_progress(&job.id, 150, None).await.unwrap();
        assert_eq!(job.progress, 100);
        let job = orch.update_progress(&job.id, -5, None).await.unwrap();
        assert_eq!(job.progress, 0);
        let job = orch
            .update_progress(&job.id, 42, Some("halfway-ish"))
            .await
            .unwrap();
        assert_eq!(job.progress, 42);

        let logs = orch.job_logs(&job.id).await.unwrap();
        assert_eq!(logs[0].message, "halfway-ish");
    }

    #[tokio::test]
    async fn test_complete_sets_progress_duration_and_success_log() {
        let orch = orchestrator();
        let job = orch.create_job("o", "t", json!({})).await.unwrap();
        orch.start_job(&job.id).await.unwrap();
        let job = orch
            .complete_job(&job.id, json!({"leads": 12}))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.duration_ms.is_some());
        assert_eq!(job.output.as_ref().unwrap()["leads"], 12);

        let logs = orch.job_logs(&job.id).await.unwrap();
        assert_eq!(logs[0].level, LogLevel::Success);
    }

    #[tokio::test]
    async fn test_max_retries_two_needs_three_failures() {
        // Scenario: maxRetries=2 → fail, fail, fail = PENDING, PENDING, FAILED
        let orch = orchestrator();
        let job = orch
            .create_correlated_job("o", "t", json!({}), None, Some(2))
            .await
            .unwrap();
        orch.start_job(&job.id).await.unwrap();

        let job = orch.fail_job(&job.id, "x").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.progress, 0);

        let job = orch.fail_job(&job.id, "x").await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 2);

        let job = orch.fail_job(&job.id, "x").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 2); // never exceeds the budget
        assert!(job.completed_at.is_some());

        let logs = orch.job_logs(&job.id).await.unwrap();
        assert_eq!(logs[0].level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_zero_budget_fails_terminally_first_time() {
        let orch = orchestrator();
        let job = orch
            .create_correlated_job("o", "t", json!({}), None, Some(0))
            .await
            .unwrap();
        orch.start_job(&job.id).await.unwrap();
        let job = orch.fail_job(&job.id, "boom").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_correlation_query() {
        let orch = orchestrator();
        orch.create_correlated_job("o", "a", json!({}), Some("pipe-9"), None)
            .await
            .unwrap();
        orch.create_correlated_job("o", "b", json!({}), Some("pipe-9"), None)
            .await
            .unwrap();
        orch.create_job("o", "c", json!({})).await.unwrap();
        let jobs = orch.get_jobs_by_correlation("pipe-9").await.unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let orch = orchestrator();
        assert!(matches!(
            orch.get_job_status("job-nope").await,
            Err(AutoflowError::NotFound(_))
        ));
    }
}
