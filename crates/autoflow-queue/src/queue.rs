//! The delay scheduler service object.
//!
//! `schedule_action` always persists a PENDING row first (durability before
//! latency). Delays under the timer cutoff additionally arm an in-process
//! tokio timer keyed by (enrollment, action). Both the timer path and the
//! poll loop go through the store's claim step, so a race between them
//! resolves to exactly one execution of the row.
//!
//! A restart loses timers but never rows — the poll loop picks up anything
//! the timers would have fired.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use autoflow_core::config::QueueConfig;
use autoflow_core::error::{AutoflowError, Result};
use autoflow_core::types::ActionExecution;
use autoflow_db::WorkflowStore;
use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;

/// Re-dispatch callback: (enrollment_id, action_id) → action result.
/// Injected by the host so this crate stays independent of the dispatcher.
pub type ActionExecutor =
    Arc<dyn Fn(String, String) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Explicit service object: constructed, started, and stopped by the host.
pub struct DelayQueue {
    store: Arc<dyn WorkflowStore>,
    config: QueueConfig,
    executor: ActionExecutor,
    timers: Mutex<HashMap<(String, String), JoinHandle<()>>>,
}

impl DelayQueue {
    pub fn new(store: Arc<dyn WorkflowStore>, config: QueueConfig, executor: ActionExecutor) -> Self {
        Self {
            store,
            config,
            executor,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Persist a delayed execution and, for short delays, arm a timer.
    /// Returns the execution row id.
    pub async fn schedule_action(
        self: &Arc<Self>,
        enrollment_id: &str,
        action_id: &str,
        delay_minutes: u32,
    ) -> Result<String> {
        let scheduled_for = Utc::now() + Duration::minutes(delay_minutes as i64);
        let execution = ActionExecution::pending(enrollment_id, action_id, scheduled_for);
        self.store.create_execution(&execution).await?;
        tracing::info!(
            "⏳ Scheduled action {action_id} for enrollment {enrollment_id} in {delay_minutes}m"
        );

        if delay_minutes < self.config.timer_cutoff_minutes {
            self.arm_timer(&execution);
        }
        Ok(execution.id)
    }

    fn arm_timer(self: &Arc<Self>, execution: &ActionExecution) {
        let key = (execution.enrollment_id.clone(), execution.action_id.clone());
        let queue = Arc::downgrade(self);
        let execution_id = execution.id.clone();
        let enrollment_id = execution.enrollment_id.clone();
        let action_id = execution.action_id.clone();
        let delay = (execution.scheduled_for - Utc::now())
            .to_std()
            .unwrap_or_default();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(queue) = queue.upgrade() {
                queue
                    .run_execution(&execution_id, &enrollment_id, &action_id)
                    .await;
                queue.clear_timer(&enrollment_id, &action_id);
            }
        });
        let mut timers = match self.timers.lock() {
            Ok(t) => t,
            Err(p) => p.into_inner(),
        };
        if let Some(old) = timers.insert(key, handle) {
            old.abort();
        }
    }

    /// Start the background poll loop; the returned handle is aborted by the
    /// host on shutdown.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        let interval_secs = self.config.poll_interval_secs;
        tracing::info!("⏰ Delay queue started (poll every {interval_secs}s)");
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
            loop {
                ticker.tick().await;
                if let Err(e) = queue.poll_once().await {
                    tracing::warn!("⚠️ Poll pass failed: {e}");
                }
            }
        })
    }

    /// One poll pass: run a bounded batch of due PENDING rows.
    /// Returns how many rows this pass attempted.
    pub async fn poll_once(&self) -> Result<usize> {
        let due = self
            .store
            .due_executions(Utc::now(), self.config.batch_size)
            .await?;
        let count = due.len();
        for execution in due {
            self.run_execution(&execution.id, &execution.enrollment_id, &execution.action_id)
                .await;
        }
        Ok(count)
    }

    /// Claim, re-dispatch, and record the outcome of one execution row.
    /// Losing the claim is normal (the other path got there first).
    async fn run_execution(&self, execution_id: &str, enrollment_id: &str, action_id: &str) {
        match self.store.claim_execution(execution_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("↩️ Execution {execution_id} already claimed, skipping");
                return;
            }
            Err(e) => {
                tracing::warn!("⚠️ Claim failed for {execution_id}: {e}");
                return;
            }
        }
        let outcome =
            (self.executor)(enrollment_id.to_string(), action_id.to_string()).await;
        let record = match outcome {
            Ok(result) => {
                tracing::info!("✅ Scheduled action {action_id} completed");
                self.store.complete_execution(execution_id, &result).await
            }
            Err(e) => {
                // No retry at this layer: a failed scheduled action stays failed
                tracing::warn!("❌ Scheduled action {action_id} failed: {e}");
                self.store.fail_execution(execution_id, &e.to_string()).await
            }
        };
        if let Err(e) = record {
            tracing::error!("⚠️ Could not record outcome for {execution_id}: {e}");
        }
    }

    /// Cancel everything still pending for an enrollment: rows become
    /// SKIPPED, matching timers are dropped. In-flight executions are not
    /// interrupted. Nothing pending is a valid no-op.
    pub async fn cancel_enrollment(&self, enrollment_id: &str) -> Result<usize> {
        let skipped = self.store.skip_pending_executions(enrollment_id).await?;
        let mut timers = self
            .timers
            .lock()
            .map_err(|e| AutoflowError::Queue(format!("Timer table poisoned: {e}")))?;
        timers.retain(|(enr, _), handle| {
            if enr == enrollment_id {
                handle.abort();
                false
            } else {
                true
            }
        });
        if skipped > 0 {
            tracing::info!("🚫 Cancelled {skipped} pending action(s) for {enrollment_id}");
        }
        Ok(skipped)
    }

    fn clear_timer(&self, enrollment_id: &str, action_id: &str) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.remove(&(enrollment_id.to_string(), action_id.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoflow_db::SqliteStore;
    use serde_json::json;

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    fn recording_executor(fail: bool) -> (ActionExecutor, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let executor: ActionExecutor = Arc::new(move |enrollment_id, action_id| {
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                seen.lock().unwrap().push((enrollment_id, action_id));
                if fail {
                    Err(AutoflowError::Handler("handler down".into()))
                } else {
                    Ok(json!({"sent": true}))
                }
            })
        });
        (executor, calls)
    }

    fn queue(fail: bool) -> (Arc<DelayQueue>, Arc<SqliteStore>, Calls) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let (executor, calls) = recording_executor(fail);
        let config = QueueConfig {
            poll_interval_secs: 1,
            batch_size: 10,
            timer_cutoff_minutes: 60,
        };
        let queue = Arc::new(DelayQueue::new(store.clone(), config, executor));
        (queue, store, calls)
    }

    #[tokio::test]
    async fn test_schedule_persists_pending_row() {
        let (queue, store, _calls) = queue(false);
        let id = queue.schedule_action("enr-1", "act-1", 120).await.unwrap();
        let row = store.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(row.status, autoflow_core::types::ExecutionStatus::Pending);
        assert!(row.scheduled_for > Utc::now() + Duration::minutes(100));
    }

    #[tokio::test]
    async fn test_short_delay_timer_fires() {
        let (queue, store, calls) = queue(false);
        let id = queue.schedule_action("enr-1", "act-1", 0).await.unwrap();
        // Timer armed for "now"; give it a moment
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let row = store.get_execution(&id).await.unwrap().unwrap();
        assert_eq!(row.status, autoflow_core::types::ExecutionStatus::Completed);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_executes_due_and_claims_once() {
        let (queue, store, calls) = queue(false);
        // One far-future row (not due) and one already-due row
        queue.schedule_action("enr-1", "act-1", 500).await.unwrap();
        let due = ActionExecution::pending("enr-2", "act-2", Utc::now() - Duration::minutes(1));
        store.create_execution(&due).await.unwrap();

        let attempted = queue.poll_once().await.unwrap();
        assert_eq!(attempted, 1); // only the backdated enr-2 row is due
        assert_eq!(calls.lock().unwrap().len(), 1);

        // Second pass: nothing left pending-and-due, executor not re-invoked
        let attempted = queue.poll_once().await.unwrap();
        assert_eq!(attempted, 0);
        assert_eq!(calls.lock().unwrap().len(), 1);

        let row = store.get_execution(&due.id).await.unwrap().unwrap();
        assert_eq!(row.status, autoflow_core::types::ExecutionStatus::Completed);
        assert_eq!(row.attempt, 1);
    }

    #[tokio::test]
    async fn test_failed_execution_stays_failed() {
        let (queue, store, _calls) = queue(true);
        let due = ActionExecution::pending("enr-1", "act-1", Utc::now() - Duration::minutes(1));
        store.create_execution(&due).await.unwrap();
        queue.poll_once().await.unwrap();
        let row = store.get_execution(&due.id).await.unwrap().unwrap();
        assert_eq!(row.status, autoflow_core::types::ExecutionStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("Handler error: handler down"));
        // No retry at this layer
        assert_eq!(queue.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_skips_pending_and_is_noop_when_empty() {
        let (queue, store, _calls) = queue(false);
        assert_eq!(queue.cancel_enrollment("enr-none").await.unwrap(), 0);

        queue.schedule_action("enr-1", "act-1", 300).await.unwrap();
        queue.schedule_action("enr-1", "act-2", 300).await.unwrap();
        assert_eq!(queue.cancel_enrollment("enr-1").await.unwrap(), 2);
        let rows = store.executions_for_enrollment("enr-1").await.unwrap();
        assert!(rows
            .iter()
            .all(|r| r.status == autoflow_core::types::ExecutionStatus::Skipped));
    }
}
