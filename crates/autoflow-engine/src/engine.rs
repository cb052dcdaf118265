//! The workflow engine: trigger matching → enrollment → action dispatch.
//!
//! An explicit service object injected where needed; the host constructs it,
//! wires the delay queue in, and owns its lifetime.

use std::sync::{Arc, OnceLock};

use autoflow_core::error::{AutoflowError, Result};
use autoflow_core::types::{ActionDefinition, Enrollment, EnrollmentStatus, WorkflowDefinition};
use autoflow_db::WorkflowStore;
use autoflow_queue::DelayQueue;
use serde_json::{json, Value};

use crate::context::{render_config, TriggerContext};
use crate::handlers::HandlerRegistry;
use crate::steps::{self, ActionStep, FailurePolicy, StepSink};
use crate::triggers;

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    registry: Arc<HandlerRegistry>,
    /// Wired in after construction — the queue's executor callback points
    /// back at this engine, so one of the two must come second.
    queue: OnceLock<Arc<DelayQueue>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            store,
            registry,
            queue: OnceLock::new(),
        }
    }

    /// Wire in the delay queue. Without one, delayed actions fail to
    /// schedule; inline execution is unaffected.
    pub fn attach_queue(&self, queue: Arc<DelayQueue>) {
        if self.queue.set(queue).is_err() {
            tracing::warn!("⚠️ Delay queue already attached, ignoring");
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Event entry point: enroll into every active workflow whose trigger
    /// predicate accepts this event and run each enrollment's actions.
    ///
    /// A failing enrollment is logged and left ACTIVE; it does not stop the
    /// other matches from running.
    pub async fn trigger_workflow(
        &self,
        trigger_type: &str,
        ctx: &TriggerContext,
        event: &Value,
    ) -> Result<Vec<Enrollment>> {
        let candidates = self.store.active_workflows_by_trigger(trigger_type).await?;
        let mut enrollments = Vec::new();
        for workflow in candidates {
            if !triggers::matches_trigger(&workflow, ctx, event) {
                continue;
            }
            tracing::info!(
                "🧩 Workflow '{}' matched trigger '{trigger_type}'",
                workflow.name
            );
            let mut enrollment = Enrollment::new(
                &workflow.id,
                ctx.contact_id.as_deref(),
                ctx.record_id.as_deref(),
            );
            self.store.create_enrollment(&enrollment).await?;

            let data = ctx.data(event);
            let plan = steps::plan(&workflow);
            match self.run_plan(&plan, &enrollment, &data).await {
                Ok(_) => {
                    self.store
                        .set_enrollment_status(&enrollment.id, EnrollmentStatus::Completed)
                        .await?;
                    enrollment.status = EnrollmentStatus::Completed;
                    tracing::info!("✅ Enrollment {} completed", enrollment.id);
                }
                Err(e) => {
                    // Stays ACTIVE: remaining inline actions are abandoned
                    // but nothing is rolled back.
                    tracing::error!("❌ Enrollment {} aborted: {e}", enrollment.id);
                }
            }
            enrollments.push(enrollment);
        }
        Ok(enrollments)
    }

    /// Run one action directly: delayed actions are handed to the queue and
    /// acknowledged as scheduled, splits evaluate and run their branch.
    pub async fn execute_action(
        &self,
        action: &ActionDefinition,
        enrollment: &Enrollment,
        ctx: &TriggerContext,
        event: &Value,
    ) -> Result<Value> {
        let workflow = self.workflow_for(enrollment).await?;
        let plan = steps::plan_action(action, &workflow);
        let data = ctx.data(event);
        let results = self.run_plan(&plan, enrollment, &data).await?;
        Ok(collapse(results))
    }

    /// Re-entrant path used by the delay queue when a scheduled execution
    /// comes due. The original trigger context is gone by now (it does not
    /// survive a restart), so conditions and templates see only the
    /// enrollment's subject references.
    pub async fn execute_scheduled(&self, enrollment_id: &str, action_id: &str) -> Result<Value> {
        let enrollment = self
            .store
            .get_enrollment(enrollment_id)
            .await?
            .ok_or_else(|| AutoflowError::NotFound(format!("enrollment {enrollment_id}")))?;
        let workflow = self.workflow_for(&enrollment).await?;
        let action = workflow
            .action(action_id)
            .ok_or_else(|| AutoflowError::NotFound(format!("action {action_id}")))?;

        // The delay has elapsed; plan it as immediate so it cannot reschedule.
        let mut due = action.clone();
        due.delay_minutes = 0;
        let plan = steps::plan_action(&due, &workflow);

        let ctx = TriggerContext {
            contact_id: enrollment.contact_id.clone(),
            record_id: enrollment.record_id.clone(),
            ..TriggerContext::default()
        };
        let data = ctx.data(&Value::Null);
        let results = self.run_plan(&plan, &enrollment, &data).await?;
        Ok(collapse(results))
    }

    async fn run_plan(
        &self,
        plan: &ActionStep,
        enrollment: &Enrollment,
        data: &Value,
    ) -> Result<Vec<Value>> {
        let sink = EnrollmentSink {
            engine: self,
            enrollment,
            data,
        };
        steps::run(plan, data, FailurePolicy::Halt, &sink).await
    }

    async fn workflow_for(&self, enrollment: &Enrollment) -> Result<WorkflowDefinition> {
        self.store
            .get_workflow(&enrollment.workflow_id)
            .await?
            .ok_or_else(|| {
                AutoflowError::NotFound(format!("workflow {}", enrollment.workflow_id))
            })
    }
}

fn collapse(mut results: Vec<Value>) -> Value {
    match results.len() {
        0 => Value::Null,
        1 => results.remove(0),
        _ => Value::Array(results),
    }
}

/// Per-enrollment leaf executor for the step interpreter.
struct EnrollmentSink<'a> {
    engine: &'a WorkflowEngine,
    enrollment: &'a Enrollment,
    data: &'a Value,
}

#[async_trait::async_trait]
impl StepSink for EnrollmentSink<'_> {
    async fn run_action(&self, action: &ActionDefinition) -> Result<Value> {
        tracing::debug!("▶️ Running action '{}'", action.action_type);
        let config = render_config(&action.config, self.data);
        self.engine
            .registry
            .dispatch(&action.action_type, &config, self.data)
            .await
    }

    async fn schedule(&self, action: &ActionDefinition) -> Result<Value> {
        let queue = self
            .engine
            .queue
            .get()
            .ok_or_else(|| AutoflowError::Queue("no delay queue attached".into()))?;
        queue
            .schedule_action(&self.enrollment.id, &action.id, action.delay_minutes)
            .await?;
        Ok(json!({"action": "scheduled"}))
    }
}
