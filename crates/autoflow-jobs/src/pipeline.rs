//! Composed pipelines: a named, fixed sequence of steps, each wrapping one
//! job lifecycle.
//!
//! Disabled steps are logged and skipped without a job; later steps still
//! run. A runner error fails that step's job terminally and stops the
//! pipeline, which then reports FAILED with the partial results. A record id
//! produced by an early step threads into later step inputs, with a
//! generated placeholder when the producing step was skipped.

use std::sync::Arc;

use async_trait::async_trait;
use autoflow_core::error::Result;
use autoflow_core::types::JobStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::orchestrator::JobOrchestrator;

/// Executes the actual work of one enabled step. External collaborator.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, step: &PipelineStep, input: &Value) -> Result<Value>;
}

/// Per-step configuration; `options` is an opaque blob for the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub action: String,
    #[serde(default)]
    pub options: Value,
}

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct PipelineStep {
    pub name: String,
    pub config: StepConfig,
}

impl PipelineStep {
    pub fn new(name: &str, action: &str) -> Self {
        Self {
            name: name.to_string(),
            config: StepConfig {
                enabled: true,
                action: action.to_string(),
                options: Value::Null,
            },
        }
    }

    pub fn disabled(mut self) -> Self {
        self.config.enabled = false;
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.config.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Skipped,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub action: String,
    pub job_id: Option<String>,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub pipeline_id: String,
    pub status: PipelineStatus,
    /// Entity id threaded through the steps: produced by the first step or
    /// a generated placeholder when that step was skipped.
    pub record_id: String,
    pub steps: Vec<StepOutcome>,
}

pub struct ComposedPipeline {
    name: String,
    steps: Vec<PipelineStep>,
    orchestrator: Arc<JobOrchestrator>,
}

impl ComposedPipeline {
    pub fn new(name: &str, orchestrator: Arc<JobOrchestrator>, steps: Vec<PipelineStep>) -> Self {
        Self {
            name: name.to_string(),
            steps,
            orchestrator,
        }
    }

    /// The standard four-step intake sequence: create the record, notify,
    /// schedule the follow-up, generate tasks.
    pub fn intake(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self::new(
            "intake",
            orchestrator,
            vec![
                PipelineStep::new("create_record", "create_record"),
                PipelineStep::new("send_notification", "send_notification"),
                PipelineStep::new("schedule_followup", "schedule_followup"),
                PipelineStep::new("generate_tasks", "generate_tasks"),
            ],
        )
    }

    pub fn steps_mut(&mut self) -> &mut Vec<PipelineStep> {
        &mut self.steps
    }

    /// Run the sequence. Store errors bubble up as `Err`; a failing step is
    /// reported inside an `Ok` result with the partial outcomes.
    pub async fn run(
        &self,
        owner_id: &str,
        runner: &dyn StepRunner,
        base_input: &Value,
    ) -> Result<PipelineResult> {
        let pipeline_id = format!("pipe-{}", uuid::Uuid::new_v4());
        tracing::info!("🚀 Pipeline '{}' started ({pipeline_id})", self.name);

        let mut record_id: Option<String> = None;
        let mut outcomes = Vec::new();
        let mut status = PipelineStatus::Completed;

        for (index, step) in self.steps.iter().enumerate() {
            if !step.config.enabled {
                tracing::info!("⏭️ Step '{}' disabled, skipping", step.name);
                outcomes.push(StepOutcome {
                    step: step.name.clone(),
                    action: step.config.action.clone(),
                    job_id: None,
                    status: StepStatus::Skipped,
                    output: None,
                    error: None,
                });
                if index == 0 {
                    // First step would have produced the record id
                    record_id.get_or_insert_with(placeholder_record_id);
                }
                continue;
            }

            let input = step_input(base_input, &pipeline_id, record_id.as_deref(), step);
            // Pipeline steps are never re-picked-up, so the budget is zero:
            // the first failure is terminal.
            let job = self
                .orchestrator
                .create_correlated_job(
                    owner_id,
                    &step.config.action,
                    input.clone(),
                    Some(&pipeline_id),
                    Some(0),
                )
                .await?;
            self.orchestrator.start_job(&job.id).await?;

            match runner.run(step, &input).await {
                Ok(output) => {
                    let job = self.orchestrator.complete_job(&job.id, output.clone()).await?;
                    debug_assert_eq!(job.status, JobStatus::Completed);
                    if record_id.is_none() {
                        if let Some(id) = output.get("record_id").and_then(Value::as_str) {
                            record_id = Some(id.to_string());
                        } else if index == 0 {
                            record_id = Some(placeholder_record_id());
                        }
                    }
                    outcomes.push(StepOutcome {
                        step: step.name.clone(),
                        action: step.config.action.clone(),
                        job_id: Some(job.id),
                        status: StepStatus::Completed,
                        output: Some(output),
                        error: None,
                    });
                }
                Err(e) => {
                    self.orchestrator.fail_job(&job.id, &e.to_string()).await?;
                    outcomes.push(StepOutcome {
                        step: step.name.clone(),
                        action: step.config.action.clone(),
                        job_id: Some(job.id),
                        status: StepStatus::Failed,
                        output: None,
                        error: Some(e.to_string()),
                    });
                    status = PipelineStatus::Failed;
                    tracing::error!("❌ Pipeline '{}' failed at step '{}': {e}", self.name, step.name);
                    break;
                }
            }
        }

        if status == PipelineStatus::Completed {
            tracing::info!("✅ Pipeline '{}' completed ({pipeline_id})", self.name);
        }
        Ok(PipelineResult {
            pipeline_id,
            status,
            record_id: record_id.unwrap_or_else(placeholder_record_id),
            steps: outcomes,
        })
    }
}

fn placeholder_record_id() -> String {
    format!("rec-{}", uuid::Uuid::new_v4())
}

fn step_input(
    base: &Value,
    pipeline_id: &str,
    record_id: Option<&str>,
    step: &PipelineStep,
) -> Value {
    let mut map = match base {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    map.insert("pipeline_id".to_string(), json!(pipeline_id));
    if let Some(id) = record_id {
        map.insert("record_id".to_string(), json!(id));
    }
    if !step.config.options.is_null() {
        map.insert("options".to_string(), step.config.options.clone());
    }
    Value::Object(map)
}
