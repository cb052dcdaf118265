//! Step tree and its iterative interpreter.
//!
//! A workflow's flat action list expands into a tree of tagged variants at
//! plan time — conditional splits become `Branch` nodes with their true/false
//! action lists already resolved — and an explicit work stack walks it, so
//! branch nesting never turns into call-stack recursion.

use std::collections::HashSet;

use async_trait::async_trait;
use autoflow_core::error::Result;
use autoflow_core::types::{
    ActionDefinition, Condition, ConditionalBranch, WorkflowDefinition, CONDITIONAL_SPLIT,
};
use serde_json::{json, Value};

use crate::conditions;

/// One node of the executable plan.
#[derive(Debug, Clone)]
pub enum ActionStep {
    Sequential(Vec<ActionStep>),
    Action(ActionDefinition),
    Branch {
        conditions: Vec<Condition>,
        on_true: Vec<ActionStep>,
        on_false: Vec<ActionStep>,
    },
    Delayed(ActionDefinition),
}

/// What the interpreter does when a leaf fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop the walk and surface the error (inline enrollment runs).
    Halt,
    /// Record the error as a step result and keep walking.
    Continue,
}

/// Leaf execution callbacks — the engine implements this per enrollment.
#[async_trait]
pub trait StepSink: Send + Sync {
    async fn run_action(&self, action: &ActionDefinition) -> Result<Value>;
    async fn schedule(&self, action: &ActionDefinition) -> Result<Value>;
}

/// Build the executable plan for a workflow's full action list.
/// Split actions that are referenced from another split's branch are
/// expanded there and not repeated at the top level.
pub fn plan(workflow: &WorkflowDefinition) -> ActionStep {
    let mut expanded = HashSet::new();
    // First pass marks every action reachable from a branch list, so the
    // top-level walk covers only the mainline sequence.
    for action in &workflow.actions {
        if action.action_type == CONDITIONAL_SPLIT {
            if let Ok(branch) = serde_json::from_value::<ConditionalBranch>(action.config.clone()) {
                for id in branch.true_actions.iter().chain(&branch.false_actions) {
                    expanded.insert(id.clone());
                }
            }
        }
    }
    let mut ordered: Vec<&ActionDefinition> = workflow.actions.iter().collect();
    ordered.sort_by_key(|a| a.position);
    let steps = ordered
        .into_iter()
        .filter(|a| !expanded.contains(&a.id))
        .map(|a| {
            let mut on_path = HashSet::new();
            step_for(a, workflow, &mut on_path)
        })
        .collect();
    ActionStep::Sequential(steps)
}

/// Build the plan node for a single action (used for direct invocation).
pub fn plan_action(action: &ActionDefinition, workflow: &WorkflowDefinition) -> ActionStep {
    let mut on_path = HashSet::new();
    step_for(action, workflow, &mut on_path)
}

fn step_for(
    action: &ActionDefinition,
    workflow: &WorkflowDefinition,
    on_path: &mut HashSet<String>,
) -> ActionStep {
    if action.delay_minutes > 0 {
        return ActionStep::Delayed(action.clone());
    }
    if action.action_type != CONDITIONAL_SPLIT {
        return ActionStep::Action(action.clone());
    }
    if !on_path.insert(action.id.clone()) {
        // Split reachable from its own branch list; expand it once only.
        tracing::warn!("⚠️ Cyclic conditional split '{}', truncating", action.id);
        return ActionStep::Sequential(Vec::new());
    }
    let branch = match serde_json::from_value::<ConditionalBranch>(action.config.clone()) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("⚠️ Malformed conditional split '{}': {e}", action.id);
            return ActionStep::Sequential(Vec::new());
        }
    };
    let resolve = |ids: &[String], on_path: &mut HashSet<String>| {
        workflow
            .actions_by_ids(ids)
            .iter()
            .map(|a| step_for(a, workflow, on_path))
            .collect::<Vec<_>>()
    };
    let on_true = resolve(&branch.true_actions, on_path);
    let on_false = resolve(&branch.false_actions, on_path);
    on_path.remove(&action.id);
    ActionStep::Branch {
        conditions: branch.conditions,
        on_true,
        on_false,
    }
}

/// Walk the plan with an explicit work stack, collecting leaf results.
pub async fn run(
    root: &ActionStep,
    data: &Value,
    policy: FailurePolicy,
    sink: &dyn StepSink,
) -> Result<Vec<Value>> {
    let mut results = Vec::new();
    let mut stack: Vec<&ActionStep> = vec![root];
    while let Some(step) = stack.pop() {
        match step {
            ActionStep::Sequential(steps) => {
                stack.extend(steps.iter().rev());
            }
            ActionStep::Branch {
                conditions,
                on_true,
                on_false,
            } => {
                let taken = conditions::evaluate(conditions, data);
                tracing::debug!("🔀 Branch evaluated: {taken}");
                let chosen = if taken { on_true } else { on_false };
                stack.extend(chosen.iter().rev());
            }
            ActionStep::Action(action) => match sink.run_action(action).await {
                Ok(result) => results.push(result),
                Err(e) => match policy {
                    FailurePolicy::Halt => return Err(e),
                    FailurePolicy::Continue => {
                        tracing::warn!("⚠️ Action '{}' failed: {e}", action.action_type);
                        results.push(json!({"action": action.action_type, "error": e.to_string()}));
                    }
                },
            },
            ActionStep::Delayed(action) => match sink.schedule(action).await {
                Ok(ack) => results.push(ack),
                Err(e) => match policy {
                    FailurePolicy::Halt => return Err(e),
                    FailurePolicy::Continue => {
                        tracing::warn!("⚠️ Scheduling '{}' failed: {e}", action.action_type);
                        results.push(json!({"action": action.action_type, "error": e.to_string()}));
                    }
                },
            },
        }
    }
    Ok(results)
}
