//! Trigger matching — decides which active workflows an event enrolls into.

use autoflow_core::types::{Condition, WorkflowDefinition, KEYWORD_TRIGGER, MESSAGE_TRIGGERS};
use serde_json::Value;

use crate::conditions;
use crate::context::TriggerContext;

/// Apply a workflow's trigger predicate to an event. Gates run in a fixed
/// order and short-circuit on the first failure:
/// channel allow-list, keywords, status target, amount threshold, then any
/// extra conditions from the trigger config.
pub fn matches_trigger(workflow: &WorkflowDefinition, ctx: &TriggerContext, event: &Value) -> bool {
    let config = &workflow.trigger_config;

    if !channel_gate(&workflow.trigger_type, config, ctx) {
        return false;
    }
    if !keyword_gate(&workflow.trigger_type, config, ctx) {
        return false;
    }
    if !status_gate(config, ctx) {
        return false;
    }
    if !threshold_gate(config, ctx) {
        return false;
    }
    extra_conditions_gate(config, ctx, event)
}

/// When the workflow restricts channel types, the event's channel must be in
/// the allow-list. A message-type trigger with no channel in context is
/// rejected; other trigger types bypass the filter.
fn channel_gate(trigger_type: &str, config: &Value, ctx: &TriggerContext) -> bool {
    let Some(allowed) = string_list(config, "channel_types") else {
        return true;
    };
    if allowed.is_empty() {
        return true;
    }
    match &ctx.channel_type {
        Some(channel) => allowed.iter().any(|a| a == channel),
        None => !MESSAGE_TRIGGERS.contains(&trigger_type),
    }
}

/// Keyword-gated triggers need at least one configured keyword to appear in
/// the message text, case-insensitively. Missing text fails the match, and a
/// keyword trigger with no keywords configured never fires.
fn keyword_gate(trigger_type: &str, config: &Value, ctx: &TriggerContext) -> bool {
    let keywords = string_list(config, "keywords").unwrap_or_default();
    if keywords.is_empty() {
        return trigger_type != KEYWORD_TRIGGER;
    }
    let Some(content) = &ctx.message_content else {
        return false;
    };
    let haystack = content.to_lowercase();
    keywords
        .iter()
        .any(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
}

/// Status-transition triggers pass only when the event's new status equals
/// the configured target; no target configured means pass.
fn status_gate(config: &Value, ctx: &TriggerContext) -> bool {
    let Some(target) = config.get("to_status").and_then(Value::as_str) else {
        return true;
    };
    ctx.to_status.as_deref() == Some(target)
}

/// Amount-threshold triggers compare the event amount against a configured
/// threshold. Default comparison is >=; "greater_than", "less_than", and
/// "equals" override it. No amount in context fails the gate.
fn threshold_gate(config: &Value, ctx: &TriggerContext) -> bool {
    let Some(threshold) = config.get("threshold").and_then(Value::as_f64) else {
        return true;
    };
    let Some(amount) = ctx.amount else {
        return false;
    };
    match config
        .get("threshold_operator")
        .and_then(Value::as_str)
        .unwrap_or("")
    {
        "greater_than" => amount > threshold,
        "less_than" => amount < threshold,
        "equals" => amount == threshold,
        _ => amount >= threshold,
    }
}

/// Free-form extra conditions evaluated against the merged context data.
fn extra_conditions_gate(config: &Value, ctx: &TriggerContext, event: &Value) -> bool {
    let Some(raw) = config.get("conditions") else {
        return true;
    };
    let Ok(parsed) = serde_json::from_value::<Vec<Condition>>(raw.clone()) else {
        tracing::warn!("⚠️ Unparseable trigger conditions, rejecting match");
        return false;
    };
    if parsed.is_empty() {
        return true;
    }
    conditions::evaluate(&parsed, &ctx.data(event))
}

fn string_list(config: &Value, key: &str) -> Option<Vec<String>> {
    config.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
