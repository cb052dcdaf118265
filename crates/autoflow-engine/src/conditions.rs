//! Declarative condition evaluator.
//!
//! Total and pure: malformed input, missing fields, and unknown operators all
//! degrade to `false` — this function never errors and never panics.
//!
//! Combination semantics: the first condition seeds the result; each later
//! condition's OWN `logic` field joins it with the running result. This is a
//! left fold, not an expression tree, and downstream workflow configs depend
//! on it — do not "fix" it.

use autoflow_core::types::{CombineLogic, Condition};
use serde_json::Value;

/// Evaluate an ordered condition list against nested data.
pub fn evaluate(conditions: &[Condition], data: &Value) -> bool {
    let mut iter = conditions.iter();
    let Some(first) = iter.next() else {
        // Empty list: nothing to fail.
        return true;
    };
    let mut result = evaluate_one(first, data);
    for cond in iter {
        let current = evaluate_one(cond, data);
        result = match cond.logic {
            CombineLogic::And => result && current,
            CombineLogic::Or => result || current,
        };
    }
    result
}

fn evaluate_one(cond: &Condition, data: &Value) -> bool {
    let actual = lookup_path(data, &cond.field);
    match cond.operator.as_str() {
        "equals" => loose_eq(actual, &cond.value),
        "not_equals" => !loose_eq(actual, &cond.value),
        "contains" => as_text(actual)
            .to_lowercase()
            .contains(&as_text(Some(&cond.value)).to_lowercase()),
        "not_contains" => !as_text(actual)
            .to_lowercase()
            .contains(&as_text(Some(&cond.value)).to_lowercase()),
        "greater_than" => as_number(actual) > as_number(Some(&cond.value)),
        "less_than" => as_number(actual) < as_number(Some(&cond.value)),
        "is_empty" => is_empty(actual),
        "is_not_empty" => !is_empty(actual),
        _ => false,
    }
}

/// Walk a dot-separated path into nested objects. Traversal stops the moment
/// an intermediate value is null or missing.
pub fn lookup_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        if current.is_null() {
            return None;
        }
        current = current.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Loose equality in the spirit of dynamic-language `==`: numbers compare
/// numerically even against numeric strings; everything else compares by
/// string form. A missing value equals only an explicit null.
fn loose_eq(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    let numeric = actual.is_number() || expected.is_number();
    if numeric {
        if let (Some(a), Some(b)) = (try_number(actual), try_number(expected)) {
            return a == b;
        }
    }
    as_text(Some(actual)) == as_text(Some(expected))
}

fn as_text(v: Option<&Value>) -> String {
    match v {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn try_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_number(v: Option<&Value>) -> f64 {
    v.and_then(try_number).unwrap_or(0.0)
}

fn is_empty(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}
