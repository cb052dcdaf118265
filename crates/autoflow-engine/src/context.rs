//! Trigger context and the contextual data handed to conditions & handlers.

use serde_json::{Map, Value};

use crate::conditions::lookup_path;

/// Everything an inbound event carries about its subject and payload.
/// Built by the caller at the event boundary, consumed by trigger matching,
/// branch evaluation, and handler dispatch.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    pub contact_id: Option<String>,
    pub record_id: Option<String>,
    /// Channel the event arrived on, when it is a message event.
    pub channel_type: Option<String>,
    /// Text payload for keyword-gated triggers.
    pub message_content: Option<String>,
    /// New status for status-transition triggers.
    pub to_status: Option<String>,
    /// Monetary amount for threshold triggers.
    pub amount: Option<f64>,
    /// Free-form variables, visible to conditions and `{{...}}` templates.
    pub variables: Map<String, Value>,
}

impl TriggerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_contact(contact_id: &str) -> Self {
        Self {
            contact_id: Some(contact_id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel_type = Some(channel.to_string());
        self
    }

    pub fn with_message(mut self, content: &str) -> Self {
        self.message_content = Some(content.to_string());
        self
    }

    pub fn with_status(mut self, to_status: &str) -> Self {
        self.to_status = Some(to_status.to_string());
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_var(mut self, key: &str, value: Value) -> Self {
        self.variables.insert(key.to_string(), value);
        self
    }

    /// Flatten context + event into the single object that conditions and
    /// handlers see: event fields at the top level, then variables (variables
    /// win on key collision), then the well-known context fields.
    pub fn data(&self, event: &Value) -> Value {
        let mut out = match event {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut m = Map::new();
                m.insert("event".to_string(), other.clone());
                m
            }
        };
        for (k, v) in &self.variables {
            out.insert(k.clone(), v.clone());
        }
        if let Some(id) = &self.contact_id {
            out.insert("contact_id".to_string(), Value::String(id.clone()));
        }
        if let Some(id) = &self.record_id {
            out.insert("record_id".to_string(), Value::String(id.clone()));
        }
        if let Some(c) = &self.channel_type {
            out.insert("channel_type".to_string(), Value::String(c.clone()));
        }
        if let Some(m) = &self.message_content {
            out.insert("message".to_string(), Value::String(m.clone()));
        }
        if let Some(s) = &self.to_status {
            out.insert("to_status".to_string(), Value::String(s.clone()));
        }
        if let Some(a) = self.amount {
            if let Some(n) = serde_json::Number::from_f64(a) {
                out.insert("amount".to_string(), Value::Number(n));
            }
        }
        Value::Object(out)
    }
}

/// Replace `{{path}}` placeholders with values looked up in `data`.
/// Unknown placeholders are left as-is so misconfigurations stay visible.
pub fn interpolate(template: &str, data: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match lookup_path(data, key) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(v) => out.push_str(&v.to_string()),
                    None => {
                        out.push_str("{{");
                        out.push_str(&after[..end]);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Interpolate every string leaf of a config blob against `data`.
pub fn render_config(config: &Value, data: &Value) -> Value {
    match config {
        Value::String(s) if s.contains("{{") => Value::String(interpolate(s, data)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_config(v, data)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_config(v, data)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_merges_event_variables_and_context() {
        let ctx = TriggerContext::for_contact("c-1")
            .with_channel("sms")
            .with_message("hello")
            .with_var("first_name", json!("Ada"));
        let data = ctx.data(&json!({"lead": {"status": "NEW"}}));
        assert_eq!(data["lead"]["status"], "NEW");
        assert_eq!(data["first_name"], "Ada");
        assert_eq!(data["contact_id"], "c-1");
        assert_eq!(data["channel_type"], "sms");
        assert_eq!(data["message"], "hello");
    }

    #[test]
    fn test_variables_override_event_fields() {
        let ctx = TriggerContext::new().with_var("message", json!("override"));
        // with_var wins over the raw event field, but the well-known context
        // fields land last of all
        let data = ctx.data(&json!({"message": "original"}));
        assert_eq!(data["message"], "override");
    }

    #[test]
    fn test_interpolate_known_and_unknown() {
        let data = json!({"lead": {"name": "Ada"}, "amount": 42});
        assert_eq!(
            interpolate("Hi {{lead.name}}, total {{amount}}.", &data),
            "Hi Ada, total 42."
        );
        assert_eq!(interpolate("Hi {{nobody}}", &data), "Hi {{nobody}}");
        assert_eq!(interpolate("dangling {{brace", &data), "dangling {{brace");
    }

    #[test]
    fn test_render_config_walks_nested_blobs() {
        let data = json!({"name": "Ada"});
        let config = json!({
            "message": "Hi {{name}}",
            "nested": {"subject": "For {{name}}"},
            "list": ["{{name}}", 7]
        });
        let rendered = render_config(&config, &data);
        assert_eq!(rendered["message"], "Hi Ada");
        assert_eq!(rendered["nested"]["subject"], "For Ada");
        assert_eq!(rendered["list"][0], "Ada");
        assert_eq!(rendered["list"][1], 7);
    }
}
