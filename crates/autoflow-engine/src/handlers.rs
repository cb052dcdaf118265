//! Action handler registry — capability dispatch by action-type tag.
//!
//! Concrete handlers (send a message, update a record, create an invoice...)
//! live outside this core and are registered at startup. Unknown tags resolve
//! to a logged no-op "skipped" result rather than an error, so a workflow
//! referencing a handler this deployment lacks degrades gracefully.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use autoflow_core::error::Result;
use serde_json::{json, Value};

/// One action capability. `config` is the action's (already interpolated)
/// config blob; `data` is the merged context data for the enrollment.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, config: &Value, data: &Value) -> Result<Value>;
}

/// Tag → handler map, registered once at startup and then read-only.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: &str, handler: Arc<dyn ActionHandler>) {
        tracing::debug!("🔌 Handler registered: {tag}");
        self.handlers.insert(tag.to_string(), handler);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// Dispatch by tag. Handler errors propagate; unknown tags return the
    /// documented skipped no-op.
    pub async fn dispatch(&self, tag: &str, config: &Value, data: &Value) -> Result<Value> {
        match self.handlers.get(tag) {
            Some(handler) => handler.execute(config, data).await,
            None => {
                tracing::warn!("⚠️ No handler for action type '{tag}', skipping");
                Ok(json!({"action": tag, "status": "skipped"}))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use autoflow_core::error::AutoflowError;
    use std::sync::Mutex;

    /// Records every call; optionally fails on a configured tag.
    pub struct RecordingHandler {
        pub calls: Mutex<Vec<Value>>,
        pub fail: bool,
    }

    impl RecordingHandler {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl ActionHandler for RecordingHandler {
        async fn execute(&self, config: &Value, _data: &Value) -> Result<Value> {
            self.calls.lock().unwrap().push(config.clone());
            if self.fail {
                return Err(AutoflowError::Handler("handler blew up".into()));
            }
            Ok(json!({"status": "ok"}))
        }
    }
}
