//! Message-history boundary, consumed only by the channel selector.

use async_trait::async_trait;
use autoflow_core::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub channel: String,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
}

/// Reader over a contact's conversation history across all channels.
#[async_trait]
pub trait MessageHistory: Send + Sync {
    async fn records(&self, contact_id: &str) -> Result<Vec<MessageRecord>>;
}
