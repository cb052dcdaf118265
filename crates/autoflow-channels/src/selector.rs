//! Channel scoring and sequenced outreach.
//!
//! Scoring: candidates are the contact's identifiers intersected with the
//! connected channel set. With history, priority = 50 + response_rate * 0.5
//! + recency bonus (10 inside 7 days), capped at 100. Without history, a
//! fixed default table applies, with synchronous channels ranked higher.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use autoflow_core::config::ChannelsConfig;
use autoflow_core::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::history::{Direction, MessageHistory, MessageRecord};

/// Contact identifiers relevant to channel selection.
#[derive(Debug, Clone, Default)]
pub struct ContactProfile {
    pub id: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl ContactProfile {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

/// A scored channel candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelChoice {
    pub channel: String,
    pub priority: f64,
    pub response_rate: Option<f64>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Dispatches one message on one channel. External collaborator; `Ok(false)`
/// is a reported delivery failure, `Err` a hard one — both move the sequence
/// on to the next channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send(&self, contact: &ContactProfile, channel: &str, message: &str) -> Result<bool>;
}

pub struct ChannelSelector {
    history: Arc<dyn MessageHistory>,
    connected: Vec<String>,
    config: ChannelsConfig,
}

const RECENCY_WINDOW_DAYS: i64 = 7;
const RECENCY_BONUS: f64 = 10.0;

impl ChannelSelector {
    pub fn new(
        history: Arc<dyn MessageHistory>,
        connected: Vec<String>,
        config: ChannelsConfig,
    ) -> Self {
        Self {
            history,
            connected,
            config,
        }
    }

    /// Score every usable channel for the contact, best first.
    pub async fn rank_channels(&self, contact: &ContactProfile) -> Result<Vec<ChannelChoice>> {
        let records = self.history.records(&contact.id).await?;
        let per_channel = group_by_channel(&records);
        let mut choices: Vec<ChannelChoice> = self
            .connected
            .iter()
            .filter(|channel| identifier_available(channel, contact))
            .map(|channel| score(channel, per_channel.get(channel.as_str())))
            .collect();
        choices.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        Ok(choices)
    }

    /// The single best channel, or the configured fallback when the contact
    /// has no usable candidates at all.
    pub async fn select_channel(&self, contact: &ContactProfile) -> Result<ChannelChoice> {
        let mut ranked = self.rank_channels(contact).await?;
        if ranked.is_empty() {
            tracing::warn!(
                "📭 No usable channel for contact {}, falling back to {}",
                contact.id,
                self.config.fallback_channel
            );
            return Ok(ChannelChoice {
                channel: self.config.fallback_channel.clone(),
                priority: default_priority(&self.config.fallback_channel),
                response_rate: None,
                last_used: None,
            });
        }
        Ok(ranked.remove(0))
    }

    /// Try channels in the given order, pausing the configured cooldown
    /// between attempts, stopping at the first reported success. Returns the
    /// winning channel, or `None` when every attempt failed.
    pub async fn execute_sequence(
        &self,
        contact: &ContactProfile,
        message: &str,
        channels: &[String],
        sender: &dyn ChannelSender,
    ) -> Result<Option<String>> {
        for (index, channel) in channels.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(std::time::Duration::from_secs(
                    self.config.sequence_cooldown_secs,
                ))
                .await;
            }
            match sender.send(contact, channel, message).await {
                Ok(true) => {
                    tracing::info!("📨 Sent to {} via {channel}", contact.id);
                    return Ok(Some(channel.clone()));
                }
                Ok(false) => {
                    tracing::warn!("📪 Delivery via {channel} reported failure");
                }
                Err(e) => {
                    tracing::warn!("⚠️ Send via {channel} errored: {e}");
                }
            }
        }
        Ok(None)
    }
}

/// Channels reachable through a phone number vs an email address. Unknown
/// channel tags have no identifier requirement we can check, so they are
/// never candidates.
fn identifier_available(channel: &str, contact: &ContactProfile) -> bool {
    match channel {
        "sms" | "whatsapp" | "voice" => contact.phone.is_some(),
        "email" => contact.email.is_some(),
        _ => false,
    }
}

/// No-history priorities: synchronous, high-engagement channels first.
fn default_priority(channel: &str) -> f64 {
    match channel {
        "whatsapp" => 85.0,
        "sms" => 80.0,
        "voice" => 70.0,
        "email" => 60.0,
        _ => 50.0,
    }
}

struct ChannelStat {
    inbound: usize,
    outbound: usize,
    last_used: Option<DateTime<Utc>>,
}

fn group_by_channel(records: &[MessageRecord]) -> HashMap<&str, ChannelStat> {
    let mut map: HashMap<&str, ChannelStat> = HashMap::new();
    for record in records {
        let stat = map.entry(record.channel.as_str()).or_insert(ChannelStat {
            inbound: 0,
            outbound: 0,
            last_used: None,
        });
        match record.direction {
            Direction::Inbound => stat.inbound += 1,
            Direction::Outbound => stat.outbound += 1,
        }
        if stat.last_used.is_none_or(|t| record.timestamp > t) {
            stat.last_used = Some(record.timestamp);
        }
    }
    map
}

fn score(channel: &str, stat: Option<&ChannelStat>) -> ChannelChoice {
    let Some(stat) = stat else {
        return ChannelChoice {
            channel: channel.to_string(),
            priority: default_priority(channel),
            response_rate: None,
            last_used: None,
        };
    };
    let response_rate = if stat.outbound == 0 {
        0.0
    } else {
        stat.inbound as f64 / stat.outbound as f64 * 100.0
    };
    let recency = match stat.last_used {
        Some(t) if Utc::now() - t < Duration::days(RECENCY_WINDOW_DAYS) => RECENCY_BONUS,
        _ => 0.0,
    };
    ChannelChoice {
        channel: channel.to_string(),
        priority: (50.0 + response_rate * 0.5 + recency).min(100.0),
        response_rate: Some(response_rate),
        last_used: stat.last_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedHistory(Vec<MessageRecord>);

    #[async_trait]
    impl MessageHistory for FixedHistory {
        async fn records(&self, _contact_id: &str) -> Result<Vec<MessageRecord>> {
            Ok(self.0.clone())
        }
    }

    fn record(channel: &str, direction: Direction, days_ago: i64) -> MessageRecord {
        MessageRecord {
            channel: channel.to_string(),
            direction,
            timestamp: Utc::now() - Duration::days(days_ago),
        }
    }

    fn selector(records: Vec<MessageRecord>, connected: &[&str]) -> ChannelSelector {
        ChannelSelector::new(
            Arc::new(FixedHistory(records)),
            connected.iter().map(|s| s.to_string()).collect(),
            ChannelsConfig {
                sequence_cooldown_secs: 0,
                fallback_channel: "email".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_email_only_contact_never_gets_phone_channel() {
        // No history: default priorities apply, but sms needs a phone
        let sel = selector(vec![], &["sms", "whatsapp", "email"]);
        let contact = ContactProfile::new("c-1").with_email("a@b.c");
        let choice = sel.select_channel(&contact).await.unwrap();
        assert_eq!(choice.channel, "email");
        assert_eq!(choice.priority, 60.0);
        assert!(choice.response_rate.is_none());
    }

    #[tokio::test]
    async fn test_history_scoring_beats_defaults() {
        // sms: 2 inbound / 2 outbound = 100% response, recent
        // priority = 50 + 50 + 10 = 100 (capped)
        let records = vec![
            record("sms", Direction::Outbound, 1),
            record("sms", Direction::Inbound, 1),
            record("sms", Direction::Outbound, 2),
            record("sms", Direction::Inbound, 2),
            // email: outbound only, stale
            record("email", Direction::Outbound, 30),
        ];
        let sel = selector(records, &["sms", "email"]);
        let contact = ContactProfile::new("c-1")
            .with_phone("+100")
            .with_email("a@b.c");
        let ranked = sel.rank_channels(&contact).await.unwrap();
        assert_eq!(ranked[0].channel, "sms");
        assert_eq!(ranked[0].priority, 100.0);
        assert_eq!(ranked[0].response_rate, Some(100.0));
        // email with history but zero inbound and no recency: 50 + 0 + 0
        assert_eq!(ranked[1].priority, 50.0);
        assert_eq!(ranked[1].response_rate, Some(0.0));
    }

    #[tokio::test]
    async fn test_no_candidates_falls_back() {
        let sel = selector(vec![], &["sms"]);
        // Email identifier only, but email is not connected
        let contact = ContactProfile::new("c-1").with_email("a@b.c");
        let choice = sel.select_channel(&contact).await.unwrap();
        assert_eq!(choice.channel, "email");
        assert_eq!(choice.priority, 60.0);
    }

    #[tokio::test]
    async fn test_recency_bonus_window() {
        let fresh = vec![record("sms", Direction::Outbound, 2)];
        let stale = vec![record("sms", Direction::Outbound, 30)];
        let contact = ContactProfile::new("c-1").with_phone("+100");

        let sel = selector(fresh, &["sms"]);
        let choice = sel.select_channel(&contact).await.unwrap();
        assert_eq!(choice.priority, 60.0); // 50 + 0 rate + 10 recency

        let sel = selector(stale, &["sms"]);
        let choice = sel.select_channel(&contact).await.unwrap();
        assert_eq!(choice.priority, 50.0);
    }

    struct ScriptedSender {
        attempts: Mutex<Vec<String>>,
        succeed_on: Option<String>,
    }

    #[async_trait]
    impl ChannelSender for ScriptedSender {
        async fn send(&self, _c: &ContactProfile, channel: &str, _m: &str) -> Result<bool> {
            self.attempts.lock().unwrap().push(channel.to_string());
            Ok(self.succeed_on.as_deref() == Some(channel))
        }
    }

    #[tokio::test]
    async fn test_sequence_stops_at_first_success() {
        let sel = selector(vec![], &[]);
        let sender = ScriptedSender {
            attempts: Mutex::new(Vec::new()),
            succeed_on: Some("email".into()),
        };
        let contact = ContactProfile::new("c-1");
        let channels = ["sms".to_string(), "email".to_string(), "voice".to_string()];
        let winner = sel
            .execute_sequence(&contact, "hi", &channels, &sender)
            .await
            .unwrap();
        assert_eq!(winner.as_deref(), Some("email"));
        assert_eq!(*sender.attempts.lock().unwrap(), vec!["sms", "email"]);
    }

    #[tokio::test]
    async fn test_sequence_exhausted_returns_none() {
        let sel = selector(vec![], &[]);
        let sender = ScriptedSender {
            attempts: Mutex::new(Vec::new()),
            succeed_on: None,
        };
        let contact = ContactProfile::new("c-1");
        let channels = ["sms".to_string(), "email".to_string()];
        let winner = sel
            .execute_sequence(&contact, "hi", &channels, &sender)
            .await
            .unwrap();
        assert!(winner.is_none());
        assert_eq!(sender.attempts.lock().unwrap().len(), 2);
    }
}
