use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

// ============================================================================
// Dead Letter Store
// ============================================================================
//
// Holds messages that could not be processed within their redelivery budget
// and events that could not be published within their retry budget. Nothing
// here is ever silently dropped: every entry is logged when recorded and
// stays queryable for operator follow-up via GET /dlq.
//
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    /// Queue the message died on, or "publisher" for failed publishes
    pub source: String,
    pub routing_key: String,
    pub payload: String,
    pub reason: String,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqStats {
    pub total: usize,
    pub by_routing_key: HashMap<String, usize>,
}

#[derive(Default)]
pub struct DeadLetterStore {
    entries: RwLock<Vec<DeadLetter>>,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        source: &str,
        routing_key: &str,
        payload: &[u8],
        reason: impl Into<String>,
        attempts: u32,
    ) -> DeadLetter {
        let entry = DeadLetter {
            id: Uuid::new_v4(),
            source: source.to_string(),
            routing_key: routing_key.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            reason: reason.into(),
            attempts,
            dead_lettered_at: Utc::now(),
        };

        tracing::error!(
            dead_letter_id = %entry.id,
            source = %entry.source,
            routing_key = %entry.routing_key,
            attempts = entry.attempts,
            reason = %entry.reason,
            "💀 Message dead-lettered"
        );

        self.entries
            .write()
            .expect("dead letter lock poisoned")
            .push(entry.clone());
        entry
    }

    /// Most recent entries first, up to `limit`.
    pub fn entries(&self, limit: usize) -> Vec<DeadLetter> {
        let entries = self.entries.read().expect("dead letter lock poisoned");
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn stats(&self) -> DlqStats {
        let entries = self.entries.read().expect("dead letter lock poisoned");
        let mut by_routing_key: HashMap<String, usize> = HashMap::new();
        for entry in entries.iter() {
            *by_routing_key.entry(entry.routing_key.clone()).or_default() += 1;
        }
        DlqStats {
            total: entries.len(),
            by_routing_key,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("dead letter lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
