//! Canned states, messages and snapshots for autosave tests.

use serde_json::json;

use crate::snapshot::{Message, SNAPSHOT_SCHEMA_VERSION, SessionSnapshot, SessionState, now_ms};

pub fn sample_state() -> SessionState {
    SessionState {
        captured_data: Some(json!({"course": "biology-7", "unit": 2})),
        stage: Some("lesson-draft".to_string()),
        step_index: Some(4),
        extra: serde_json::Map::new(),
    }
}

pub fn sample_messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| Message::text(format!("turn {}", i)))
        .collect()
}

/// A valid snapshot whose save instant lies `age_ms` in the past.
pub fn snapshot_aged(age_ms: i64) -> SessionSnapshot {
    SessionSnapshot {
        schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
        state: sample_state(),
        messages: sample_messages(3),
        timestamp_ms: now_ms() - age_ms,
    }
}
