//! Versioned autosave payloads and the codec that bounds their growth.
//!
//! A [`SessionSnapshot`] is a full-replacement copy of one authoring session:
//! producer state plus the ordered message history, stamped with a schema
//! version and a wall-clock timestamp. [`SnapshotCodec`] builds snapshots,
//! compacting older message content down to a character budget, and validates
//! stored payloads on the way back in. Anything that fails validation decodes
//! to `None` and is treated as "no snapshot".

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::AutosaveResult;

/// Schema tag stamped into every snapshot. Any change to the snapshot shape
/// must bump this, which invalidates all previously stored payloads on load.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.2";

/// Marker appended to message content shortened by compaction.
pub const TRUNCATION_MARKER: &str = "…";

/// Default number of newest messages whose content is never compacted.
pub const COMPACTION_RECENT_KEPT: usize = 10;

/// Default character budget for the content of older messages.
pub const COMPACTION_CONTENT_BUDGET: usize = 200;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// The producer-owned session fields this layer understands.
///
/// `captured_data`, `stage` and `step_index` feed the critical-subset
/// fallback; everything else the producer keeps in its state object rides
/// along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Authoring inputs captured so far (opaque to this layer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_data: Option<Value>,
    /// Current authoring stage, e.g. "outline" or "lesson-draft".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Position within the current stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One conversation entry. Compaction only ever rewrites `content`; all
/// other fields pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A complete, versioned copy of session state and messages at one instant.
///
/// Immutable once constructed; a newer snapshot fully replaces the prior one
/// under the same storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub schema_version: String,
    pub state: SessionState,
    pub messages: Vec<Message>,
    /// Save instant, epoch milliseconds.
    pub timestamp_ms: i64,
}

/// Minimal projection written to the emergency keyspace when both snapshot
/// tiers fail: just enough to restore the user's place in the flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalSubset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
    pub timestamp_ms: i64,
}

impl CriticalSubset {
    /// Project the critical fields out of a full snapshot.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        Self {
            captured_data: snapshot.state.captured_data.clone(),
            stage: snapshot.state.stage.clone(),
            step_index: snapshot.state.step_index,
            timestamp_ms: snapshot.timestamp_ms,
        }
    }
}

/// Configuration for message-content compaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Number of newest messages whose content is never touched.
    pub recent_kept: usize,
    /// Character budget for the content of older messages.
    pub content_budget: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            recent_kept: COMPACTION_RECENT_KEPT,
            content_budget: COMPACTION_CONTENT_BUDGET,
        }
    }
}

/// Builds and validates stored snapshot payloads.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCodec {
    compaction: CompactionConfig,
}

impl SnapshotCodec {
    pub fn new(compaction: CompactionConfig) -> Self {
        Self { compaction }
    }

    /// Stamp a snapshot from the producer's current state.
    ///
    /// Every message older than the newest `recent_kept` has its content
    /// shrunk to the configured character budget with [`TRUNCATION_MARKER`]
    /// appended. Messages are never removed or reordered, and content below
    /// the budget is left alone.
    pub fn encode(&self, state: SessionState, mut messages: Vec<Message>) -> SessionSnapshot {
        let unprotected = messages.len().saturating_sub(self.compaction.recent_kept);
        for message in messages.iter_mut().take(unprotected) {
            compact_content(&mut message.content, self.compaction.content_budget);
        }
        SessionSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION.to_string(),
            state,
            messages,
            timestamp_ms: now_ms(),
        }
    }

    /// Serialize an encoded snapshot to its stored JSON form.
    pub fn encode_to_string(&self, snapshot: &SessionSnapshot) -> AutosaveResult<String> {
        Ok(serde_json::to_string(snapshot)?)
    }

    /// Parse a stored payload.
    ///
    /// Returns `None` for corrupt JSON, a shape that no longer matches, or a
    /// schema version other than the current one. Callers treat `None` as
    /// "no snapshot"; nothing here is an error.
    pub fn decode(&self, raw: &str) -> Option<SessionSnapshot> {
        let snapshot: SessionSnapshot = match serde_json::from_str(raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::debug!("Discarding undecodable snapshot payload: {}", err);
                return None;
            }
        };
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            log::debug!(
                "Discarding snapshot with schema version {} (current is {})",
                snapshot.schema_version,
                SNAPSHOT_SCHEMA_VERSION
            );
            return None;
        }
        Some(snapshot)
    }
}

fn compact_content(content: &mut String, budget: usize) {
    if content.chars().count() <= budget {
        return;
    }
    let mut compacted: String = content.chars().take(budget).collect();
    compacted.push_str(TRUNCATION_MARKER);
    *content = compacted;
}
