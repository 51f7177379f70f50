//! Dirty-tracking and the periodic autosave loop.
//!
//! The scheduler owns a three-state flag (`Clean`/`Dirty`/`Saving`) and a
//! timer task that checks it on a fixed period. When the flag is dirty and
//! the spacing floor has passed, it pulls fresh data from the producer's
//! [`SnapshotSource`], runs it through the write gate, encodes a snapshot
//! and hands it to the store. Storage degradation never propagates out of a
//! save; a cycle that stores no snapshot leaves the flag dirty so a later
//! tick retries once the tiers come back.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::gate::{GateDecision, WriteGate};
use crate::snapshot::{Message, SessionState, SnapshotCodec};
use crate::store::{DualStore, PersistOutcome, storage_key};

/// Gate action type used for scheduled and explicit saves.
pub const AUTOSAVE_ACTION: &str = "autosave";

/// Default period of the autosave timer.
pub const AUTOSAVE_INTERVAL_MS: u64 = 30_000;

/// Default floor between two physical saves.
pub const MIN_SAVE_SPACING_MS: u64 = 5_000;

/// Configuration for [`AutosaveScheduler`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Milliseconds between dirty checks.
    pub interval_ms: u64,
    /// Minimum milliseconds between two physical saves.
    pub min_save_spacing_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_ms: AUTOSAVE_INTERVAL_MS,
            min_save_spacing_ms: MIN_SAVE_SPACING_MS,
        }
    }
}

impl SchedulerConfig {
    fn interval(&self) -> Duration {
        // tokio intervals reject a zero period.
        Duration::from_millis(self.interval_ms.max(1))
    }

    fn min_save_spacing(&self) -> Duration {
        Duration::from_millis(self.min_save_spacing_ms)
    }
}

/// Lifecycle of the pending-changes flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    /// Nothing to persist.
    Clean,
    /// Producer changed state since the last save.
    Dirty,
    /// A save is currently in flight.
    Saving,
}

/// Supplies the producer's current state when the timer decides to save.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn current(&self) -> (SessionState, Vec<Message>);
}

/// Result of one save attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The save ran to completion; the persist outcome says how far it got.
    Saved(PersistOutcome),
    /// The write gate said not yet; state stays dirty for the next tick.
    Deferred { retry_after: Duration },
}

struct SchedulerShared {
    state: SaveState,
    last_save: Option<Instant>,
    last_save_time_ms: Option<i64>,
}

struct SaveCore {
    key: String,
    config: SchedulerConfig,
    codec: SnapshotCodec,
    store: Arc<DualStore>,
    gate: Option<Arc<WriteGate>>,
    source: Arc<dyn SnapshotSource>,
    shared: Mutex<SchedulerShared>,
}

impl SaveCore {
    fn mark_dirty(&self) {
        let mut shared = self.shared.lock().unwrap();
        if shared.state == SaveState::Clean {
            shared.state = SaveState::Dirty;
        }
    }

    fn due_for_save(&self) -> bool {
        let shared = self.shared.lock().unwrap();
        if shared.state != SaveState::Dirty {
            return false;
        }
        match shared.last_save {
            Some(last) => last.elapsed() >= self.config.min_save_spacing(),
            None => true,
        }
    }

    async fn tick(&self) {
        if !self.due_for_save() {
            return;
        }
        let (state, messages) = self.source.current().await;
        self.save(state, messages).await;
    }

    async fn save(&self, state: SessionState, messages: Vec<Message>) -> SaveOutcome {
        {
            let mut shared = self.shared.lock().unwrap();
            shared.state = SaveState::Saving;
        }

        if let Some(gate) = &self.gate
            && let GateDecision::Rejected { retry_after } = gate.check(AUTOSAVE_ACTION)
        {
            log::debug!(
                "Autosave for {} gated, retrying in {:?}",
                self.key,
                retry_after
            );
            let mut shared = self.shared.lock().unwrap();
            shared.state = SaveState::Dirty;
            return SaveOutcome::Deferred { retry_after };
        }

        let snapshot = self.codec.encode(state, messages);
        let outcome = self.store.persist(&self.key, &snapshot).await;

        let mut shared = self.shared.lock().unwrap();
        if outcome.snapshot_stored() {
            log::debug!(
                "Autosaved {} ({} messages)",
                self.key,
                snapshot.messages.len()
            );
            shared.state = SaveState::Clean;
            shared.last_save = Some(Instant::now());
            shared.last_save_time_ms = Some(snapshot.timestamp_ms);
        } else {
            // No tier holds the snapshot, so the work is still unsaved.
            // Staying dirty with the save clock untouched makes the next
            // cycle retry as soon as the timer fires.
            log::warn!(
                "Autosave for {} stored no snapshot, retrying next cycle: {:?}",
                self.key,
                outcome
            );
            shared.state = SaveState::Dirty;
        }
        SaveOutcome::Saved(outcome)
    }
}

/// Owns the dirty flag and the periodic save loop for one session.
///
/// Construct one scheduler per session id; two schedulers on the same
/// storage key would race each other's writes.
pub struct AutosaveScheduler {
    core: Arc<SaveCore>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AutosaveScheduler {
    pub fn new(
        session_id: &str,
        config: SchedulerConfig,
        codec: SnapshotCodec,
        store: Arc<DualStore>,
        gate: Option<Arc<WriteGate>>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        Self {
            core: Arc::new(SaveCore {
                key: storage_key(session_id),
                config,
                codec,
                store,
                gate,
                source,
                shared: Mutex::new(SchedulerShared {
                    state: SaveState::Clean,
                    last_save: None,
                    last_save_time_ms: None,
                }),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Flag pending changes. Idempotent while already dirty or saving.
    pub fn mark_dirty(&self) {
        self.core.mark_dirty();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SaveState {
        self.core.shared.lock().unwrap().state
    }

    /// Timestamp of the last save that stored a snapshot, epoch
    /// milliseconds. Degraded cycles leave it untouched.
    pub fn last_save_time(&self) -> Option<i64> {
        self.core.shared.lock().unwrap().last_save_time_ms
    }

    /// Spawn the periodic dirty check. Idempotent while already running.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap();
        if timer.is_some() {
            return;
        }
        let core = self.core.clone();
        *timer = Some(tokio::spawn(async move {
            let period = core.config.interval();
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                core.tick().await;
            }
        }));
    }

    /// Cancel the periodic timer. In-flight storage operations finish on
    /// their own, and explicit `save` calls keep working; `start` re-arms.
    pub fn stop(&self) {
        if let Ok(mut timer) = self.timer.lock()
            && let Some(handle) = timer.take()
        {
            handle.abort();
        }
    }

    /// Save right now, outside the timer. Still subject to the write gate.
    pub async fn save(&self, state: SessionState, messages: Vec<Message>) -> SaveOutcome {
        self.core.save(state, messages).await
    }

    /// Run one dirty-check cycle immediately.
    #[cfg(test)]
    pub(crate) async fn tick_now(&self) {
        self.core.tick().await;
    }
}

impl Drop for AutosaveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
