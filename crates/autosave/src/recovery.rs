//! Startup recovery: detect a leftover snapshot and let the user decide.
//!
//! After a crash or reload, [`RecoveryAdvisor`] inspects storage for the
//! session and turns what it finds into a [`RecoveryOffer`]. Recovery is
//! never applied automatically: the advisor only answers "is there anything
//! worth restoring" and routes the user's recover-or-discard choice to the
//! registered hooks, clearing storage as configured.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::snapshot::{CriticalSubset, SessionSnapshot, now_ms};
use crate::store::{DualStore, storage_key};

/// Default recovery window in seconds. Older snapshots are treated as
/// abandoned rather than crashed.
pub const STALENESS_WINDOW_SECS: u64 = 3_600;

/// Configuration for [`RecoveryAdvisor`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Snapshots older than this many seconds are not offered for recovery.
    pub staleness_window_secs: u64,
    /// Whether a successful recover also clears the stored snapshot.
    pub clear_after_recover: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            staleness_window_secs: STALENESS_WINDOW_SECS,
            clear_after_recover: true,
        }
    }
}

impl RecoveryConfig {
    fn staleness_window_ms(&self) -> i64 {
        (self.staleness_window_secs as i64).saturating_mul(1_000)
    }
}

/// What storage holds for a session, aged against the recovery window.
///
/// `snapshot` is present whenever a decodable snapshot exists, even a stale
/// one, so callers can still offer an explicit discard. `available` is what
/// gates the recovery prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryOffer {
    pub available: bool,
    pub snapshot: Option<SessionSnapshot>,
    /// Milliseconds since the snapshot was written.
    pub age_ms: i64,
}

impl RecoveryOffer {
    fn empty() -> Self {
        Self {
            available: false,
            snapshot: None,
            age_ms: 0,
        }
    }
}

/// Facts for the recover-or-discard dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryPrompt {
    /// Epoch milliseconds of the last save.
    pub last_save_time: i64,
    /// Number of conversation items in the snapshot.
    pub items_count: usize,
}

/// The user's answer to the recovery prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    Recover,
    Discard,
}

pub type RecoverCallback = Box<dyn Fn(SessionSnapshot) + Send + Sync>;
pub type DiscardCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct RecoveryHooks {
    on_recover: Vec<RecoverCallback>,
    on_discard: Vec<DiscardCallback>,
}

/// Decides whether stored autosave data is worth offering back to the user.
pub struct RecoveryAdvisor {
    key: String,
    config: RecoveryConfig,
    store: Arc<DualStore>,
    hooks: Mutex<RecoveryHooks>,
}

impl RecoveryAdvisor {
    pub fn new(session_id: &str, config: RecoveryConfig, store: Arc<DualStore>) -> Self {
        Self {
            key: storage_key(session_id),
            config,
            store,
            hooks: Mutex::new(RecoveryHooks::default()),
        }
    }

    /// Freshest decodable snapshot for the session, regardless of age.
    pub async fn load(&self) -> Option<SessionSnapshot> {
        self.store.load(&self.key).await
    }

    /// Emergency-keyspace remnant of a save where both tiers failed.
    pub async fn load_critical(&self) -> Option<CriticalSubset> {
        self.store.load_critical(&self.key).await
    }

    /// Whether a prompt-worthy snapshot exists right now.
    pub async fn has_recoverable_data(&self) -> bool {
        self.offer().await.available
    }

    /// Inspect storage and age the result against the recovery window.
    pub async fn offer(&self) -> RecoveryOffer {
        match self.load().await {
            Some(snapshot) => {
                let age_ms = now_ms().saturating_sub(snapshot.timestamp_ms);
                let available = self.within_window(age_ms);
                if !available {
                    log::info!(
                        "Snapshot for {} is {}ms old, past the recovery window",
                        self.key,
                        age_ms
                    );
                }
                RecoveryOffer {
                    available,
                    snapshot: Some(snapshot),
                    age_ms,
                }
            }
            None => RecoveryOffer::empty(),
        }
    }

    /// Dialog facts for an offer, `None` unless the offer is available.
    pub fn prompt_for(&self, offer: &RecoveryOffer) -> Option<RecoveryPrompt> {
        if !offer.available {
            return None;
        }
        let snapshot = offer.snapshot.as_ref()?;
        Some(RecoveryPrompt {
            last_save_time: snapshot.timestamp_ms,
            items_count: snapshot.messages.len(),
        })
    }

    /// Register a hook for the recover choice. The snapshot is handed over
    /// as-is; applying it to live state is the caller's job.
    pub fn on_recover<F>(&self, f: F)
    where
        F: Fn(SessionSnapshot) + Send + Sync + 'static,
    {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.on_recover.push(Box::new(f));
        }
    }

    /// Register a hook for the discard choice.
    pub fn on_discard<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.on_discard.push(Box::new(f));
        }
    }

    /// Apply the user's choice: run the matching hooks, then clear storage.
    /// Discard always clears; recover clears unless configured to retain.
    pub async fn resolve(&self, offer: RecoveryOffer, choice: RecoveryChoice) {
        match choice {
            RecoveryChoice::Recover => {
                let Some(snapshot) = offer.snapshot else {
                    log::debug!("Recover chosen for {} with nothing stored", self.key);
                    return;
                };
                log::info!(
                    "Recovering {} ({} messages, {}ms old)",
                    self.key,
                    snapshot.messages.len(),
                    offer.age_ms
                );
                if let Ok(hooks) = self.hooks.lock() {
                    for hook in &hooks.on_recover {
                        hook(snapshot.clone());
                    }
                }
                if self.config.clear_after_recover {
                    self.store.clear(&self.key).await;
                }
            }
            RecoveryChoice::Discard => {
                log::info!("Discarding stored snapshot for {}", self.key);
                if let Ok(hooks) = self.hooks.lock() {
                    for hook in &hooks.on_discard {
                        hook();
                    }
                }
                self.store.clear(&self.key).await;
            }
        }
    }

    fn within_window(&self, age_ms: i64) -> bool {
        age_ms < self.config.staleness_window_ms()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::snapshot::SnapshotCodec;
    use crate::store::StorageBackend;
    use crate::test_utils::{MemoryBackend, snapshot_aged};

    fn advisor_with(config: RecoveryConfig) -> (RecoveryAdvisor, Arc<MemoryBackend>) {
        let tier = Arc::new(MemoryBackend::new("memory"));
        let store = Arc::new(DualStore::from_backends(
            None,
            tier.clone() as Arc<dyn StorageBackend>,
            SnapshotCodec::default(),
        ));
        (RecoveryAdvisor::new("s1", config, store), tier)
    }

    fn seed(tier: &MemoryBackend, snapshot: &SessionSnapshot) {
        tier.insert(
            &storage_key("s1"),
            &serde_json::to_string(snapshot).unwrap(),
        );
    }

    #[tokio::test]
    async fn window_boundary_is_strictly_inside() {
        let (advisor, _) = advisor_with(RecoveryConfig::default());
        assert!(advisor.within_window(0));
        assert!(advisor.within_window(3_599_999));
        assert!(!advisor.within_window(3_600_000));
        assert!(!advisor.within_window(3_600_001));
    }

    #[tokio::test]
    async fn fresh_snapshot_is_recoverable() {
        let (advisor, tier) = advisor_with(RecoveryConfig::default());
        seed(&tier, &snapshot_aged(1_000));

        assert!(advisor.has_recoverable_data().await);
        let offer = advisor.offer().await;
        assert!(offer.available);
        assert!(offer.age_ms >= 1_000);
        assert_eq!(offer.snapshot.unwrap().messages.len(), 3);
    }

    #[tokio::test]
    async fn stale_snapshot_is_offered_but_not_recoverable() {
        let (advisor, tier) = advisor_with(RecoveryConfig {
            staleness_window_secs: 2,
            ..RecoveryConfig::default()
        });
        seed(&tier, &snapshot_aged(10_000));

        assert!(!advisor.has_recoverable_data().await);
        let offer = advisor.offer().await;
        assert!(!offer.available);
        // Still surfaced so the caller can discard it explicitly.
        assert!(offer.snapshot.is_some());
        assert_eq!(advisor.prompt_for(&offer), None);
    }

    #[tokio::test]
    async fn empty_store_has_nothing_to_offer() {
        let (advisor, _) = advisor_with(RecoveryConfig::default());
        assert!(!advisor.has_recoverable_data().await);
        let offer = advisor.offer().await;
        assert_eq!(offer, RecoveryOffer::empty());
        assert_eq!(advisor.prompt_for(&offer), None);
    }

    #[tokio::test]
    async fn schema_version_mismatch_is_not_recoverable() {
        let (advisor, tier) = advisor_with(RecoveryConfig::default());
        let mut snapshot = snapshot_aged(1_000);
        snapshot.schema_version = "0.9".to_string();
        seed(&tier, &snapshot);

        assert_eq!(advisor.load().await, None);
        assert!(!advisor.has_recoverable_data().await);
    }

    #[tokio::test]
    async fn prompt_reports_save_time_and_item_count() {
        let (advisor, tier) = advisor_with(RecoveryConfig::default());
        let snapshot = snapshot_aged(1_000);
        seed(&tier, &snapshot);

        let offer = advisor.offer().await;
        let prompt = advisor.prompt_for(&offer).unwrap();
        assert_eq!(prompt.last_save_time, snapshot.timestamp_ms);
        assert_eq!(prompt.items_count, 3);
    }

    #[tokio::test]
    async fn discard_invokes_hooks_and_clears_storage() {
        let (advisor, tier) = advisor_with(RecoveryConfig::default());
        seed(&tier, &snapshot_aged(1_000));

        let discards = Arc::new(AtomicUsize::new(0));
        let counter = discards.clone();
        advisor.on_discard(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let offer = advisor.offer().await;
        advisor.resolve(offer, RecoveryChoice::Discard).await;

        assert_eq!(discards.load(Ordering::SeqCst), 1);
        assert_eq!(tier.entry(&storage_key("s1")), None);
        let critical = format!("{}-critical", storage_key("s1"));
        assert_eq!(tier.entry(&critical), None);
    }

    #[tokio::test]
    async fn recover_hands_the_snapshot_to_hooks_and_clears_by_default() {
        let (advisor, tier) = advisor_with(RecoveryConfig::default());
        let stored = snapshot_aged(1_000);
        seed(&tier, &stored);

        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        advisor.on_recover(move |snapshot| {
            *sink.lock().unwrap() = Some(snapshot);
        });

        let offer = advisor.offer().await;
        advisor.resolve(offer, RecoveryChoice::Recover).await;

        assert_eq!(received.lock().unwrap().as_ref(), Some(&stored));
        assert_eq!(tier.entry(&storage_key("s1")), None);
    }

    #[tokio::test]
    async fn recover_can_retain_storage() {
        let (advisor, tier) = advisor_with(RecoveryConfig {
            clear_after_recover: false,
            ..RecoveryConfig::default()
        });
        seed(&tier, &snapshot_aged(1_000));

        let offer = advisor.offer().await;
        advisor.resolve(offer, RecoveryChoice::Recover).await;
        assert!(tier.entry(&storage_key("s1")).is_some());
    }

    #[tokio::test]
    async fn fallback_subset_reads_from_the_emergency_keyspace() {
        let (advisor, tier) = advisor_with(RecoveryConfig::default());
        tier.insert(
            &format!("{}-critical", storage_key("s1")),
            r#"{"captured_data":null,"stage":"lesson-draft","step_index":4,"timestamp_ms":1000}"#,
        );

        let subset = advisor.load_critical().await.unwrap();
        assert_eq!(subset.stage.as_deref(), Some("lesson-draft"));
        assert_eq!(subset.step_index, Some(4));
    }
}
