//! Two-tier snapshot persistence with an emergency fallback keyspace.
//!
//! [`DualStore`] ranks two physical backends: the structured SQLite store
//! (primary, larger capacity) and the JSON-file store (secondary, kept
//! deliberately simple). Writes go secondary first, then primary; loads
//! prefer the primary and fall back. When both tiers reject a full snapshot,
//! a minimal [`CriticalSubset`] lands under `<key>-critical` on the
//! secondary tier. No failure escapes this module: callers see outcomes,
//! not errors.

pub mod backend;
pub use backend::StorageBackend;
pub mod file;
pub use file::JsonFileBackend;
pub mod sqlite;
pub use sqlite::SqliteBackend;


use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::snapshot::{CriticalSubset, SessionSnapshot, SnapshotCodec};

/// Storage key for a session's full snapshot.
pub fn storage_key(session_id: &str) -> String {
    format!("autosave-{}", session_id)
}

/// Emergency keyspace entry derived from a full-snapshot key.
fn emergency_key(key: &str) -> String {
    format!("{}-critical", key)
}

/// Where the tiers live on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for the database and the snapshot files.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("autosave.db")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("scrivia")
}

/// What a `persist` call managed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Both tiers hold the snapshot.
    Replicated,
    /// Exactly one tier holds the snapshot.
    Partial {
        /// Name of the tier holding the copy.
        backend: &'static str,
    },
    /// Both tiers failed; only the critical subset was written.
    CriticalOnly,
    /// Nothing could be written at all.
    Lost,
}

impl PersistOutcome {
    /// Whether a full snapshot reached at least one tier.
    pub fn snapshot_stored(&self) -> bool {
        matches!(
            self,
            PersistOutcome::Replicated | PersistOutcome::Partial { .. }
        )
    }
}

/// Ranked two-tier store for snapshot payloads.
pub struct DualStore {
    primary: Option<Arc<dyn StorageBackend>>,
    secondary: Arc<dyn StorageBackend>,
    codec: SnapshotCodec,
}

impl DualStore {
    /// Open both tiers under `config`.
    ///
    /// Never fails: when the structured store cannot be opened, the instance
    /// degrades to secondary-only operation for its lifetime.
    pub async fn open(config: &StorageConfig, codec: SnapshotCodec) -> Self {
        if let Err(err) = tokio::fs::create_dir_all(&config.data_dir).await {
            log::warn!(
                "Could not create autosave data dir {:?}: {}",
                config.data_dir,
                err
            );
        }
        let primary = match SqliteBackend::open(config.database_path()) {
            Ok(backend) => Some(Arc::new(backend) as Arc<dyn StorageBackend>),
            Err(err) => {
                log::warn!(
                    "Structured snapshot store unavailable, using file tier only: {}",
                    err
                );
                None
            }
        };
        let secondary = Arc::new(JsonFileBackend::new(config.snapshot_dir()));
        Self::from_backends(primary, secondary, codec)
    }

    /// Assemble from explicit tiers. Embedders with their own storage and
    /// tests use this.
    pub fn from_backends(
        primary: Option<Arc<dyn StorageBackend>>,
        secondary: Arc<dyn StorageBackend>,
        codec: SnapshotCodec,
    ) -> Self {
        Self {
            primary,
            secondary,
            codec,
        }
    }

    /// Write `snapshot` under `key`: secondary tier first for immediacy,
    /// then the primary. Primary failure is tolerated; both failing degrades
    /// to the critical-subset write. Never an error.
    pub async fn persist(&self, key: &str, snapshot: &SessionSnapshot) -> PersistOutcome {
        let payload = match self.codec.encode_to_string(snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Snapshot for {} could not be serialized: {}", key, err);
                return self.persist_critical_subset(key, snapshot).await;
            }
        };

        let secondary_ok = match self.secondary.put(key, &payload).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("{} write for {} failed: {}", self.secondary.name(), key, err);
                false
            }
        };

        let primary_ok = match &self.primary {
            Some(primary) => match primary.put(key, &payload).await {
                Ok(()) => Some(primary.name()),
                Err(err) => {
                    log::warn!("{} write for {} failed: {}", primary.name(), key, err);
                    None
                }
            },
            None => None,
        };

        match (secondary_ok, primary_ok) {
            (false, None) => self.persist_critical_subset(key, snapshot).await,
            (true, Some(_)) => {
                self.supersede_critical(key).await;
                PersistOutcome::Replicated
            }
            (true, None) => {
                self.supersede_critical(key).await;
                PersistOutcome::Partial {
                    backend: self.secondary.name(),
                }
            }
            (false, Some(backend)) => {
                self.supersede_critical(key).await;
                PersistOutcome::Partial { backend }
            }
        }
    }

    /// Last-resort write: project the snapshot down to its critical fields
    /// and store that in the emergency keyspace on the secondary tier. The
    /// payload is a few named fields under a key of its own, isolated from
    /// whatever broke the full write.
    pub async fn persist_critical_subset(
        &self,
        key: &str,
        snapshot: &SessionSnapshot,
    ) -> PersistOutcome {
        let subset = CriticalSubset::from_snapshot(snapshot);
        let payload = match serde_json::to_string(&subset) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Critical subset for {} could not be serialized: {}", key, err);
                return PersistOutcome::Lost;
            }
        };
        match self.secondary.put(&emergency_key(key), &payload).await {
            Ok(()) => {
                log::warn!(
                    "Full snapshot for {} was lost, critical subset written instead",
                    key
                );
                PersistOutcome::CriticalOnly
            }
            Err(err) => {
                log::warn!("Critical subset write for {} failed: {}", key, err);
                PersistOutcome::Lost
            }
        }
    }

    /// Load the freshest acceptable snapshot under `key`.
    ///
    /// The primary tier is preferred since it tends to hold the freshest
    /// full copy. Every candidate passes through codec validation, so a
    /// corrupt or out-of-version payload in one tier falls through to the
    /// other. Backend errors read as misses.
    pub async fn load(&self, key: &str) -> Option<SessionSnapshot> {
        if let Some(primary) = &self.primary
            && let Some(snapshot) = self.load_from(primary.as_ref(), key).await
        {
            return Some(snapshot);
        }
        self.load_from(self.secondary.as_ref(), key).await
    }

    /// Read the emergency keyspace. `None` when empty or unreadable.
    pub async fn load_critical(&self, key: &str) -> Option<CriticalSubset> {
        match self.secondary.get(&emergency_key(key)).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(subset) => Some(subset),
                Err(err) => {
                    log::debug!("Discarding undecodable critical subset for {}: {}", key, err);
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                log::warn!("Critical subset read for {} failed: {}", key, err);
                None
            }
        }
    }

    /// Delete `key` from both tiers and the emergency keyspace. Individual
    /// failures are logged and absorbed.
    pub async fn clear(&self, key: &str) {
        if let Some(primary) = &self.primary
            && let Err(err) = primary.delete(key).await
        {
            log::warn!("{} delete for {} failed: {}", primary.name(), key, err);
        }
        if let Err(err) = self.secondary.delete(key).await {
            log::warn!("{} delete for {} failed: {}", self.secondary.name(), key, err);
        }
        if let Err(err) = self.secondary.delete(&emergency_key(key)).await {
            log::warn!("Emergency keyspace delete for {} failed: {}", key, err);
        }
    }

    async fn load_from(&self, backend: &dyn StorageBackend, key: &str) -> Option<SessionSnapshot> {
        match backend.get(key).await {
            Ok(Some(raw)) => self.codec.decode(&raw),
            Ok(None) => None,
            Err(err) => {
                log::warn!("{} read for {} failed: {}", backend.name(), key, err);
                None
            }
        }
    }

    // A stored full snapshot supersedes any critical subset left behind by
    // an earlier failed save.
    async fn supersede_critical(&self, key: &str) {
        let critical = emergency_key(key);
        if let Err(err) = self.secondary.delete(&critical).await {
            log::debug!("Could not delete superseded critical subset {}: {}", critical, err);
        }
    }
}
