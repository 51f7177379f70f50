pub mod error;

pub mod config;
pub mod gate;
pub mod recovery;
pub mod scheduler;
pub mod snapshot;
pub mod store;

#[cfg(test)]
pub mod test_utils;


// Re-export top-level error type
pub use error::{AutosaveError, AutosaveResult};

// Re-export config loading
pub use config::{AutosaveConfig, load_config};

// Re-export the write-limiting primitives
pub use gate::{Debouncer, GateConfig, GateDecision, Throttler, WriteGate};

// Re-export snapshot model and codec
pub use snapshot::{
    CompactionConfig, CriticalSubset, Message, SNAPSHOT_SCHEMA_VERSION, SessionSnapshot,
    SessionState, SnapshotCodec,
};

// Re-export the storage tiers
pub use store::{
    DualStore, JsonFileBackend, PersistOutcome, SqliteBackend, StorageBackend, StorageConfig,
    storage_key,
};

// Re-export the autosave loop and recovery flow
pub use recovery::{
    RecoveryAdvisor, RecoveryChoice, RecoveryConfig, RecoveryOffer, RecoveryPrompt,
};
pub use scheduler::{AutosaveScheduler, SaveOutcome, SaveState, SchedulerConfig, SnapshotSource};
