//! Storage tier abstraction shared by the snapshot backends.

use async_trait::async_trait;

use crate::error::AutosaveResult;

/// One physical key-value tier holding JSON payloads.
///
/// Implementations report failures through `AutosaveResult`; ranking and
/// fallback between tiers is [`DualStore`](super::DualStore)'s job, so no
/// backend error escapes past it.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short tier name used in log lines.
    fn name(&self) -> &'static str;

    /// Store `payload` under `key`, replacing any previous value.
    async fn put(&self, key: &str, payload: &str) -> AutosaveResult<()>;

    /// Fetch the payload stored under `key`.
    async fn get(&self, key: &str) -> AutosaveResult<Option<String>>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> AutosaveResult<()>;
}
