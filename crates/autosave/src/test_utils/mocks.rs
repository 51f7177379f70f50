//! Mock implementations for testing

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use mockall::mock;

use crate::error::{AutosaveError, AutosaveResult};
use crate::store::StorageBackend;

mock! {
    pub Backend {}

    #[async_trait]
    impl StorageBackend for Backend {
        fn name(&self) -> &'static str;
        async fn put<'a, 'b, 'c>(&'a self, key: &'b str, payload: &'c str) -> AutosaveResult<()>;
        async fn get<'a, 'b>(&'a self, key: &'b str) -> AutosaveResult<Option<String>>;
        async fn delete<'a, 'b>(&'a self, key: &'b str) -> AutosaveResult<()>;
    }
}

/// In-memory storage tier with switchable failure injection.
///
/// `fail()` makes every operation error; `fail_puts_larger_than()` models a
/// quota: big payloads bounce while small ones (the critical subset) still
/// land. Every attempted `put` key is logged for call-count assertions.
pub struct MemoryBackend {
    name: &'static str,
    entries: Mutex<HashMap<String, String>>,
    put_log: Mutex<Vec<String>>,
    failing: AtomicBool,
    max_payload: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
            put_log: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            max_payload: AtomicUsize::new(usize::MAX),
        }
    }

    /// Make every subsequent operation fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    /// Reject puts whose payload exceeds `limit` bytes.
    pub fn fail_puts_larger_than(&self, limit: usize) {
        self.max_payload.store(limit, Ordering::SeqCst);
    }

    /// Raw stored payload, bypassing the trait.
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Seed a payload directly, bypassing the trait.
    pub fn insert(&self, key: &str, payload: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.to_string());
    }

    /// Keys of every `put` attempt, successful or not, in call order.
    pub fn put_attempts(&self) -> Vec<String> {
        self.put_log.lock().unwrap().clone()
    }

    fn check(&self) -> AutosaveResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AutosaveError::Other(format!("{} is down", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn put(&self, key: &str, payload: &str) -> AutosaveResult<()> {
        self.put_log.lock().unwrap().push(key.to_string());
        self.check()?;
        if payload.len() > self.max_payload.load(Ordering::SeqCst) {
            return Err(AutosaveError::Other(format!("{} quota exceeded", self.name)));
        }
        self.insert(key, payload);
        Ok(())
    }

    async fn get(&self, key: &str) -> AutosaveResult<Option<String>> {
        self.check()?;
        Ok(self.entry(key))
    }

    async fn delete(&self, key: &str) -> AutosaveResult<()> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
