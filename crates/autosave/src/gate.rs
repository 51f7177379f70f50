//! Write gating: a sliding-window rate limiter plus debounce and throttle
//! wrappers.
//!
//! [`WriteGate`] decides whether a requested action may run right now and is
//! what keeps the autosave path from turning into a write storm. The
//! [`Debouncer`] and [`Throttler`] are independent helpers for UI-adjacent
//! callers; they hold no gate state and can be composed with it freely.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::task::JoinHandle;

/// Default minimum spacing between accepted actions of one type.
pub const GATE_MIN_SPACING_MS: u64 = 2_000;

/// Default cap on accepted actions inside one trailing window.
pub const GATE_MAX_ACTIONS: usize = 10;

/// Default trailing window length.
pub const GATE_WINDOW_MS: u64 = 60_000;

/// Configuration for [`WriteGate`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum milliseconds between two accepted actions of the same type.
    pub min_spacing_ms: u64,
    /// Maximum accepted actions per trailing window.
    pub max_actions: usize,
    /// Trailing window length in milliseconds.
    pub window_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_spacing_ms: GATE_MIN_SPACING_MS,
            max_actions: GATE_MAX_ACTIONS,
            window_ms: GATE_WINDOW_MS,
        }
    }
}

impl GateConfig {
    fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    /// Rejected; `retry_after` is how long until the check could pass.
    Rejected { retry_after: Duration },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }

    /// Wait before the action could be retried, `None` when allowed.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GateDecision::Allowed => None,
            GateDecision::Rejected { retry_after } => Some(*retry_after),
        }
    }
}

/// Sliding-window rate limiter keyed by action type.
///
/// Two independent checks must both pass: the most recent accepted action
/// must be at least the minimum spacing old, and the count of accepted
/// actions inside the trailing window must stay below the cap. Accepted
/// actions are appended to their window; expired entries are evicted lazily
/// on each check.
pub struct WriteGate {
    config: GateConfig,
    windows: Mutex<HashMap<String, Vec<Instant>>>,
}

impl WriteGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `action` may run now, recording it when allowed.
    pub fn check(&self, action: &str) -> GateDecision {
        self.check_at(action, Instant::now())
    }

    /// Clear every window. Used on session change.
    pub fn reset(&self) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.clear();
        }
    }

    fn check_at(&self, action: &str, now: Instant) -> GateDecision {
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry(action.to_string()).or_default();
        let span = self.config.window();
        window.retain(|accepted| now.duration_since(*accepted) < span);

        if let Some(last) = window.last() {
            let since_last = now.duration_since(*last);
            let min_spacing = self.config.min_spacing();
            if since_last < min_spacing {
                return GateDecision::Rejected {
                    retry_after: min_spacing - since_last,
                };
            }
        }

        if window.len() >= self.config.max_actions {
            // A slot frees up when the oldest entry leaves the window. An
            // empty window here means the cap is zero and never opens.
            let retry_after = match window.first() {
                Some(oldest) => span.saturating_sub(now.duration_since(*oldest)),
                None => span,
            };
            return GateDecision::Rejected { retry_after };
        }

        window.push(now);
        GateDecision::Allowed
    }
}

/// Runs a deferred action once no new call has arrived for a quiet period.
///
/// Each `call` replaces the previously scheduled invocation, so only the
/// most recent closure runs after the calls go quiet. Must be used from
/// within a tokio runtime.
pub struct Debouncer {
    quiet: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `f` to run after the quiet period, replacing any invocation
    /// scheduled earlier.
    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let quiet = self.quiet;
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.take() {
                previous.abort();
            }
            *pending = Some(tokio::spawn(async move {
                tokio::time::sleep(quiet).await;
                f();
            }));
        }
    }

    /// Drop the scheduled invocation, if any, without running it.
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock()
            && let Some(handle) = pending.take()
        {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Invokes at most once per fixed interval, dropping intervening calls.
pub struct Throttler {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Run `f` if the interval has elapsed since the last accepted call.
    /// Returns whether `f` ran.
    pub fn call<F>(&self, f: F) -> bool
    where
        F: FnOnce(),
    {
        if !self.accept_at(Instant::now()) {
            return false;
        }
        f();
        true
    }

    fn accept_at(&self, now: Instant) -> bool {
        let mut last = self.last.lock().unwrap();
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
