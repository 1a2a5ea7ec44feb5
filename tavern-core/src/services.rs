//! Injected collaborators: upstream usage accounting and speech output.
//!
//! Both are traits so the session never reaches for a process-wide
//! instance. [`UsageTracker`] and [`SilentSpeech`] are the stock
//! implementations.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Receives one call per upstream request (narrator or scene image).
pub trait UsageRecorder: Send + Sync {
    fn record_call(&self);
}

/// Ignores every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUsageTracking;

impl UsageRecorder for NoUsageTracking {
    fn record_call(&self) {}
}

// ============================================================================
// Usage Tracker
// ============================================================================

pub const DEFAULT_RPM_LIMIT: usize = 60;
pub const USAGE_WINDOW: Duration = Duration::from_secs(60);

/// Requests made inside the current window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSnapshot {
    pub used: usize,
    pub remaining: usize,
    pub limit: usize,
    /// Share of the budget still available, 0 to 100.
    pub percentage: f32,
}

/// Handle returned by [`UsageTracker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(UsageSnapshot) + Send + Sync>;

struct TrackerState {
    calls: VecDeque<Instant>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

/// Sliding-window request counter.
pub struct UsageTracker {
    state: Mutex<TrackerState>,
    limit: usize,
    window: Duration,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RPM_LIMIT, USAGE_WINDOW)
    }
}

impl UsageTracker {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                calls: VecDeque::new(),
                listeners: Vec::new(),
                next_listener: 0,
            }),
            limit,
            window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop calls older than the window. Returns true if any were dropped.
    fn prune(&self, state: &mut TrackerState) -> bool {
        let now = Instant::now();
        let before = state.calls.len();
        while state
            .calls
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            state.calls.pop_front();
        }
        state.calls.len() != before
    }

    fn snapshot(&self, state: &TrackerState) -> UsageSnapshot {
        let used = state.calls.len();
        let remaining = self.limit.saturating_sub(used);
        let percentage = if self.limit == 0 {
            0.0
        } else {
            remaining as f32 / self.limit as f32 * 100.0
        };
        UsageSnapshot {
            used,
            remaining,
            limit: self.limit,
            percentage,
        }
    }

    /// Current usage, after dropping expired calls.
    pub fn usage(&self) -> UsageSnapshot {
        let mut state = self.lock();
        self.prune(&mut state);
        self.snapshot(&state)
    }

    /// Call `listener` with a fresh snapshot whenever usage changes.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(UsageSnapshot) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        state.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(lid, _)| *lid != id);
        state.listeners.len() != before
    }

    /// Listeners run outside the lock so they may query the tracker.
    fn notify(&self, snapshot: UsageSnapshot, listeners: Vec<Listener>) {
        for listener in listeners {
            listener(snapshot);
        }
    }

    fn prune_and_notify(&self) {
        let (snapshot, listeners) = {
            let mut state = self.lock();
            if !self.prune(&mut state) {
                return;
            }
            let listeners = state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (self.snapshot(&state), listeners)
        };
        self.notify(snapshot, listeners);
    }

    /// Start a background task that expires old calls once per window, so
    /// listeners see usage recover without new requests.
    pub fn start(self: &Arc<Self>) -> PrunerHandle {
        let tracker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.window);
            loop {
                ticker.tick().await;
                tracker.prune_and_notify();
            }
        });
        PrunerHandle { handle }
    }
}

impl UsageRecorder for UsageTracker {
    fn record_call(&self) {
        let (snapshot, listeners) = {
            let mut state = self.lock();
            state.calls.push_back(Instant::now());
            self.prune(&mut state);
            let listeners = state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (self.snapshot(&state), listeners)
        };
        trace!(used = snapshot.used, remaining = snapshot.remaining, "Upstream call recorded");
        self.notify(snapshot, listeners);
    }
}

/// Stops the background pruner when stopped or dropped.
pub struct PrunerHandle {
    handle: JoinHandle<()>,
}

impl PrunerHandle {
    pub fn stop(self) {}
}

impl Drop for PrunerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Speech
// ============================================================================

/// Reads narration aloud.
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, interrupting anything still being spoken.
    fn speak(&self, text: &str, locale: &str);

    /// Stop speaking immediately.
    fn stop(&self);
}

/// Speech output that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSpeech;

impl SpeechOutput for SilentSpeech {
    fn speak(&self, _text: &str, _locale: &str) {}
    fn stop(&self) {}
}

/// Speech locale for a language code.
pub fn speech_locale(language: &str) -> &'static str {
    match language {
        "id" => "id-ID",
        _ => "en-US",
    }
}
