//! Request race guard: at most one reopen per logical navigation
//!
//! A single navigation can reach the request handler several times before
//! the tab is actually replaced (the original request, then same-tab
//! redirects). The guard keeps a per-tab ledger of request ids and URLs that
//! have already been cancelled, so repeats are cancelled without opening
//! another tab.
//!
//! Ledger entries are cleared by the host's completion/error signal for the
//! tab's main-frame request, or after a safety timeout, whichever comes
//! first. Both paths are idempotent.

use crate::types::TabId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;

/// What the caller should do with a request it decided to cancel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Cancel and open the replacement tab
    Reopen,
    /// Cancel only; a replacement for this navigation is already underway
    CancelOnly,
}

/// Request ids and URLs already cancelled for one tab
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCancellation {
    pub request_ids: HashSet<String>,
    pub urls: HashSet<String>,
    generation: u64,
}

impl PendingCancellation {
    fn new(request_id: &str, url: &str, generation: u64) -> Self {
        let mut pending = Self {
            generation,
            ..Self::default()
        };
        pending.record(request_id, url);
        pending
    }

    /// Whether either key was seen before
    pub fn contains(&self, request_id: &str, url: &str) -> bool {
        self.request_ids.contains(request_id) || self.urls.contains(url)
    }

    fn record(&mut self, request_id: &str, url: &str) {
        self.request_ids.insert(request_id.to_string());
        self.urls.insert(url.to_string());
    }
}

/// Per-tab cancellation state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CancellationState {
    /// No cancellation in flight for the tab
    #[default]
    Idle,
    /// A cancellation was committed; later events are checked against it
    Pending(PendingCancellation),
}

#[derive(Debug, Default)]
struct Ledger {
    tabs: HashMap<TabId, CancellationState>,
    next_generation: u64,
}

/// Pending request ledger plus the safety-timeout cleanup
///
/// Every entry gets a cleanup timer on `runtime`, so no entry outlives the
/// cleanup delay even when the completion signal never arrives.
#[derive(Debug, Clone)]
pub struct RequestGuard {
    ledger: Arc<Mutex<Ledger>>,
    cleanup_delay: Duration,
    runtime: Handle,
}

impl RequestGuard {
    pub fn new(cleanup_delay: Duration, runtime: Handle) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(Ledger::default())),
            cleanup_delay,
            runtime,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        lock_ledger(&self.ledger)
    }

    pub fn cleanup_delay(&self) -> Duration {
        self.cleanup_delay
    }

    /// Record a cancellation decision for `tab_id` and classify it
    ///
    /// Never suspends: the ledger is updated before the caller's next
    /// `.await`, so every later event for the tab observes it.
    pub fn register(&self, tab_id: TabId, request_id: &str, url: &str) -> GuardDecision {
        let mut ledger = self.lock();
        let generation = ledger.next_generation;
        let state = ledger.tabs.entry(tab_id).or_default();

        // None: first cancellation for the tab; Some(dup): entry already pending
        let duplicate = match state {
            CancellationState::Idle => {
                *state = CancellationState::Pending(PendingCancellation::new(
                    request_id, url, generation,
                ));
                None
            }
            CancellationState::Pending(pending) => {
                let duplicate = pending.contains(request_id, url);
                pending.record(request_id, url);
                Some(duplicate)
            }
        };

        match duplicate {
            None => {
                ledger.next_generation += 1;
                drop(ledger);
                self.schedule_cleanup(tab_id, generation);
                tracing::debug!(tab_id = %tab_id, request_id, url, "Cancellation registered");
                GuardDecision::Reopen
            }
            Some(true) => {
                tracing::debug!(
                    tab_id = %tab_id,
                    request_id,
                    url,
                    "Duplicate request for pending cancellation"
                );
                GuardDecision::CancelOnly
            }
            Some(false) => GuardDecision::Reopen,
        }
    }

    /// Forget the tab's pending cancellation; no-op when there is none
    pub fn clear(&self, tab_id: TabId) -> bool {
        let removed = self.lock().tabs.remove(&tab_id).is_some();
        if removed {
            tracing::debug!(tab_id = %tab_id, "Cancellation cleared");
        }
        removed
    }

    /// Current state for one tab
    pub fn state(&self, tab_id: TabId) -> CancellationState {
        self.lock().tabs.get(&tab_id).cloned().unwrap_or_default()
    }

    pub fn is_pending(&self, tab_id: TabId) -> bool {
        matches!(self.state(tab_id), CancellationState::Pending(_))
    }

    /// Number of tabs with a pending cancellation
    pub fn pending_count(&self) -> usize {
        self.lock().tabs.len()
    }

    fn schedule_cleanup(&self, tab_id: TabId, generation: u64) {
        let ledger = Arc::clone(&self.ledger);
        let delay = self.cleanup_delay;
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let mut ledger = lock_ledger(&ledger);
            // Only the entry this timer was armed for; a newer one has its own timer
            let expired = matches!(
                ledger.tabs.get(&tab_id),
                Some(CancellationState::Pending(p)) if p.generation == generation
            );
            if expired {
                ledger.tabs.remove(&tab_id);
                tracing::debug!(tab_id = %tab_id, "Cancellation expired");
            }
        });
    }
}

fn lock_ledger(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_first_cancellation_reopens() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        assert_eq!(guard.state(TabId(1)), CancellationState::Idle);

        let decision = guard.register(TabId(1), "100", "https://other.com/");
        assert_eq!(decision, GuardDecision::Reopen);
        assert!(guard.is_pending(TabId(1)));
    }

    #[tokio::test]
    async fn test_same_request_id_is_duplicate() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://yandex.ru/");
        let decision = guard.register(TabId(1), "100", "https://www.yandex.ru/");
        assert_eq!(decision, GuardDecision::CancelOnly);
    }

    #[tokio::test]
    async fn test_same_url_is_duplicate() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://yandex.ru/");
        let decision = guard.register(TabId(1), "101", "https://yandex.ru/");
        assert_eq!(decision, GuardDecision::CancelOnly);
    }

    #[tokio::test]
    async fn test_unrelated_request_on_same_tab_reopens() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://yandex.ru/");
        let decision = guard.register(TabId(1), "200", "https://other.com/");
        assert_eq!(decision, GuardDecision::Reopen);

        // recorded anyway, so a repeat of either is now a duplicate
        assert_eq!(
            guard.register(TabId(1), "300", "https://other.com/"),
            GuardDecision::CancelOnly
        );
    }

    #[tokio::test]
    async fn test_entries_only_grow() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://a.com/");
        guard.register(TabId(1), "100", "https://b.com/");
        guard.register(TabId(1), "101", "https://a.com/");

        match guard.state(TabId(1)) {
            CancellationState::Pending(p) => {
                assert_eq!(p.request_ids.len(), 2);
                assert_eq!(p.urls.len(), 2);
            }
            CancellationState::Idle => panic!("expected pending cancellation"),
        }
        assert_eq!(guard.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_tabs_are_independent() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        assert_eq!(guard.register(TabId(1), "100", "https://x.com/"), GuardDecision::Reopen);
        assert_eq!(guard.register(TabId(2), "100", "https://x.com/"), GuardDecision::Reopen);
        assert_eq!(guard.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        assert!(!guard.clear(TabId(1)));

        guard.register(TabId(1), "100", "https://x.com/");
        assert!(guard.clear(TabId(1)));
        assert!(!guard.clear(TabId(1)));
        assert_eq!(guard.state(TabId(1)), CancellationState::Idle);

        // after clearing, the same request starts a fresh entry
        assert_eq!(guard.register(TabId(1), "100", "https://x.com/"), GuardDecision::Reopen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_timeout_expires_entry() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://x.com/");

        tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
        assert!(guard.is_pending(TabId(1)));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!guard.is_pending(TabId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_spares_newer_entry() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://x.com/");

        tokio::time::sleep(Duration::from_millis(1500)).await;
        guard.clear(TabId(1));
        guard.register(TabId(1), "200", "https://y.com/");

        // first timer fires at 2000ms and must not touch the new entry
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(guard.is_pending(TabId(1)));

        // the new entry's own timer fires at 3500ms
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!guard.is_pending(TabId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_do_not_extend_timeout() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        guard.register(TabId(1), "100", "https://x.com/");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        guard.register(TabId(1), "100", "https://x.com/");

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert!(!guard.is_pending(TabId(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_armed_from_outside_runtime() {
        let guard = RequestGuard::new(DELAY, Handle::current());
        let registering = guard.clone();
        let decision = std::thread::spawn(move || {
            registering.register(TabId(1), "100", "https://x.com/")
        })
        .join()
        .unwrap();
        assert_eq!(decision, GuardDecision::Reopen);
        assert!(guard.is_pending(TabId(1)));

        tokio::time::sleep(DELAY + Duration::from_millis(1)).await;
        assert!(!guard.is_pending(TabId(1)));
    }
}
