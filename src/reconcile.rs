//! Startup reconciliation of already-open tabs
//!
//! Tabs opened before the engine started get the same policy treatment as
//! live requests. A new tab can briefly show `about:blank` before its real
//! destination is known; such tabs are parked in the awaiting-load set and
//! evaluated once the host reports their URL.

use crate::error::Result;
use crate::host::{reopen_tab, Host};
use crate::oracle::AssignmentOracle;
use crate::policy::ContainmentPolicy;
use crate::types::{TabChange, TabId, TabRecord, TabStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// URL shown by a tab whose destination is not known yet
pub const PLACEHOLDER_URL: &str = "about:blank";

/// Active subscription to the host's tab-update feed
///
/// The feed is switched on when the guard is acquired and off when it drops.
pub struct TabUpdateSubscription {
    host: Arc<dyn Host>,
}

impl TabUpdateSubscription {
    fn acquire(host: Arc<dyn Host>) -> Self {
        host.watch_tab_updates();
        tracing::debug!("Tab update feed subscribed");
        Self { host }
    }
}

impl Drop for TabUpdateSubscription {
    fn drop(&mut self) {
        self.host.unwatch_tab_updates();
        tracing::debug!("Tab update feed unsubscribed");
    }
}

#[derive(Default)]
struct AwaitingInner {
    tabs: HashSet<TabId>,
    subscription: Option<TabUpdateSubscription>,
}

/// Tabs whose destination is not yet known
///
/// Holds a `TabUpdateSubscription` exactly while the set is non-empty.
pub struct AwaitingLoad {
    host: Arc<dyn Host>,
    inner: Mutex<AwaitingInner>,
}

impl AwaitingLoad {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            inner: Mutex::new(AwaitingInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AwaitingInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start waiting for `tab_id`; returns false if it was already awaited
    pub fn insert(&self, tab_id: TabId) -> bool {
        let mut inner = self.lock();
        let inserted = inner.tabs.insert(tab_id);
        if inner.subscription.is_none() {
            inner.subscription = Some(TabUpdateSubscription::acquire(self.host.clone()));
        }
        inserted
    }

    /// Stop waiting for `tab_id`; releases the subscription when the set empties
    pub fn remove(&self, tab_id: TabId) -> bool {
        let released = {
            let mut inner = self.lock();
            if !inner.tabs.remove(&tab_id) {
                return false;
            }
            if inner.tabs.is_empty() {
                inner.subscription.take()
            } else {
                None
            }
        };
        // unsubscribe outside the lock
        drop(released);
        true
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.lock().tabs.contains(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.lock().tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tabs.is_empty()
    }

    /// Whether the tab-update feed is currently held
    pub fn is_subscribed(&self) -> bool {
        self.lock().subscription.is_some()
    }

    /// Apply a tab update; returns the tab when it is now ready for evaluation
    ///
    /// A URL change on an awaited tab hands it back for evaluation. A tab that
    /// finished loading without one is simply dropped from the set.
    pub fn on_tab_updated(
        &self,
        tab_id: TabId,
        change: &TabChange,
        tab: &TabRecord,
    ) -> Option<TabRecord> {
        if change.url.is_some() && self.remove(tab_id) {
            return Some(tab.clone());
        }
        if tab.status == TabStatus::Complete && self.remove(tab_id) {
            tracing::debug!(tab_id = %tab_id, "Awaited tab loaded without a new url");
        }
        None
    }
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Tabs inspected
    pub scanned: usize,
    /// Tabs reopened in another container
    pub reopened: usize,
    /// Placeholder tabs parked until their url is known
    pub deferred: usize,
    /// Private tabs left alone
    pub private: usize,
}

/// Applies the containment policy to tabs that were open before startup
pub struct TabReconciler {
    host: Arc<dyn Host>,
    oracle: Arc<AssignmentOracle>,
    policy: Arc<ContainmentPolicy>,
    awaiting: Arc<AwaitingLoad>,
}

impl TabReconciler {
    pub fn new(
        host: Arc<dyn Host>,
        oracle: Arc<AssignmentOracle>,
        policy: Arc<ContainmentPolicy>,
        awaiting: Arc<AwaitingLoad>,
    ) -> Self {
        Self {
            host,
            oracle,
            policy,
            awaiting,
        }
    }

    pub fn awaiting(&self) -> &AwaitingLoad {
        &self.awaiting
    }

    /// Scan every open tab once
    pub async fn run(&self) -> Result<ReconcileReport> {
        let tabs = self.host.query_tabs().await?;
        let mut report = ReconcileReport {
            scanned: tabs.len(),
            ..ReconcileReport::default()
        };

        let mut ready = Vec::new();
        for tab in tabs {
            if tab.incognito {
                report.private += 1;
                continue;
            }
            if tab.url == PLACEHOLDER_URL {
                if tab.status == TabStatus::Loading {
                    self.awaiting.insert(tab.id);
                    report.deferred += 1;
                }
                continue;
            }
            ready.push(tab);
        }

        let outcomes =
            futures::future::join_all(ready.iter().map(|tab| self.maybe_reopen(tab))).await;
        report.reopened = outcomes.into_iter().filter(|reopened| *reopened).count();

        tracing::info!(
            scanned = report.scanned,
            reopened = report.reopened,
            deferred = report.deferred,
            "Open tabs reconciled"
        );
        Ok(report)
    }

    /// Feed a tab update; evaluates awaited tabs once their url is known
    pub async fn handle_tab_updated(
        &self,
        tab_id: TabId,
        change: &TabChange,
        tab: &TabRecord,
    ) -> bool {
        match self.awaiting.on_tab_updated(tab_id, change, tab) {
            Some(tab) => self.maybe_reopen(&tab).await,
            None => false,
        }
    }

    /// Reopen `tab` if the policy moves it; assigned urls are never reopened
    pub async fn maybe_reopen(&self, tab: &TabRecord) -> bool {
        if self.oracle.is_assigned(&tab.url).await {
            tracing::debug!(tab_id = %tab.id, url = %tab.url, "Assigned by collaborator, not reopening");
            return false;
        }
        match self.policy.decide(&tab.url, tab) {
            Some(target) => reopen_tab(self.host.as_ref(), tab, &tab.url, target).await,
            None => false,
        }
    }
}
