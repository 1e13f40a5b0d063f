//! Containment engine: owns all runtime state and handles host events
//!
//! `Containment` is the single coordinating component. The host adapter
//! constructs it, calls `start()` once, and then forwards browser events to
//! the `handle_*` methods. All mutable state (the pending request ledger, the
//! awaiting-load set, the collaborator flag) lives here and is reached only
//! through these handlers.

use crate::config::ContainConfig;
use crate::cookies::{CookieSanitizer, SanitizeReport};
use crate::error::{ContainError, Result};
use crate::guard::{GuardDecision, RequestGuard};
use crate::host::{reopen_tab, Host, RequestFilter};
use crate::matcher::DomainMatcher;
use crate::oracle::AssignmentOracle;
use crate::policy::ContainmentPolicy;
use crate::reconcile::{AwaitingLoad, ReconcileReport, TabReconciler};
use crate::types::{
    ContextId, ContextQuery, LifecycleEvent, RequestDetails, TabChange, TabId, TabRecord, Verdict,
};
use std::sync::{Arc, OnceLock};
use tokio::runtime::Handle;

/// State that only exists once the dedicated container is known
struct Ready {
    policy: Arc<ContainmentPolicy>,
    reconciler: TabReconciler,
    guard: RequestGuard,
    runtime: Handle,
}

/// Outcome of `Containment::start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// Cookie store id of the dedicated container
    pub isolated: ContextId,

    /// Whether the container had to be created
    pub created_container: bool,

    /// `None` if the sanitizer pass could not run
    pub cookies: Option<SanitizeReport>,

    /// `None` if open tabs could not be listed
    pub reconcile: Option<ReconcileReport>,
}

/// Domain containment engine
pub struct Containment {
    host: Arc<dyn Host>,
    config: ContainConfig,
    matcher: DomainMatcher,
    oracle: Arc<AssignmentOracle>,
    awaiting: Arc<AwaitingLoad>,
    ready: OnceLock<Ready>,
}

impl Containment {
    /// Validate `config` and compile the domain matcher
    pub fn new(host: Arc<dyn Host>, config: ContainConfig) -> Result<Self> {
        config.validate()?;
        let matcher = DomainMatcher::new(&config.domains)?;
        let oracle = Arc::new(AssignmentOracle::new(
            host.clone(),
            config.collaborator_id.clone(),
        ));
        let awaiting = Arc::new(AwaitingLoad::new(host.clone()));

        Ok(Self {
            host,
            config,
            matcher,
            oracle,
            awaiting,
            ready: OnceLock::new(),
        })
    }

    /// Bring the engine up
    ///
    /// Must be driven by a tokio runtime; replacement tabs and cleanup timers
    /// are spawned on it for the engine's lifetime.
    ///
    /// Resolves the dedicated container first; if that fails nothing else is
    /// started and requests keep passing through untouched. Afterwards the
    /// request feeds go live, and the cookie sanitizer and open-tab
    /// reconciliation run side by side.
    pub async fn start(&self) -> Result<StartupReport> {
        if self.ready.get().is_some() {
            return Err(ContainError::Config("containment already started".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| ContainError::Config(format!("no tokio runtime: {}", e)))?;

        let collaborator = self.oracle.refresh().await;
        tracing::debug!(enabled = collaborator, "Collaborator probed");

        let (isolated, created_container) = match self.setup_container().await {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(
                    container = %self.config.container_name,
                    error = %e,
                    "Container setup failed, containment disabled"
                );
                return Err(e);
            }
        };

        let default = ContextId::new(self.config.default_context_id.clone());
        let policy = Arc::new(ContainmentPolicy::new(
            self.matcher.clone(),
            isolated.clone(),
            default.clone(),
        ));
        let reconciler = TabReconciler::new(
            self.host.clone(),
            self.oracle.clone(),
            policy.clone(),
            self.awaiting.clone(),
        );
        let guard = RequestGuard::new(self.config.cleanup_delay(), runtime.clone());
        let ready = Ready {
            policy,
            reconciler,
            guard,
            runtime,
        };
        if self.ready.set(ready).is_err() {
            return Err(ContainError::Config("containment already started".into()));
        }

        let filter = RequestFilter::main_frame();
        self.host.watch_request_outcomes(&filter);
        self.host.watch_requests(&filter, true);

        tracing::info!(
            container = %self.config.container_name,
            isolated = %isolated,
            domains = self.matcher.len(),
            "Containment started"
        );

        let sanitizer = CookieSanitizer::new(
            self.host.clone(),
            self.oracle.clone(),
            isolated.clone(),
            default,
            self.config.domains.clone(),
        )
        .with_www_assignments(self.config.check_www_assignments);

        let reconciler = &self.ready_state()?.reconciler;
        let (cookies, reconcile) = futures::join!(sanitizer.run(), reconciler.run());

        let cookies = match cookies {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Cookie sanitizer failed");
                None
            }
        };
        let reconcile = match reconcile {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Open tab reconciliation failed");
                None
            }
        };

        Ok(StartupReport {
            isolated,
            created_container,
            cookies,
            reconcile,
        })
    }

    /// Find the dedicated container by name, creating it if missing
    async fn setup_container(&self) -> Result<(ContextId, bool)> {
        let name = &self.config.container_name;
        let setup_err = |e: ContainError| ContainError::ContextSetup {
            name: name.clone(),
            reason: e.to_string(),
        };

        let existing = self
            .host
            .query_contexts(&ContextQuery::named(name.clone()))
            .await
            .map_err(setup_err)?;
        if let Some(context) = existing.into_iter().next() {
            return Ok((context.cookie_store_id, false));
        }

        let context = self
            .host
            .create_context(
                name,
                &self.config.container_color,
                &self.config.container_icon,
            )
            .await
            .map_err(setup_err)?;
        tracing::info!(container = %name, isolated = %context.cookie_store_id, "Container created");
        Ok((context.cookie_store_id, true))
    }

    fn ready_state(&self) -> Result<&Ready> {
        self.ready
            .get()
            .ok_or_else(|| ContainError::Config("containment not started".into()))
    }

    /// Decide an intercepted main-frame request
    ///
    /// Only already-available tab metadata is consulted. When the request
    /// has to move, the replacement tab is opened in the background (once per
    /// navigation) and the original request is cancelled.
    pub async fn handle_request(&self, details: &RequestDetails) -> Verdict {
        let Some(ready) = self.ready.get() else {
            return Verdict::Allow;
        };
        if !details.tab_id.is_tab() {
            return Verdict::Allow;
        }

        // A live request supersedes any startup wait for this tab
        self.awaiting.remove(details.tab_id);

        // Assignments can change at any time, so ask on every request
        if self.oracle.is_assigned(&details.url).await {
            tracing::debug!(url = %details.url, "Assigned by collaborator, not handling");
            return Verdict::Allow;
        }

        let tab = match self.host.get_tab(details.tab_id).await {
            Ok(tab) => tab,
            Err(e) => {
                tracing::warn!(tab_id = %details.tab_id, error = %e, "Tab lookup failed");
                return Verdict::Allow;
            }
        };
        if tab.incognito {
            return Verdict::Allow;
        }

        let Some(target) = ready.policy.decide(&details.url, &tab) else {
            return Verdict::Allow;
        };

        match ready
            .guard
            .register(details.tab_id, &details.request_id, &details.url)
        {
            GuardDecision::CancelOnly => Verdict::Cancel,
            GuardDecision::Reopen => {
                self.spawn_reopen(&ready.runtime, tab, details.url.clone(), target);
                Verdict::Cancel
            }
        }
    }

    /// Replace the tab without holding up the verdict
    fn spawn_reopen(&self, runtime: &Handle, tab: TabRecord, url: String, target: ContextId) {
        let host = self.host.clone();
        runtime.spawn(async move {
            reopen_tab(host.as_ref(), &tab, &url, target).await;
        });
    }

    /// Completion or error of a main-frame request
    pub fn handle_request_finished(&self, details: &RequestDetails) {
        if let Some(ready) = self.ready.get() {
            ready.guard.clear(details.tab_id);
        }
    }

    /// Tab update from the host's tab-update feed
    pub async fn handle_tab_updated(
        &self,
        tab_id: TabId,
        change: &TabChange,
        tab: &TabRecord,
    ) -> bool {
        match self.ready.get() {
            Some(ready) => ready.reconciler.handle_tab_updated(tab_id, change, tab).await,
            None => false,
        }
    }

    /// Add-on install/uninstall/enable/disable event
    pub fn handle_lifecycle(&self, event: &LifecycleEvent) {
        self.oracle.handle_lifecycle(event);
    }

    pub fn config(&self) -> &ContainConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.ready.get().is_some()
    }

    /// Cookie store id of the dedicated container, once started
    pub fn isolated_context(&self) -> Option<&ContextId> {
        self.ready.get().map(|ready| ready.policy.isolated())
    }

    /// Policy in effect, once started
    pub fn policy(&self) -> Option<&ContainmentPolicy> {
        self.ready.get().map(|ready| ready.policy.as_ref())
    }

    pub fn matcher(&self) -> &DomainMatcher {
        &self.matcher
    }

    pub fn oracle(&self) -> &AssignmentOracle {
        &self.oracle
    }

    /// Pending request ledger, once started
    pub fn guard(&self) -> Option<&RequestGuard> {
        self.ready.get().map(|ready| &ready.guard)
    }

    pub fn awaiting(&self) -> &AwaitingLoad {
        &self.awaiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::types::TabStatus;

    fn engine(host: &Arc<MemoryHost>) -> Containment {
        Containment::new(host.clone(), ContainConfig::with_domains(["example.com"])).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let host = Arc::new(MemoryHost::new());
        let config = ContainConfig::with_domains(["bad domain"]);
        assert!(Containment::new(host, config).is_err());
    }

    #[tokio::test]
    async fn test_start_creates_container() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);

        let report = engine.start().await.unwrap();
        assert!(report.created_container);
        assert!(engine.is_started());

        let contexts = host.contexts();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].name, "Yandex");
        assert_eq!(contexts[0].color, "yellow");
        assert_eq!(contexts[0].icon, "briefcase");
        assert_eq!(engine.isolated_context(), Some(&contexts[0].cookie_store_id));
    }

    #[tokio::test]
    async fn test_start_reuses_container() {
        let host = Arc::new(MemoryHost::new());
        let existing = host.add_context("Yandex");
        let engine = engine(&host);

        let report = engine.start().await.unwrap();
        assert!(!report.created_container);
        assert_eq!(report.isolated, existing);
        assert_eq!(host.contexts().len(), 1);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        engine.start().await.unwrap();
        assert!(engine.start().await.is_err());
    }

    #[tokio::test]
    async fn test_setup_failure_halts() {
        let host = Arc::new(MemoryHost::new());
        host.fail_contexts(true);
        let default = ContextId::new("firefox-default");
        host.open_tab("https://example.com/", &default);
        host.add_cookie(".example.com", "sid", &default);
        let engine = engine(&host);

        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, ContainError::ContextSetup { .. }));
        assert!(!engine.is_started());
        assert!(host.request_watch().is_none());
        assert!(host.outcome_watch().is_none());
        assert!(host.created_tabs().is_empty());
        assert_eq!(host.cookies(&default).len(), 1);
    }

    #[test]
    fn test_start_requires_tokio_runtime() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);

        let err = futures::executor::block_on(engine.start()).unwrap_err();
        assert!(matches!(err, ContainError::Config(_)));
        assert!(!engine.is_started());
        assert!(engine.guard().is_none());
        assert!(host.contexts().is_empty());
        assert!(host.request_watch().is_none());
    }

    #[tokio::test]
    async fn test_requests_before_start_pass_through() {
        let host = Arc::new(MemoryHost::new());
        let default = ContextId::new("firefox-default");
        let tab = host.open_tab("about:blank", &default);
        let engine = engine(&host);

        let verdict = engine
            .handle_request(&RequestDetails::new("1", tab, "https://example.com/"))
            .await;
        assert_eq!(verdict, Verdict::Allow);
        assert!(host.created_tabs().is_empty());
    }

    #[tokio::test]
    async fn test_start_subscribes_request_feeds() {
        let host = Arc::new(MemoryHost::new());
        let engine = engine(&host);
        engine.start().await.unwrap();

        assert_eq!(host.request_watch(), Some((RequestFilter::main_frame(), true)));
        assert_eq!(host.outcome_watch(), Some(RequestFilter::main_frame()));
    }

    #[tokio::test]
    async fn test_request_clears_awaited_tab() {
        let host = Arc::new(MemoryHost::new());
        let default = ContextId::new("firefox-default");
        host.insert_tab(TabRecord {
            id: TabId(9),
            url: "about:blank".into(),
            cookie_store_id: default.clone(),
            status: TabStatus::Loading,
            active: true,
            index: 0,
            window_id: 1,
            incognito: false,
        });
        let engine = engine(&host);
        engine.start().await.unwrap();
        assert!(engine.awaiting().contains(TabId(9)));

        engine
            .handle_request(&RequestDetails::new("5", TabId(9), "https://other.com/"))
            .await;
        assert!(engine.awaiting().is_empty());
        assert!(!host.is_watching_tab_updates());
    }
}
