//! In-memory host for testing and single-process embedding
//!
//! Simulates just enough of the browser: containers, cookie stores, tabs,
//! the collaborator add-on, and the subscription state of each event feed.
//! Every side effect the engine causes is recorded for inspection.

use super::{CollaboratorApi, ContextApi, CookieApi, RequestApi, RequestFilter, TabApi};
use crate::error::{ContainError, Result};
use crate::matcher::host_of;
use crate::types::{
    Assignment, CollaboratorInfo, ContextDescriptor, ContextId, ContextQuery, Cookie, NewTab,
    TabId, TabRecord, TabStatus,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A cookie removal the engine asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieRemoval {
    pub name: String,
    pub url: String,
    pub store_id: ContextId,
}

#[derive(Debug, Default)]
struct CollaboratorState {
    enabled: bool,
    failing: bool,
    assignments: HashMap<String, Assignment>,
}

#[derive(Debug, Default)]
struct HostState {
    contexts: Vec<ContextDescriptor>,
    next_context: u32,
    fail_contexts: bool,

    cookies: Vec<Cookie>,
    failing_cookies: HashSet<String>,
    cookie_removals: Vec<CookieRemoval>,

    tabs: BTreeMap<TabId, TabRecord>,
    next_tab: i64,
    fail_tab_creation: bool,
    created_tabs: Vec<NewTab>,
    removed_tabs: Vec<TabId>,

    tab_updates_watched: bool,
    tab_update_watches: usize,
    request_watch: Option<(RequestFilter, bool)>,
    outcome_watch: Option<RequestFilter>,

    collaborators: HashMap<String, CollaboratorState>,
    messages_sent: usize,
}

/// In-memory browser host
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ─── Setup ───────────────────────────────────────────────────

    /// Add a container, returning its cookie store id
    pub fn add_context(&self, name: &str) -> ContextId {
        let mut state = self.lock();
        allocate_context(&mut state, name, "blue", "fingerprint").cookie_store_id
    }

    /// Make container lookups and creation fail
    pub fn fail_contexts(&self, fail: bool) {
        self.lock().fail_contexts = fail;
    }

    /// Insert a tab as-is
    pub fn insert_tab(&self, tab: TabRecord) {
        let mut state = self.lock();
        state.next_tab = state.next_tab.max(tab.id.0 + 1);
        state.tabs.insert(tab.id, tab);
    }

    /// Open a fully loaded tab at `url` in `store_id`
    pub fn open_tab(&self, url: &str, store_id: &ContextId) -> TabId {
        let mut state = self.lock();
        let id = TabId(state.next_tab);
        state.next_tab += 1;
        let index = state.tabs.len() as u32;
        state.tabs.insert(
            id,
            TabRecord {
                id,
                url: url.to_string(),
                cookie_store_id: store_id.clone(),
                status: TabStatus::Complete,
                active: false,
                index,
                window_id: 1,
                incognito: false,
            },
        );
        id
    }

    /// Make `create_tab` fail
    pub fn fail_tab_creation(&self, fail: bool) {
        self.lock().fail_tab_creation = fail;
    }

    /// Apply a navigation to an existing tab
    pub fn navigate(&self, tab_id: TabId, url: &str, status: TabStatus) {
        if let Some(tab) = self.lock().tabs.get_mut(&tab_id) {
            tab.url = url.to_string();
            tab.status = status;
        }
    }

    pub fn add_cookie(&self, domain: &str, name: &str, store_id: &ContextId) {
        self.lock().cookies.push(Cookie {
            name: name.to_string(),
            domain: domain.to_string(),
            store_id: store_id.clone(),
        });
    }

    /// Make removal of cookies named `name` fail
    pub fn fail_cookie_removal(&self, name: &str) {
        self.lock().failing_cookies.insert(name.to_string());
    }

    /// Install the collaborator add-on
    pub fn install_collaborator(&self, id: &str, enabled: bool) {
        self.lock().collaborators.insert(
            id.to_string(),
            CollaboratorState {
                enabled,
                ..CollaboratorState::default()
            },
        );
    }

    pub fn uninstall_collaborator(&self, id: &str) {
        self.lock().collaborators.remove(id);
    }

    pub fn set_collaborator_enabled(&self, id: &str, enabled: bool) {
        if let Some(collaborator) = self.lock().collaborators.get_mut(id) {
            collaborator.enabled = enabled;
        }
    }

    /// Make the collaborator reject every message
    pub fn set_collaborator_failing(&self, id: &str, failing: bool) {
        if let Some(collaborator) = self.lock().collaborators.get_mut(id) {
            collaborator.failing = failing;
        }
    }

    /// Pin `url` to a container in the collaborator
    pub fn assign(&self, id: &str, url: &str, assignment: Assignment) {
        if let Some(collaborator) = self.lock().collaborators.get_mut(id) {
            collaborator.assignments.insert(url.to_string(), assignment);
        }
    }

    // ─── Inspection ──────────────────────────────────────────────

    pub fn contexts(&self) -> Vec<ContextDescriptor> {
        self.lock().contexts.clone()
    }

    pub fn tab(&self, tab_id: TabId) -> Option<TabRecord> {
        self.lock().tabs.get(&tab_id).cloned()
    }

    /// Tabs opened through `create_tab`, in order
    pub fn created_tabs(&self) -> Vec<NewTab> {
        self.lock().created_tabs.clone()
    }

    /// Tabs closed through `remove_tab`, in order
    pub fn removed_tabs(&self) -> Vec<TabId> {
        self.lock().removed_tabs.clone()
    }

    /// Cookies currently held by one store
    pub fn cookies(&self, store_id: &ContextId) -> Vec<Cookie> {
        self.lock()
            .cookies
            .iter()
            .filter(|c| &c.store_id == store_id)
            .cloned()
            .collect()
    }

    /// Every removal request, including failed ones
    pub fn cookie_removals(&self) -> Vec<CookieRemoval> {
        self.lock().cookie_removals.clone()
    }

    pub fn is_watching_tab_updates(&self) -> bool {
        self.lock().tab_updates_watched
    }

    /// Number of times the tab-update feed was switched on
    pub fn tab_update_watches(&self) -> usize {
        self.lock().tab_update_watches
    }

    pub fn request_watch(&self) -> Option<(RequestFilter, bool)> {
        self.lock().request_watch.clone()
    }

    pub fn outcome_watch(&self) -> Option<RequestFilter> {
        self.lock().outcome_watch.clone()
    }

    /// Messages delivered to any collaborator
    pub fn messages_sent(&self) -> usize {
        self.lock().messages_sent
    }
}

fn allocate_context(
    state: &mut HostState,
    name: &str,
    color: &str,
    icon: &str,
) -> ContextDescriptor {
    state.next_context += 1;
    let descriptor = ContextDescriptor {
        cookie_store_id: ContextId::new(format!("firefox-container-{}", state.next_context)),
        name: name.to_string(),
        color: color.to_string(),
        icon: icon.to_string(),
    };
    state.contexts.push(descriptor.clone());
    descriptor
}

/// RFC 6265 domain-match: `host` equals `domain` or is a subdomain of it
fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{}", domain))
}

#[async_trait]
impl ContextApi for MemoryHost {
    async fn query_contexts(&self, query: &ContextQuery) -> Result<Vec<ContextDescriptor>> {
        let state = self.lock();
        if state.fail_contexts {
            return Err(ContainError::Host("contextualIdentities.query failed".into()));
        }
        Ok(state
            .contexts
            .iter()
            .filter(|c| query.name.as_ref().map_or(true, |n| &c.name == n))
            .cloned()
            .collect())
    }

    async fn create_context(
        &self,
        name: &str,
        color: &str,
        icon: &str,
    ) -> Result<ContextDescriptor> {
        let mut state = self.lock();
        if state.fail_contexts {
            return Err(ContainError::Host("contextualIdentities.create failed".into()));
        }
        Ok(allocate_context(&mut state, name, color, icon))
    }
}

#[async_trait]
impl CookieApi for MemoryHost {
    async fn list_cookies(&self, domain: &str, store_id: &ContextId) -> Result<Vec<Cookie>> {
        let state = self.lock();
        Ok(state
            .cookies
            .iter()
            .filter(|c| &c.store_id == store_id)
            .filter(|c| domain_matches(c.domain.trim_start_matches('.'), domain))
            .cloned()
            .collect())
    }

    async fn remove_cookie(&self, name: &str, url: &str, store_id: &ContextId) -> Result<()> {
        let mut state = self.lock();
        state.cookie_removals.push(CookieRemoval {
            name: name.to_string(),
            url: url.to_string(),
            store_id: store_id.clone(),
        });
        if state.failing_cookies.contains(name) {
            return Err(ContainError::Host(format!("cookies.remove failed for '{}'", name)));
        }
        let host = host_of(url).ok_or_else(|| ContainError::InvalidUrl {
            url: url.to_string(),
            reason: "no host".to_string(),
        })?;
        // The browser removes at most one cookie per call
        if let Some(pos) = state.cookies.iter().position(|c| {
            c.name == name && &c.store_id == store_id && domain_matches(&host, &c.domain)
        }) {
            state.cookies.remove(pos);
        }
        Ok(())
    }
}

#[async_trait]
impl TabApi for MemoryHost {
    async fn get_tab(&self, tab_id: TabId) -> Result<TabRecord> {
        self.lock()
            .tabs
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| ContainError::Host(format!("Invalid tab ID: {}", tab_id)))
    }

    async fn query_tabs(&self) -> Result<Vec<TabRecord>> {
        Ok(self.lock().tabs.values().cloned().collect())
    }

    async fn create_tab(&self, tab: &NewTab) -> Result<TabId> {
        let mut state = self.lock();
        if state.fail_tab_creation {
            return Err(ContainError::Host("tabs.create failed".into()));
        }
        let id = TabId(state.next_tab);
        state.next_tab += 1;
        state.tabs.insert(
            id,
            TabRecord {
                id,
                url: tab.url.clone(),
                cookie_store_id: tab.cookie_store_id.clone(),
                status: TabStatus::Loading,
                active: tab.active,
                index: tab.index,
                window_id: tab.window_id,
                incognito: false,
            },
        );
        state.created_tabs.push(tab.clone());
        Ok(id)
    }

    async fn remove_tab(&self, tab_id: TabId) -> Result<()> {
        let mut state = self.lock();
        if state.tabs.remove(&tab_id).is_none() {
            return Err(ContainError::Host(format!("Invalid tab ID: {}", tab_id)));
        }
        state.removed_tabs.push(tab_id);
        Ok(())
    }

    fn watch_tab_updates(&self) {
        let mut state = self.lock();
        state.tab_updates_watched = true;
        state.tab_update_watches += 1;
    }

    fn unwatch_tab_updates(&self) {
        self.lock().tab_updates_watched = false;
    }
}

impl RequestApi for MemoryHost {
    fn watch_requests(&self, filter: &RequestFilter, blocking: bool) {
        self.lock().request_watch = Some((filter.clone(), blocking));
    }

    fn watch_request_outcomes(&self, filter: &RequestFilter) {
        self.lock().outcome_watch = Some(filter.clone());
    }
}

#[async_trait]
impl CollaboratorApi for MemoryHost {
    async fn collaborator_info(&self, id: &str) -> Result<CollaboratorInfo> {
        let state = self.lock();
        let collaborator = state.collaborators.get(id).ok_or_else(|| ContainError::Collaborator {
            id: id.to_string(),
            reason: "add-on not installed".to_string(),
        })?;
        Ok(CollaboratorInfo {
            id: id.to_string(),
            enabled: collaborator.enabled,
        })
    }

    async fn send_message(
        &self,
        id: &str,
        message: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut state = self.lock();
        let rejected = |reason: &str| ContainError::Collaborator {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        let collaborator = match state.collaborators.get(id) {
            Some(c) if c.enabled && !c.failing => c,
            Some(c) if c.failing => return Err(rejected("message rejected")),
            _ => {
                return Err(rejected(
                    "Could not establish connection. Receiving end does not exist.",
                ))
            }
        };

        let reply = match (message["method"].as_str(), message["url"].as_str()) {
            (Some("getAssignment"), Some(url)) => match collaborator.assignments.get(url) {
                Some(assignment) => serde_json::to_value(assignment)?,
                None => serde_json::Value::Null,
            },
            _ => return Err(rejected("unknown method")),
        };

        state.messages_sent += 1;
        Ok(reply)
    }
}
