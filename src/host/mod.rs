//! Host traits: the browser surface the engine consumes
//!
//! The engine never talks to a browser directly. A host adapter implements
//! these traits over the real tab, container, cookie and management APIs
//! and forwards browser events into `Containment`'s handlers.

use crate::error::Result;
use crate::types::{
    CollaboratorInfo, ContextDescriptor, ContextId, ContextQuery, Cookie, NewTab, TabId,
    TabRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod memory;

/// Container (contextual identity) operations
#[async_trait]
pub trait ContextApi: Send + Sync {
    /// List containers matching `query`
    async fn query_contexts(&self, query: &ContextQuery) -> Result<Vec<ContextDescriptor>>;

    /// Create a new container
    async fn create_context(
        &self,
        name: &str,
        color: &str,
        icon: &str,
    ) -> Result<ContextDescriptor>;
}

/// Cookie store operations
#[async_trait]
pub trait CookieApi: Send + Sync {
    /// List cookies for `domain` (and its subdomains) in one cookie store
    async fn list_cookies(&self, domain: &str, store_id: &ContextId) -> Result<Vec<Cookie>>;

    /// Remove the cookie `name` that would be sent to `url` from one cookie store
    async fn remove_cookie(&self, name: &str, url: &str, store_id: &ContextId) -> Result<()>;
}

/// Tab operations and the tab-update feed
#[async_trait]
pub trait TabApi: Send + Sync {
    async fn get_tab(&self, tab_id: TabId) -> Result<TabRecord>;

    /// List every open tab
    async fn query_tabs(&self) -> Result<Vec<TabRecord>>;

    /// Open a tab, returning its id
    async fn create_tab(&self, tab: &NewTab) -> Result<TabId>;

    async fn remove_tab(&self, tab_id: TabId) -> Result<()>;

    /// Start forwarding tab updates to `Containment::handle_tab_updated`
    fn watch_tab_updates(&self);

    /// Stop forwarding tab updates
    fn unwatch_tab_updates(&self);
}

/// Request interception feeds
pub trait RequestApi: Send + Sync {
    /// Start forwarding matching requests to `Containment::handle_request`,
    /// holding each request until the handler returns when `blocking` is set
    fn watch_requests(&self, filter: &RequestFilter, blocking: bool);

    /// Start forwarding completion and error signals for matching requests
    /// to `Containment::handle_request_finished`
    fn watch_request_outcomes(&self, filter: &RequestFilter);
}

/// Management and messaging for the assignment collaborator add-on
#[async_trait]
pub trait CollaboratorApi: Send + Sync {
    /// Fails when the add-on is not installed
    async fn collaborator_info(&self, id: &str) -> Result<CollaboratorInfo>;

    /// Send a runtime message, returning the add-on's reply
    async fn send_message(&self, id: &str, message: serde_json::Value)
        -> Result<serde_json::Value>;
}

/// Everything the engine needs from the browser
pub trait Host: ContextApi + CookieApi + TabApi + RequestApi + CollaboratorApi {}

impl<T> Host for T where T: ContextApi + CookieApi + TabApi + RequestApi + CollaboratorApi {}

/// URL and resource-type filter for request feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub urls: Vec<String>,
    pub types: Vec<String>,
}

impl RequestFilter {
    /// Top-level navigations to any URL
    pub fn main_frame() -> Self {
        Self {
            urls: vec!["<all_urls>".to_string()],
            types: vec!["main_frame".to_string()],
        }
    }
}

/// Replace `tab` with a new tab at `url` in `target`, keeping its window,
/// position and active flag, then close the original
///
/// Host failures are logged; the caller's verdict does not depend on them.
pub async fn reopen_tab(host: &dyn Host, tab: &TabRecord, url: &str, target: ContextId) -> bool {
    let new_tab = NewTab::replacing(tab, url, target);
    if let Err(e) = host.create_tab(&new_tab).await {
        tracing::warn!(
            tab_id = %tab.id,
            url = %url,
            target = %new_tab.cookie_store_id,
            error = %e,
            "Failed to open replacement tab"
        );
        return false;
    }
    if let Err(e) = host.remove_tab(tab.id).await {
        tracing::warn!(tab_id = %tab.id, error = %e, "Failed to close original tab");
    }

    tracing::info!(
        tab_id = %tab.id,
        url = %url,
        from = %tab.cookie_store_id,
        to = %new_tab.cookie_store_id,
        "Tab reopened in another container"
    );
    true
}
