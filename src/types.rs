//! Host-facing record types
//!
//! These mirror the shapes the browser hands to the engine: tabs, request
//! details, containers and cookies. All types use camelCase JSON
//! serialization so host adapters can pass browser objects through as-is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl TabId {
    /// Id the host uses for requests that don't belong to any tab
    pub const NONE: TabId = TabId(-1);

    /// Whether this id refers to an actual tab
    pub fn is_tab(self) -> bool {
        self != Self::NONE
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a container (cookie store)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Loading status of a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TabStatus {
    Loading,
    Complete,
}

/// Read-only view of a browser tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub id: TabId,

    /// Current URL (`about:blank` while a new tab is still resolving)
    pub url: String,

    /// Container the tab lives in
    pub cookie_store_id: ContextId,

    pub status: TabStatus,

    pub active: bool,

    /// Position within its window
    pub index: u32,

    pub window_id: i64,

    /// Private browsing tab
    #[serde(default)]
    pub incognito: bool,
}

/// Changed fields reported by a tab update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TabStatus>,
}

/// Details of an intercepted main-frame request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    /// Host-assigned request id, stable across redirects of the same request
    pub request_id: String,

    /// Owning tab, `TabId::NONE` for requests outside any tab
    pub tab_id: TabId,

    pub url: String,
}

impl RequestDetails {
    pub fn new(request_id: impl Into<String>, tab_id: TabId, url: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            tab_id,
            url: url.into(),
        }
    }
}

/// Decision handed back to the host for an intercepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Let the request proceed
    Allow,
    /// Block the request (a replacement tab may have been opened)
    Cancel,
}

impl Verdict {
    pub fn is_cancel(self) -> bool {
        matches!(self, Self::Cancel)
    }
}

/// A container as described by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDescriptor {
    pub cookie_store_id: ContextId,
    pub name: String,
    pub color: String,
    pub icon: String,
}

/// Filter for container lookups
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ContextQuery {
    /// Match every container
    pub fn all() -> Self {
        Self::default()
    }

    /// Match containers with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// A cookie as listed by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub domain: String,
    pub store_id: ContextId,
}

/// Parameters for opening a replacement tab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTab {
    pub url: String,
    pub cookie_store_id: ContextId,
    pub active: bool,
    pub index: u32,
    pub window_id: i64,
}

impl NewTab {
    /// Same placement as `tab`, new url and container
    pub fn replacing(tab: &TabRecord, url: impl Into<String>, cookie_store_id: ContextId) -> Self {
        Self {
            url: url.into(),
            cookie_store_id,
            active: tab.active,
            index: tab.index,
            window_id: tab.window_id,
        }
    }
}

/// Management info about the assignment collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorInfo {
    pub id: String,
    pub enabled: bool,
}

/// Add-on lifecycle event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleKind {
    Installed,
    Uninstalled,
    Enabled,
    Disabled,
}

impl LifecycleKind {
    /// Whether the add-on is usable after this event
    pub fn enables(self) -> bool {
        matches!(self, Self::Installed | Self::Enabled)
    }
}

/// Lifecycle event for some add-on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,

    /// Id of the add-on the event is about
    pub id: String,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// A URL-to-container assignment owned by the collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_context_id: Option<String>,

    #[serde(default)]
    pub never_ask: bool,
}
