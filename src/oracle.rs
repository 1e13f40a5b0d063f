//! Assignment oracle: ask the containers add-on whether it owns a URL
//!
//! The collaborator can pin individual URLs to a container of the user's
//! choosing. Those URLs are left alone. The oracle is fail-open: a missing,
//! disabled or misbehaving collaborator is reported as "no assignment".

use crate::host::Host;
use crate::types::{Assignment, LifecycleEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runtime message understood by the collaborator
#[derive(Debug, Serialize)]
#[serde(tag = "method", rename_all = "camelCase")]
enum CollaboratorRequest<'a> {
    GetAssignment { url: &'a str },
}

/// Fail-open view of the collaborator's URL assignments
pub struct AssignmentOracle {
    host: Arc<dyn Host>,
    collaborator_id: String,
    enabled: AtomicBool,
}

impl AssignmentOracle {
    /// Create an oracle that starts out disabled
    pub fn new(host: Arc<dyn Host>, collaborator_id: impl Into<String>) -> Self {
        Self {
            host,
            collaborator_id: collaborator_id.into(),
            enabled: AtomicBool::new(false),
        }
    }

    pub fn collaborator_id(&self) -> &str {
        &self.collaborator_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Probe the collaborator's management info and store the result
    ///
    /// A lookup failure means the add-on is absent, which counts as disabled.
    pub async fn refresh(&self) -> bool {
        let enabled = match self.host.collaborator_info(&self.collaborator_id).await {
            Ok(info) => info.enabled,
            Err(e) => {
                tracing::debug!(
                    collaborator = %self.collaborator_id,
                    error = %e,
                    "Collaborator not available"
                );
                false
            }
        };
        self.enabled.store(enabled, Ordering::Relaxed);
        enabled
    }

    /// Track install/uninstall/enable/disable of the collaborator
    ///
    /// Events about other add-ons are ignored. Returns whether the flag changed.
    pub fn handle_lifecycle(&self, event: &LifecycleEvent) -> bool {
        if event.id != self.collaborator_id {
            return false;
        }
        let enabled = event.kind.enables();
        let previous = self.enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            tracing::info!(
                collaborator = %self.collaborator_id,
                kind = ?event.kind,
                enabled,
                "Collaborator state changed"
            );
        }
        previous != enabled
    }

    /// The collaborator's assignment for `url`, if any
    ///
    /// Returns `None` without sending anything while the collaborator is
    /// disabled, and `None` when the message fails.
    pub async fn get_assignment(&self, url: &str) -> Option<Assignment> {
        if !self.is_enabled() {
            return None;
        }

        let message = match serde_json::to_value(CollaboratorRequest::GetAssignment { url }) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode assignment query");
                return None;
            }
        };

        match self.host.send_message(&self.collaborator_id, message).await {
            Ok(reply) => parse_reply(reply),
            Err(e) => {
                tracing::debug!(
                    collaborator = %self.collaborator_id,
                    url = %url,
                    error = %e,
                    "Assignment query failed, treating as unassigned"
                );
                None
            }
        }
    }

    /// Whether `url` is pinned by the collaborator
    pub async fn is_assigned(&self, url: &str) -> bool {
        self.get_assignment(url).await.is_some()
    }
}

/// Interpret a collaborator reply; anything falsy means no assignment
fn parse_reply(reply: serde_json::Value) -> Option<Assignment> {
    use serde_json::Value;

    match reply {
        Value::Null | Value::Bool(false) => None,
        Value::Number(ref n) if n.as_f64() == Some(0.0) => None,
        Value::String(ref s) if s.is_empty() => None,
        Value::Object(map) => Some(serde_json::from_value(Value::Object(map)).unwrap_or_default()),
        _ => Some(Assignment::default()),
    }
}
