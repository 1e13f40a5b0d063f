//! # contain-domains
//!
//! Keeps a named set of domains inside a dedicated browser container, and
//! everything else out of it.
//!
//! ## Overview
//!
//! `contain-domains` is the decision engine behind a container-isolation
//! browser extension. Every main-frame navigation is classified; requests for
//! in-scope domains outside the dedicated container, and requests for other
//! domains inside it, are cancelled and reopened in the right place. A
//! per-tab ledger makes sure redirect chains produce one replacement tab,
//! not several.
//!
//! ## Quick Start
//!
//! ```rust
//! use contain_domains::{Containment, ContainConfig, RequestDetails, TabId, Verdict};
//! use contain_domains::host::memory::MemoryHost;
//! use std::sync::Arc;
//!
//! # async fn example() -> contain_domains::Result<()> {
//! let host = Arc::new(MemoryHost::new());
//! let engine = Containment::new(host.clone(), ContainConfig::with_domains(["example.com"]))?;
//! engine.start().await?;
//!
//! let tab = host.open_tab("about:blank", &"firefox-default".into());
//! let verdict = engine
//!     .handle_request(&RequestDetails::new("1", tab, "https://example.com/"))
//!     .await;
//! assert_eq!(verdict, Verdict::Cancel);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Host** traits: the browser surface (tabs, containers, cookies, add-on messaging)
//! - **DomainMatcher**: in-scope classification of URLs
//! - **AssignmentOracle**: fail-open veto from the containers add-on
//! - **ContainmentPolicy**: pure target-container decision
//! - **RequestGuard**: per-tab dedup of cancellations
//! - **TabReconciler** / **CookieSanitizer**: one-shot startup passes
//! - **Containment**: owns the state and handles every host event

pub mod config;
pub mod cookies;
pub mod engine;
pub mod error;
pub mod guard;
pub mod host;
pub mod matcher;
pub mod oracle;
pub mod policy;
pub mod reconcile;
pub mod types;

// Re-export core types
pub use config::ContainConfig;
pub use cookies::{CookieSanitizer, SanitizeReport};
pub use engine::{Containment, StartupReport};
pub use error::{ContainError, Result};
pub use guard::{CancellationState, GuardDecision, PendingCancellation, RequestGuard};
pub use host::{CollaboratorApi, ContextApi, CookieApi, Host, RequestApi, RequestFilter, TabApi};
pub use matcher::DomainMatcher;
pub use oracle::AssignmentOracle;
pub use policy::ContainmentPolicy;
pub use reconcile::{AwaitingLoad, ReconcileReport, TabReconciler, TabUpdateSubscription};
pub use types::{
    Assignment, CollaboratorInfo, ContextDescriptor, ContextId, ContextQuery, Cookie,
    LifecycleEvent, LifecycleKind, NewTab, RequestDetails, TabChange, TabId, TabRecord,
    TabStatus, Verdict,
};

// Re-export the in-memory host for convenience
pub use host::memory::MemoryHost;
