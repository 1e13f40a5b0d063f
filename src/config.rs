//! Containment configuration
//!
//! The domain set and container identity are static data: a host adapter
//! builds a `ContainConfig` once (usually `ContainConfig::default()`) and
//! hands it to the engine at startup.

use crate::error::{ContainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generic top-level domains owned by Yandex
pub const YANDEX_DOMAINS: &[&str] = &[
    "yandex.company",
    "yandex.express",
    "yandex.gd",
    "yandex.international",
    "yandex.ltda",
    "yandex.press",
    "yandex.shopping",
    "yandex.tickets",
    "yandex.tv",
    "yandex.cruises",
    "yandex.dog",
    "yandex.express",
    "yandex.game",
    "yandex.gent",
    "yandex.salon",
    "yandex.shopping",
    "yandex.tours",
    "yandex.wiki",
    "yandex.clothing",
    "yandex.energy",
    "yandex.fund",
    "yandex.hockey",
    "yandex.kiwi",
    "yandex.re",
    "yandex.soccer",
    "yandex.tienda",
    "yandex.training",
    "yandex.jobs",
    "yandexpay.in",
    "yandexteam.org",
];

/// National Yandex domains
pub const YANDEX_NATIONAL_DOMAINS: &[&str] = &[
    "yandex.it",
    "yandex.ru",
    "yandex.de",
    "yandex.com",
    "yandex.com.br",
    "yandex.in",
    "yandex.com.au",
    "yandex.es",
    "yandex.com.mx",
    "yandex.co.jp",
    "yandex.in",
    "yandex.co.uk",
    "yandex.ca",
    "yandex.fr",
    "yandex.com.sg",
];

/// Id of the Multi-Account Containers add-on
pub const MAC_ADDON_ID: &str = "@testpilot-containers";

/// Cookie store id of the non-isolated browsing context
pub const DEFAULT_CONTEXT_ID: &str = "firefox-default";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainConfig {
    /// Name of the dedicated container (looked up, then created)
    #[serde(default = "default_container_name")]
    pub container_name: String,

    #[serde(default = "default_container_color")]
    pub container_color: String,

    #[serde(default = "default_container_icon")]
    pub container_icon: String,

    /// Cookie store id of the default context
    #[serde(default = "default_context_id")]
    pub default_context_id: String,

    /// Add-on id of the assignment collaborator
    #[serde(default = "default_collaborator_id")]
    pub collaborator_id: String,

    /// Domains that must live in the dedicated container
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,

    /// Safety timeout after which a pending cancellation is forgotten
    #[serde(default = "default_cleanup_delay_ms")]
    pub cleanup_delay_ms: u64,

    /// Also ask the collaborator about `www.<domain>` before purging cookies
    ///
    /// Off by default: only bare domains are queried, though a `www.`
    /// answer is honoured if the collaborator returns one.
    #[serde(default)]
    pub check_www_assignments: bool,
}

fn default_container_name() -> String {
    "Yandex".into()
}
fn default_container_color() -> String {
    "yellow".into()
}
fn default_container_icon() -> String {
    "briefcase".into()
}
fn default_context_id() -> String {
    DEFAULT_CONTEXT_ID.into()
}
fn default_collaborator_id() -> String {
    MAC_ADDON_ID.into()
}
fn default_domains() -> Vec<String> {
    YANDEX_DOMAINS
        .iter()
        .chain(YANDEX_NATIONAL_DOMAINS)
        .map(|d| d.to_string())
        .collect()
}
fn default_cleanup_delay_ms() -> u64 {
    2000
}

impl Default for ContainConfig {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            container_color: default_container_color(),
            container_icon: default_container_icon(),
            default_context_id: default_context_id(),
            collaborator_id: default_collaborator_id(),
            domains: default_domains(),
            cleanup_delay_ms: default_cleanup_delay_ms(),
            check_www_assignments: false,
        }
    }
}

impl ContainConfig {
    /// Build a config with the default identity and a custom domain set
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.container_name.trim().is_empty() {
            return Err(ContainError::Config("containerName must not be empty".into()));
        }
        if self.default_context_id.is_empty() {
            return Err(ContainError::Config(
                "defaultContextId must not be empty".into(),
            ));
        }
        if self.cleanup_delay_ms == 0 {
            return Err(ContainError::Config(
                "cleanupDelayMs must be greater than zero".into(),
            ));
        }
        if let Some(bad) = self.domains.iter().find(|d| !is_plain_domain(d)) {
            return Err(ContainError::InvalidDomain(bad.clone()));
        }
        Ok(())
    }

    /// Safety timeout as a `Duration`
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }
}

fn is_plain_domain(domain: &str) -> bool {
    !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}
