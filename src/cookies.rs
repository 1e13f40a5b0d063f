//! Cookie sanitizer: purge in-scope cookies outside the dedicated container
//!
//! Runs once at startup. For every domain, every container except the
//! dedicated one (plus the default context) has its cookies for that domain
//! removed. Domains the collaborator has assigned somewhere are skipped.

use crate::error::Result;
use crate::host::Host;
use crate::oracle::AssignmentOracle;
use crate::types::{ContextId, ContextQuery};
use std::collections::HashSet;
use std::sync::Arc;

/// Counts from one sanitizer pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    /// Cookies removed
    pub removed: usize,
    /// Removals the host rejected
    pub failed: usize,
    /// Domains skipped because the collaborator assigned them
    pub skipped_domains: Vec<String>,
}

pub struct CookieSanitizer {
    host: Arc<dyn Host>,
    oracle: Arc<AssignmentOracle>,
    isolated: ContextId,
    default: ContextId,
    domains: Vec<String>,
    check_www: bool,
}

impl CookieSanitizer {
    pub fn new(
        host: Arc<dyn Host>,
        oracle: Arc<AssignmentOracle>,
        isolated: ContextId,
        default: ContextId,
        domains: Vec<String>,
    ) -> Self {
        Self {
            host,
            oracle,
            isolated,
            default,
            domains,
            check_www: false,
        }
    }

    /// Also query `https://www.<domain>/` when resolving assignments
    pub fn with_www_assignments(mut self, check_www: bool) -> Self {
        self.check_www = check_www;
        self
    }

    /// Purge cookies; individual removal failures are counted, not returned
    pub async fn run(&self) -> Result<SanitizeReport> {
        let mut stores: Vec<ContextId> = self
            .host
            .query_contexts(&ContextQuery::all())
            .await?
            .into_iter()
            .map(|c| c.cookie_store_id)
            .collect();
        if !stores.contains(&self.default) {
            stores.push(self.default.clone());
        }
        stores.retain(|store| store != &self.isolated);

        let assigned = self.assigned_domains().await;
        let mut report = SanitizeReport::default();
        let mut seen = HashSet::new();

        for domain in &self.domains {
            if !seen.insert(domain.as_str()) {
                continue;
            }
            if assigned.contains(domain) || assigned.contains(&format!("www.{}", domain)) {
                tracing::debug!(domain = %domain, "Domain assigned by collaborator, keeping cookies");
                report.skipped_domains.push(domain.clone());
                continue;
            }

            let cookie_url = format!("https://{}/", domain);
            for store in &stores {
                let cookies = match self.host.list_cookies(domain, store).await {
                    Ok(cookies) => cookies,
                    Err(e) => {
                        tracing::warn!(domain = %domain, store = %store, error = %e, "Failed to list cookies");
                        continue;
                    }
                };

                for cookie in cookies {
                    match self.host.remove_cookie(&cookie.name, &cookie_url, store).await {
                        Ok(()) => report.removed += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(
                                domain = %domain,
                                store = %store,
                                cookie = %cookie.name,
                                error = %e,
                                "Failed to remove cookie"
                            );
                        }
                    }
                }
            }
        }

        tracing::info!(
            removed = report.removed,
            failed = report.failed,
            skipped = report.skipped_domains.len(),
            "Cookies sanitized"
        );
        Ok(report)
    }

    /// Domains (bare or `www.`) the collaborator currently assigns
    async fn assigned_domains(&self) -> HashSet<String> {
        if !self.oracle.is_enabled() {
            return HashSet::new();
        }

        let mut hosts: Vec<String> = self.domains.clone();
        if self.check_www {
            hosts.extend(self.domains.iter().map(|d| format!("www.{}", d)));
        }

        let lookups = hosts.into_iter().map(|host| async move {
            let assigned = self.oracle.is_assigned(&format!("https://{}/", host)).await;
            assigned.then_some(host)
        });
        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::types::Assignment;

    const MAC: &str = "@testpilot-containers";

    struct Fixture {
        host: Arc<MemoryHost>,
        oracle: Arc<AssignmentOracle>,
        isolated: ContextId,
        personal: ContextId,
        default: ContextId,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MemoryHost::new());
        let personal = host.add_context("Personal");
        let isolated = host.add_context("Yandex");
        let oracle = Arc::new(AssignmentOracle::new(host.clone(), MAC));
        Fixture {
            host,
            oracle,
            isolated,
            personal,
            default: ContextId::new("firefox-default"),
        }
    }

    fn sanitizer(f: &Fixture, domains: &[&str]) -> CookieSanitizer {
        CookieSanitizer::new(
            f.host.clone(),
            f.oracle.clone(),
            f.isolated.clone(),
            f.default.clone(),
            domains.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_purges_every_store_but_isolated() {
        let f = fixture();
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.default);
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.personal);
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.isolated);
        f.host.add_cookie(".other.com", "sid", &f.default);

        let report = sanitizer(&f, &["yandex.ru"]).run().await.unwrap();
        assert_eq!(report.removed, 2);
        assert!(f.host.cookies(&f.personal).is_empty());
        assert_eq!(f.host.cookies(&f.isolated).len(), 1);
        assert_eq!(f.host.cookies(&f.default).len(), 1);
        assert_eq!(f.host.cookies(&f.default)[0].name, "sid");
    }

    #[tokio::test]
    async fn test_removal_uses_bare_domain_url() {
        let f = fixture();
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.default);
        sanitizer(&f, &["yandex.ru"]).run().await.unwrap();

        let removals = f.host.cookie_removals();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].url, "https://yandex.ru/");
        assert_eq!(removals[0].store_id, f.default);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_pass() {
        let f = fixture();
        f.host.add_cookie(".yandex.ru", "locked", &f.default);
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.default);
        f.host.add_cookie(".yandex.com", "yp", &f.personal);
        f.host.fail_cookie_removal("locked");

        let report = sanitizer(&f, &["yandex.ru", "yandex.com"]).run().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.removed, 2);
        assert!(f.host.cookies(&f.personal).is_empty());
    }

    #[tokio::test]
    async fn test_assigned_domain_skipped() {
        let f = fixture();
        f.host.install_collaborator(MAC, true);
        f.host.assign(MAC, "https://yandex.ru/", Assignment::default());
        f.oracle.refresh().await;
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.default);
        f.host.add_cookie(".yandex.com", "yandexuid", &f.default);

        let report = sanitizer(&f, &["yandex.ru", "yandex.com"]).run().await.unwrap();
        assert_eq!(report.skipped_domains, vec!["yandex.ru"]);
        let left = f.host.cookies(&f.default);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].domain, ".yandex.ru");
    }

    #[tokio::test]
    async fn test_www_assignment_needs_option() {
        let f = fixture();
        f.host.install_collaborator(MAC, true);
        f.host.assign(MAC, "https://www.yandex.ru/", Assignment::default());
        f.oracle.refresh().await;
        f.host.add_cookie(".yandex.ru", "yandexuid", &f.default);

        // bare domain queried only: www assignment is not discovered
        let report = sanitizer(&f, &["yandex.ru"]).run().await.unwrap();
        assert!(report.skipped_domains.is_empty());
        assert_eq!(report.removed, 1);

        f.host.add_cookie(".yandex.ru", "yandexuid", &f.default);
        let report = sanitizer(&f, &["yandex.ru"])
            .with_www_assignments(true)
            .run()
            .await
            .unwrap();
        assert_eq!(report.skipped_domains, vec!["yandex.ru"]);
        assert_eq!(f.host.cookies(&f.default).len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_oracle_sends_nothing() {
        let f = fixture();
        f.host.install_collaborator(MAC, true);
        sanitizer(&f, &["yandex.ru", "yandex.com"]).run().await.unwrap();
        assert_eq!(f.host.messages_sent(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_domains_processed_once() {
        let f = fixture();
        f.host.add_cookie(".yandex.in", "a", &f.default);
        f.host.add_cookie(".yandex.in", "b", &f.default);

        let report = sanitizer(&f, &["yandex.in", "yandex.in"]).run().await.unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(f.host.cookie_removals().len(), 2);
    }

    #[tokio::test]
    async fn test_context_query_failure_is_returned() {
        let f = fixture();
        f.host.fail_contexts(true);
        assert!(sanitizer(&f, &["yandex.ru"]).run().await.is_err());
    }
}
