//! Containment policy: which container a URL belongs in
//!
//! | url in scope | tab in isolated container | decision          |
//! |--------------|---------------------------|-------------------|
//! | yes          | no                        | move to isolated  |
//! | yes          | yes                       | none              |
//! | no           | yes                       | move to default   |
//! | no           | no                        | none              |

use crate::matcher::DomainMatcher;
use crate::types::{ContextId, TabRecord};

/// Pure decision function over the matcher and the two well-known contexts
#[derive(Debug, Clone)]
pub struct ContainmentPolicy {
    matcher: DomainMatcher,
    isolated: ContextId,
    default: ContextId,
}

impl ContainmentPolicy {
    pub fn new(matcher: DomainMatcher, isolated: ContextId, default: ContextId) -> Self {
        Self {
            matcher,
            isolated,
            default,
        }
    }

    /// Target container for `url` loaded in `tab`, or `None` to leave it be
    pub fn decide(&self, url: &str, tab: &TabRecord) -> Option<ContextId> {
        self.decide_for_context(url, &tab.cookie_store_id)
    }

    /// Same as `decide`, given only the tab's current container
    pub fn decide_for_context(&self, url: &str, current: &ContextId) -> Option<ContextId> {
        if !url.starts_with("http") {
            return None;
        }
        let in_scope = self.matcher.is_in_scope(url);
        let in_isolated = current == &self.isolated;
        match (in_scope, in_isolated) {
            (true, false) => Some(self.isolated.clone()),
            (false, true) => Some(self.default.clone()),
            (true, true) | (false, false) => None,
        }
    }

    pub fn matcher(&self) -> &DomainMatcher {
        &self.matcher
    }

    pub fn isolated(&self) -> &ContextId {
        &self.isolated
    }

    pub fn default_context(&self) -> &ContextId {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TabId, TabStatus};

    fn policy() -> ContainmentPolicy {
        ContainmentPolicy::new(
            DomainMatcher::new(&["example.com"]).unwrap(),
            ContextId::new("firefox-container-7"),
            ContextId::new("firefox-default"),
        )
    }

    fn tab_in(store: &str) -> TabRecord {
        TabRecord {
            id: TabId(1),
            url: "about:blank".into(),
            cookie_store_id: ContextId::new(store),
            status: TabStatus::Complete,
            active: true,
            index: 0,
            window_id: 1,
            incognito: false,
        }
    }

    #[test]
    fn test_in_scope_outside_isolated() {
        let p = policy();
        assert_eq!(
            p.decide("https://example.com/", &tab_in("firefox-default")),
            Some(ContextId::new("firefox-container-7"))
        );
        // any non-isolated container counts
        assert_eq!(
            p.decide("https://mail.example.com/", &tab_in("firefox-container-2")),
            Some(ContextId::new("firefox-container-7"))
        );
    }

    #[test]
    fn test_in_scope_inside_isolated() {
        let p = policy();
        assert_eq!(p.decide("https://example.com/", &tab_in("firefox-container-7")), None);
    }

    #[test]
    fn test_out_of_scope_inside_isolated() {
        let p = policy();
        assert_eq!(
            p.decide("https://other.com/", &tab_in("firefox-container-7")),
            Some(ContextId::new("firefox-default"))
        );
    }

    #[test]
    fn test_out_of_scope_outside_isolated() {
        let p = policy();
        assert_eq!(p.decide("https://other.com/", &tab_in("firefox-default")), None);
        assert_eq!(p.decide("https://other.com/", &tab_in("firefox-container-2")), None);
    }

    #[test]
    fn test_non_http_is_never_moved() {
        let p = policy();
        assert_eq!(p.decide("about:newtab", &tab_in("firefox-container-7")), None);
        assert_eq!(p.decide("about:blank", &tab_in("firefox-default")), None);
        assert_eq!(p.decide("moz-extension://abc/page.html", &tab_in("firefox-container-7")), None);
    }

    #[test]
    fn test_decision_is_pure() {
        let p = policy();
        let tab = tab_in("firefox-default");
        let first = p.decide("https://example.com/", &tab);
        for _ in 0..3 {
            assert_eq!(p.decide("https://example.com/", &tab), first);
        }
    }

    #[test]
    fn test_applying_decision_is_idempotent() {
        let p = policy();
        for (url, store) in [
            ("https://example.com/", "firefox-default"),
            ("https://other.com/", "firefox-container-7"),
        ] {
            let target = p.decide(url, &tab_in(store)).unwrap();
            assert_eq!(p.decide_for_context(url, &target), None);
        }
    }
}
