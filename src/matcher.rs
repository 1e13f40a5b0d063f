//! Domain matcher: classify URLs as in-scope for the dedicated container
//!
//! Each domain compiles to a host pattern `^(.*\.)?<escaped-domain>$`, so a
//! domain matches itself and any of its subdomains but never a host that
//! only shares a suffix without a label boundary.

use crate::error::{ContainError, Result};
use regex::{Regex, RegexBuilder};
use url::Url;

/// Compiled host predicates for a static domain set
#[derive(Debug, Clone)]
pub struct DomainMatcher {
    matchers: Vec<(String, Regex)>,
}

impl DomainMatcher {
    /// Compile one host matcher per domain
    pub fn new<I, S>(domains: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matchers = domains
            .into_iter()
            .map(|domain| {
                let domain = domain.as_ref();
                let pattern = format!(r"^(.*\.)?{}$", regex::escape(domain));
                let regex = RegexBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|_| ContainError::InvalidDomain(domain.to_string()))?;
                Ok((domain.to_string(), regex))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { matchers })
    }

    /// Whether `url` belongs in the dedicated container
    ///
    /// Anything not starting with `http` is out of scope, as is anything
    /// that fails to parse or has no host.
    pub fn is_in_scope(&self, url: &str) -> bool {
        if !url.starts_with("http") {
            return false;
        }
        match host_of(url) {
            Some(host) => self.matches_host(&host),
            None => false,
        }
    }

    /// Whether a bare host matches any domain
    pub fn matches_host(&self, host: &str) -> bool {
        self.matchers.iter().any(|(_, re)| re.is_match(host))
    }

    /// Domains this matcher was built from, in order
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(|(d, _)| d.as_str())
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// Host component of a URL, with the port when it is not the scheme default
///
/// `https://yandex.ru:443/` yields `yandex.ru`; `https://yandex.ru:8443/`
/// yields `yandex.ru:8443`, which no domain pattern matches.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
