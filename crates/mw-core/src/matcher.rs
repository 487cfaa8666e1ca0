//! Core Matching Engine
//!
//! Decides whether a URL is covered by any stored exclusion pattern. Every
//! lookup is a binary search over the sorted store; nothing is allocated for
//! URLs that are already lowercase and canonical.

use crate::pattern::{PatternKey, WILDCARD};
use crate::store::PatternStore;
use crate::url::{parse_url, UrlParts};

// =============================================================================
// Specificity Tiers
// =============================================================================

/// Which of path, scheme and port take the URL's value rather than `*`.
#[derive(Debug, Clone, Copy)]
struct Tier {
    path: bool,
    scheme: bool,
    port: bool,
}

/// Candidate patterns in order from least to most specific.
const TIERS: [Tier; 8] = [
    Tier { path: false, scheme: false, port: false },
    Tier { path: false, scheme: true, port: false },
    Tier { path: false, scheme: false, port: true },
    Tier { path: false, scheme: true, port: true },
    Tier { path: true, scheme: false, port: false },
    Tier { path: true, scheme: true, port: false },
    Tier { path: true, scheme: false, port: true },
    Tier { path: true, scheme: true, port: true },
];

impl Tier {
    #[inline]
    fn key<'a>(&self, url: &'a UrlParts<'_>) -> PatternKey<'a> {
        let pick = |specific: bool, value: &'a str| if specific { value } else { WILDCARD };
        PatternKey::new(
            pick(self.scheme, &*url.scheme),
            &*url.domain_name,
            pick(self.port, &*url.port),
            pick(self.path, &*url.path),
        )
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// Matcher over a pattern store snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    store: &'a PatternStore,
}

impl<'a> Matcher<'a> {
    pub fn new(store: &'a PatternStore) -> Self {
        Self { store }
    }

    /// Whether `url` is covered by any stored pattern.
    ///
    /// URLs that cannot be parsed are never covered.
    pub fn includes_url(&self, url: &str) -> bool {
        if self.store.is_empty() {
            return false;
        }
        match parse_url(url) {
            Ok(parts) => self.includes(&parts),
            Err(e) => {
                log::debug!("not matching unparseable url {:?}: {}", url, e);
                false
            }
        }
    }

    /// Tiered lookup over already parsed URL parts.
    pub fn includes(&self, url: &UrlParts<'_>) -> bool {
        let store = self.store;
        if store.is_empty() {
            return false;
        }

        // A0: any pattern for this domain at all
        let domain = PatternKey::domain(&url.domain_name);
        let first = match store.at(store.search_domain_name(&domain) as isize) {
            Some(pattern) if pattern.domain_name == url.domain_name => pattern,
            _ => return false,
        };

        // A1: a whole-domain exclusion normally sorts first within the domain
        if first.is_whole_domain() {
            return true;
        }

        // A2: progressively more specific candidates
        TIERS.iter().any(|tier| store.contains_key(&tier.key(url)))
    }

    /// Reference check scanning every pattern. Linear time; used to verify
    /// the tiered lookup.
    pub fn includes_linear(&self, url: &UrlParts<'_>) -> bool {
        self.store.iter().any(|pattern| pattern.covers(url))
    }
}
