//! Exclusion pattern definitions
//!
//! A pattern is a 4-tuple `(scheme, domain_name, port, path)`. Every field
//! except the domain may hold the wildcard `"*"`, which matches any value.
//!
//! Patterns are ordered by `(domain_name, path, scheme, port)` using ordinal
//! byte comparison. The pattern store keeps its entries sorted on this key and
//! all binary searches compare a prefix of it.

#[cfg(not(feature = "std"))]
use alloc::{format, string::String};

use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::url::UrlParts;

/// Wildcard value matching any scheme, port or path.
pub const WILDCARD: &str = "*";

// =============================================================================
// Search Depth
// =============================================================================

/// How many fields of the sort key a comparison looks at.
///
/// Each depth compares a successively longer prefix of
/// `(domain_name, path, scheme, port)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SearchDepth {
    DomainName = 1,
    Path = 2,
    Scheme = 3,
    Port = 4,
}

impl SearchDepth {
    /// Number of sort key fields compared at this depth.
    #[inline]
    pub fn fields(self) -> usize {
        self as usize
    }
}

// =============================================================================
// Pattern Key
// =============================================================================

/// Borrowed view of a pattern in sort-key order.
///
/// Lookups build keys from URL slices so the hot path never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternKey<'a> {
    pub domain_name: &'a str,
    pub path: &'a str,
    pub scheme: &'a str,
    pub port: &'a str,
}

impl<'a> PatternKey<'a> {
    #[inline]
    pub fn new(scheme: &'a str, domain_name: &'a str, port: &'a str, path: &'a str) -> Self {
        Self {
            domain_name,
            path,
            scheme,
            port,
        }
    }

    /// Key that only carries a domain. Used for domain-level searches where
    /// the remaining fields are never compared.
    #[inline]
    pub fn domain(domain_name: &'a str) -> Self {
        Self::new("", domain_name, "", "")
    }

    /// Fields in sort order.
    #[inline]
    pub fn fields(&self) -> [&'a str; 4] {
        [self.domain_name, self.path, self.scheme, self.port]
    }

    /// Compare the first `depth` fields, stopping at the first difference.
    #[inline]
    pub fn compare(&self, other: &PatternKey<'_>, depth: SearchDepth) -> Ordering {
        self.fields()
            .iter()
            .zip(other.fields().iter())
            .take(depth.fields())
            .map(|(a, b)| a.cmp(b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// A URL exclusion pattern.
///
/// Serialized as the 4-element array `[scheme, domainName, port, path]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    pub scheme: String,
    pub domain_name: String,
    pub port: String,
    pub path: String,
}

impl Pattern {
    /// Pattern covering every URL on `domain_name`.
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            scheme: WILDCARD.into(),
            domain_name: domain_name.into(),
            port: WILDCARD.into(),
            path: WILDCARD.into(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = normalize_path(path.into());
        self
    }

    /// Build a pattern from the persisted field order.
    pub fn from_parts(scheme: String, domain_name: String, port: String, path: String) -> Self {
        Self {
            scheme,
            domain_name,
            port,
            path: normalize_path(path),
        }
    }

    #[inline]
    pub fn key(&self) -> PatternKey<'_> {
        PatternKey::new(&self.scheme, &self.domain_name, &self.port, &self.path)
    }

    /// Whether this pattern covers the given URL.
    ///
    /// Same domain, and each of path, scheme and port is either the wildcard
    /// or equal to the URL's value.
    pub fn covers(&self, url: &UrlParts<'_>) -> bool {
        self.domain_name == url.domain_name
            && field_matches(&self.path, &url.path)
            && field_matches(&self.scheme, &url.scheme)
            && field_matches(&self.port, &url.port)
    }

    pub fn is_whole_domain(&self) -> bool {
        self.scheme == WILDCARD && self.port == WILDCARD && self.path == WILDCARD
    }
}

impl Ord for Pattern {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().compare(&other.key(), SearchDepth::Port)
    }
}

impl PartialOrd for Pattern {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.domain_name)?;
        if !self.port.is_empty() {
            write!(f, ":{}", self.port)?;
        }
        if self.path == WILDCARD {
            f.write_str("/*")
        } else {
            f.write_str(&self.path)
        }
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.scheme, &self.domain_name, &self.port, &self.path).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (scheme, domain_name, port, path) = <(String, String, String, String)>::deserialize(deserializer)?;
        Ok(Self::from_parts(scheme, domain_name, port, path))
    }
}

#[inline]
fn field_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}

/// Prefix a path with `/` unless it is the wildcard or already rooted.
pub fn normalize_path(path: String) -> String {
    if path == WILDCARD || path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::parse_url;

    #[test]
    fn test_new_defaults_to_wildcards() {
        let p = Pattern::new("example.com");
        assert_eq!(p.scheme, "*");
        assert_eq!(p.port, "*");
        assert_eq!(p.path, "*");
        assert!(p.is_whole_domain());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("foo/bar".into()), "/foo/bar");
        assert_eq!(normalize_path("/foo".into()), "/foo");
        assert_eq!(normalize_path("*".into()), "*");
        assert_eq!(normalize_path(String::new()), "/");
    }

    #[test]
    fn test_key_compare_depth() {
        let a = Pattern::new("a.com").with_path("/x").with_scheme("http");
        let b = Pattern::new("a.com").with_path("/x").with_scheme("https");
        assert_eq!(a.key().compare(&b.key(), SearchDepth::DomainName), Ordering::Equal);
        assert_eq!(a.key().compare(&b.key(), SearchDepth::Path), Ordering::Equal);
        assert_eq!(a.key().compare(&b.key(), SearchDepth::Scheme), Ordering::Less);
    }

    #[test]
    fn test_ordering_is_ordinal() {
        // '*' (0x2A) sorts before '/' (0x2F) and before letters
        let wild = Pattern::new("a.com");
        let rooted = Pattern::new("a.com").with_path("/");
        assert!(wild < rooted);
        assert!(Pattern::new("B.com") < Pattern::new("a.com"));
    }

    #[test]
    fn test_covers() {
        let url = parse_url("https://example.com:8443/foo").unwrap();
        assert!(Pattern::new("example.com").covers(&url));
        assert!(Pattern::new("example.com").with_port("8443").covers(&url));
        assert!(!Pattern::new("example.com").with_port("443").covers(&url));
        assert!(Pattern::new("example.com").with_scheme("https").with_path("/foo").covers(&url));
        assert!(!Pattern::new("example.com").with_path("/bar").covers(&url));
        assert!(!Pattern::new("other.com").covers(&url));
    }

    #[test]
    fn test_serde_tuple_form() {
        let p = Pattern::new("deno.land").with_scheme("https").with_path("manual");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"["https","deno.land","*","/manual"]"#);
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_display() {
        assert_eq!(Pattern::new("a.com").to_string(), "*://a.com:*/*");
        let p = Pattern::new("a.com").with_scheme("https").with_port("").with_path("/x");
        assert_eq!(p.to_string(), "https://a.com/x");
    }
}
