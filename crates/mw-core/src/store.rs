//! Sorted pattern store
//!
//! Owns the exclusion patterns and keeps them sorted by
//! `(domain_name, path, scheme, port)` with no duplicate tuples. Only
//! invariant-preserving operations are exposed; the backing vector is never
//! handed out mutably.
//!
//! # Examples
//!
//! ```
//! use mw_core::{Pattern, PatternStore};
//!
//! let mut store = PatternStore::new();
//! store.add(Pattern::new("example.com").with_path("foo")).unwrap();
//! assert_eq!(store.at(0).unwrap().path, "/foo");
//! ```

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::cmp::Ordering;

use crate::pattern::{normalize_path, Pattern, PatternKey, SearchDepth, WILDCARD};

/// Error type for pattern store edits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("Pattern domain name must be specified")]
    MissingDomainName,
}

// =============================================================================
// Binary Search
// =============================================================================

/// Leftmost index `i` with `compare(target, items[i])` not `Greater`, or
/// `items.len()` when the target sorts after every item.
///
/// The first and last items are checked before the loop so lookups outside
/// the stored range return immediately.
pub fn leftmost_index<T, K, F>(items: &[T], target: &K, compare: F) -> usize
where
    K: ?Sized,
    F: Fn(&K, &T) -> Ordering,
{
    let (first, last) = match (items.first(), items.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return 0,
    };

    if compare(target, first) != Ordering::Greater {
        return 0;
    }
    if compare(target, last) == Ordering::Greater {
        return items.len();
    }

    let mut low = 0;
    let mut high = items.len() - 1;
    while low < high {
        let mid = low + (high - low) / 2;
        if compare(target, &items[mid]) != Ordering::Greater {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    high
}

/// Resolve a possibly negative index against `len`.
#[inline]
fn resolve_index(index: isize, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    (resolved < len).then_some(resolved)
}

// =============================================================================
// Pattern Store
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternStore {
    patterns: Vec<Pattern>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store by inserting every pattern, sorting and deduplicating
    /// along the way.
    pub fn from_patterns<I>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = Pattern>,
    {
        let mut store = Self::new();
        for pattern in patterns {
            store.add(pattern)?;
        }
        Ok(store)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Replace the whole list verbatim.
    ///
    /// The list is not re-sorted. Callers hydrating from storage should check
    /// [`PatternStore::is_well_formed`] afterwards.
    pub fn set(&mut self, patterns: Vec<Pattern>) {
        self.patterns = patterns;
    }

    /// Pattern at `index`. Negative indices count from the end.
    pub fn at(&self, index: isize) -> Option<&Pattern> {
        resolve_index(index, self.len()).map(|i| &self.patterns[i])
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Pattern> {
        self.patterns.iter()
    }

    pub fn as_slice(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn into_vec(self) -> Vec<Pattern> {
        self.patterns
    }

    /// Insert a pattern at its sorted position.
    ///
    /// Returns `Ok(false)` when an identical pattern is already stored.
    pub fn add(&mut self, mut pattern: Pattern) -> Result<bool, PatternError> {
        if pattern.domain_name.is_empty() {
            return Err(PatternError::MissingDomainName);
        }
        pattern.path = normalize_path(pattern.path);

        let index = self.search_port(&pattern.key());
        if self.patterns.get(index) == Some(&pattern) {
            log::debug!("pattern {} already present at {}", pattern, index);
            return Ok(false);
        }

        log::debug!("inserting pattern {} at {}", pattern, index);
        self.patterns.insert(index, pattern);
        Ok(true)
    }

    /// Remove the pattern at `index`. Negative indices count from the end;
    /// out-of-bounds indices are ignored.
    pub fn remove_index(&mut self, index: isize) -> Option<Pattern> {
        let resolved = resolve_index(index, self.len())?;
        let removed = self.patterns.remove(resolved);
        log::debug!("removed pattern {} from {}", removed, resolved);
        Some(removed)
    }

    /// Leftmost index whose first `depth` key fields are not less than the
    /// target's.
    pub fn search(&self, target: &PatternKey<'_>, depth: SearchDepth) -> usize {
        leftmost_index(&self.patterns, target, |target, entry| {
            target.compare(&entry.key(), depth)
        })
    }

    #[inline]
    pub fn search_domain_name(&self, target: &PatternKey<'_>) -> usize {
        self.search(target, SearchDepth::DomainName)
    }

    #[inline]
    pub fn search_path(&self, target: &PatternKey<'_>) -> usize {
        self.search(target, SearchDepth::Path)
    }

    #[inline]
    pub fn search_scheme(&self, target: &PatternKey<'_>) -> usize {
        self.search(target, SearchDepth::Scheme)
    }

    #[inline]
    pub fn search_port(&self, target: &PatternKey<'_>) -> usize {
        self.search(target, SearchDepth::Port)
    }

    /// Whether a pattern with exactly this key is stored.
    pub fn contains_key(&self, key: &PatternKey<'_>) -> bool {
        let index = self.search_port(key);
        self.patterns
            .get(index)
            .is_some_and(|entry| entry.key() == *key)
    }

    /// Strictly increasing order with non-empty domains and normalized paths.
    pub fn is_well_formed(&self) -> bool {
        self.patterns.iter().all(|p| {
            !p.domain_name.is_empty() && (p.path == WILDCARD || p.path.starts_with('/'))
        }) && self.patterns.windows(2).all(|pair| pair[0] < pair[1])
    }
}

impl<'a> IntoIterator for &'a PatternStore {
    type Item = &'a Pattern;
    type IntoIter = core::slice::Iter<'a, Pattern>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
