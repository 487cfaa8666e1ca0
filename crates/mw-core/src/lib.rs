//! MaxWin Core Library
//!
//! This crate provides the URL exclusion engine used by MaxWin to decide
//! which pages are left alone.
//!
//! # Architecture
//!
//! Exclusions are 4-tuple patterns `(scheme, domain_name, port, path)` with
//! `"*"` as a per-field wildcard. The pattern store keeps them sorted by
//! `(domain_name, path, scheme, port)` so every lookup is a leftmost binary
//! search. The matcher walks the wildcard combinations for a URL from least to
//! most specific and stops at the first stored pattern.
//!
//! # Modules
//!
//! - `pattern`: Pattern type, sort key and wildcard semantics
//! - `store`: Sorted, deduplicated pattern store
//! - `matcher`: Tiered URL lookup
//! - `url`: URL splitting and pattern conversion

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod matcher;
pub mod pattern;
pub mod store;
pub mod url;

// Re-export commonly used types
pub use matcher::Matcher;
pub use pattern::{Pattern, PatternKey, SearchDepth, WILDCARD};
pub use store::{PatternError, PatternStore};
pub use url::{parse_url, pattern_to_url, url_to_pattern, UrlError, UrlParts};
