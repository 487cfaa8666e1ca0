//! MaxWin Storage Layer
//!
//! Persistence for the exclusion list and the extension settings, on top of
//! an injected asynchronous key/value store.
//!
//! # Modules
//!
//! - `backend`: the `PersistentStore` contract plus in-memory and no-op stores
//! - `file`: a store backed by one JSON document on disk
//! - `keys`: key sanitizing shared by all cache operations
//! - `cache`: write-through cache with per-key locking
//! - `single_flight`: coalescing of concurrent reload requests
//! - `patterns`: persisted pattern list, schema migration
//! - `settings`: typed settings and open-window bookkeeping
//! - `service`: pattern store + cache wired together for matching

pub mod backend;
pub mod cache;
pub mod file;
pub mod keys;
pub mod patterns;
pub mod service;
pub mod settings;
pub mod single_flight;

pub use backend::{Entries, MemoryStore, NoStore, PersistentStore, StoreError};
pub use cache::{Cache, Update};
pub use file::JsonFileStore;
pub use keys::{sanitize_keys, IntoKeys};
pub use patterns::{
    add_pattern, edit_patterns, load_patterns, remove_pattern, save_patterns, PatternListError, PATTERNS_KEY,
    SCHEMA_KEY, SCHEMA_VERSION,
};
pub use service::ExclusionService;
pub use settings::{set_flag, track_window, untrack_window, Flag, Settings, UnknownFlag};
pub use single_flight::SingleFlight;
