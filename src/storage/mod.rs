//! Link cache storage
//!
//! The linker reads and writes links through the `LinkCache` trait. The
//! primary implementation is `SqliteLinkCache` for persistence across runs;
//! `InMemoryLinkCache` serves tests and dry runs.

mod export;
mod memory;
mod sqlite;
mod traits;

pub use export::export_json;
pub use memory::InMemoryLinkCache;
pub use sqlite::SqliteLinkCache;
pub use traits::{CacheError, CacheResult, Link, LinkCache, LinkCacheEntry, OpenCache};
