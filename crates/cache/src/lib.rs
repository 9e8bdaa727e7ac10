//! Short-TTL caching for availability and stock lookups.
//!
//! The cache is a pure accelerator: correctness never depends on a hit or a
//! miss, and every failure degrades to the underlying store. Backends are
//! pluggable behind [`CacheBackend`]; [`FallbackCache`] pairs a distributed
//! primary with an in-process [`InMemoryCache`] so an unreachable cache tier
//! never fails a request.

mod backend;
mod fallback;
mod handle;
mod memory;

pub use backend::{CacheBackend, CacheError};
pub use fallback::FallbackCache;
pub use handle::Cache;
pub use memory::InMemoryCache;
