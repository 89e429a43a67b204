//! Read-through cache for per-tenant views.
//!
//! Keys come from [`crate::keys::CacheKey`], which cannot be built without a
//! tenant. Reads return [`CacheRead<T>`], which tells the caller whether the
//! value came from the cache and how long until the entry refreshes.

pub mod read;
pub mod read_through;

pub use read::{CacheRead, CacheStats};
pub use read_through::{CacheConfig, CacheError, ReadThroughCache};
