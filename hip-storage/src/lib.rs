//! HIP Storage
//!
//! Contracts for the five external stores (shared counters, cache,
//! transactional store, document store, audit queue), the read-through
//! cache built on them, and two backend families: in-memory and Redis.
//! The relational and document backends live in the API crate next to the
//! connection pool.

pub mod cache;
pub mod keys;
pub mod memory;
pub mod redis_backend;
pub mod traits;

pub use cache::{CacheConfig, CacheError, CacheRead, CacheStats, ReadThroughCache};
pub use keys::{CacheKey, CacheNamespace, CounterKey, CounterKind};
pub use memory::{
    FaultSwitch, MemoryAuditQueue, MemoryCache, MemoryCounterStore, MemoryDocumentStore,
    MemoryTransactionalStore, PreferenceRow,
};
pub use redis_backend::RedisBackend;
pub use traits::{
    AuditQueue, CacheLookup, CacheStore, CounterSnapshot, CounterStore, DocumentStore,
    TransactionalStore, UpdateOutcome,
};
