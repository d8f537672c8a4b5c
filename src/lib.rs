//! # Memstash
//!
//! A memcached-compatible, in-memory key/value cache with a sharded LRU
//! core, a global memory budget, CAS updates and lazy expiry.
//!
//! ## Features
//!
//! - **Thread-safe**: Share across threads with `Clone` (uses `Arc` internally)
//! - **Sharded**: Keys are partitioned across independently locked shards
//! - **Memory-budgeted**: A global byte budget drives LRU eviction
//! - **CAS**: Compare-and-swap stores guarded by opaque tokens
//! - **Lazy expiry**: TTL and `flush_all` are enforced on access, not by a
//!   background sweeper
//! - **Zero unsafe code**: Built entirely with safe Rust
//!
//! ## Quick Start
//!
//! ```rust
//! use memstash::{Cache, CacheConfig, GetOutcome, InsertOutcome};
//!
//! let config = CacheConfig::new()
//!     .memory_limit(64 * 1024)
//!     .shard_count(4)
//!     .build();
//!
//! let cache = Cache::new(config);
//!
//! // Unconditional store: empty CAS token.
//! assert_eq!(cache.insert("user:123", "0", "", "Alice", 0), InsertOutcome::Stored);
//!
//! match cache.get("user:123") {
//!     GetOutcome::Found { value, .. } => assert_eq!(&value[..], b"Alice"),
//!     GetOutcome::NotFound => unreachable!(),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! Cloning a `Cache` creates a new handle to the same underlying data:
//!
//! ```rust
//! use memstash::Cache;
//! use std::thread;
//!
//! let cache = Cache::default();
//!
//! let handles: Vec<_> = (0..4).map(|i| {
//!     let cache = cache.clone();
//!     thread::spawn(move || {
//!         cache.insert(format!("key_{}", i), "0", "", format!("value_{}", i), 0);
//!     })
//! }).collect();
//!
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! ```

// Public API
pub mod cache;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod stats;

pub use cache::Cache;
pub use cli::{Cli, ClientCommand, ServerArgs};
pub use command::{Action, Request};
pub use config::CacheConfig;
pub use engine::{AddOutcome, DeleteOutcome, GetOutcome, InsertOutcome};
pub use error::{ProtocolError, ProtocolResult};
pub use stats::{CacheStats, StatsSnapshot};

// Internal modules - not part of public API
pub(crate) mod accounting;
pub(crate) mod clock;
pub(crate) mod engine;
pub(crate) mod entry;
pub(crate) mod eviction;
pub(crate) mod flush;
pub(crate) mod shard;

pub use accounting::estimated_footprint;
pub use shard::route;
