//! Cache Module
//!
//! Provides the in-process store of encoded values.

mod entry;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use stats::{CacheStats, StatsReport};
pub use store::CacheStore;
