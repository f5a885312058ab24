//! Index Module
//!
//! Durable key→record mapping with TTL and create-uniqueness, plus the
//! record model for cache entries and tenants.

mod entry;
mod keys;
mod records;
mod store;

pub use entry::{current_timestamp_ms, StoredItem};
pub use keys::{lease_key, pending_key, stable_key, tenant_id_key, tenant_key};
pub use records::{CacheRecord, LeaseRecord, TenantRecord};
pub use store::{Index, IndexStore, MemoryIndexStore};

// == Public Constants ==
/// Maximum allowed index key length in bytes
pub const MAX_INDEX_KEY_LENGTH: usize = 1024;
