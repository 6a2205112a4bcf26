pub mod client;
pub mod ttl;
pub mod valkey;

pub use client::{CacheClient, CacheError};
pub use ttl::TtlCache;
pub use valkey::ValkeyClient;
