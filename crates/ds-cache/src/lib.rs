pub mod gateway;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use gateway::{
    CacheGateway, DEFAULT_METADATA_TTL_SECS, DEFAULT_QUERY_TTL_SECS, DEFAULT_RECENT_TTL_SECS,
    DEFAULT_SESSION_TTL_SECS, RECENTLY_VIEWED_LIMIT,
};
pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;
pub use store::{CacheError, CacheStore};

pub use ds_error::{DsError, Result};
