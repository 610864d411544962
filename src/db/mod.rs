pub mod blob;
pub mod redis;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore, Precondition, StoredObject};
pub use self::redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
