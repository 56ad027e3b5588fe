//! Named cache storage.
//!
//! A storage holds any number of named caches ("generations"), each mapping
//! request URLs to [`CachedResponse`]s. Caches are enumerated in creation
//! order, which is also the order [`CacheStorage::match_url`] searches them.

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use async_trait::async_trait;

use crate::errors::Result;
use crate::response::CachedResponse;

/// Cache-storage API of the worker host.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the cache if it does not exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Names of every cache, oldest first.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Store every entry in `name` or none of them. Creates the cache if
    /// needed; existing entries with the same URL are replaced.
    async fn put_all(&self, name: &str, entries: Vec<CachedResponse>) -> Result<()>;

    /// Look `url` up in one cache.
    async fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>>;

    /// Look `url` up in every cache, oldest first.
    async fn match_url(&self, url: &str) -> Result<Option<CachedResponse>> {
        for name in self.keys().await? {
            if let Some(hit) = self.match_in(&name, url).await? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    /// URLs stored in one cache, sorted.
    async fn urls(&self, name: &str) -> Result<Vec<String>>;
}
