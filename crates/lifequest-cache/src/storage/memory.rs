//! In-memory cache storage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::CacheStorage;
use crate::errors::{CacheError, Result};
use crate::response::CachedResponse;

/// Process-local [`CacheStorage`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    /// Caches in creation order.
    caches: Mutex<Vec<(String, BTreeMap<String, CachedResponse>)>>,
}

impl MemoryCacheStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut caches = self.caches.lock();
        if !caches.iter().any(|(n, _)| n == name) {
            caches.push((name.to_owned(), BTreeMap::new()));
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.caches.lock().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.caches.lock();
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }

    async fn put_all(&self, name: &str, entries: Vec<CachedResponse>) -> Result<()> {
        let mut caches = self.caches.lock();
        let index = match caches.iter().position(|(n, _)| n == name) {
            Some(i) => i,
            None => {
                caches.push((name.to_owned(), BTreeMap::new()));
                caches.len() - 1
            }
        };
        let cache = &mut caches[index].1;
        for entry in entries {
            let _ = cache.insert(entry.url.clone(), entry);
        }
        Ok(())
    }

    async fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>> {
        let caches = self.caches.lock();
        let (_, cache) = caches
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| CacheError::CacheNotFound(name.to_owned()))?;
        Ok(cache.get(url).cloned())
    }

    async fn urls(&self, name: &str) -> Result<Vec<String>> {
        let caches = self.caches.lock();
        caches
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, cache)| cache.keys().cloned().collect())
            .ok_or_else(|| CacheError::CacheNotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn entry(url: &str, body: &str) -> CachedResponse {
        CachedResponse {
            url: url.into(),
            status: 200,
            headers: Vec::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn keys_keep_creation_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("v2").await.unwrap();
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v2", "v1"]);
    }

    #[tokio::test]
    async fn match_url_searches_oldest_first() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all("old", vec![entry("http://a/x", "old")])
            .await
            .unwrap();
        storage
            .put_all("new", vec![entry("http://a/x", "new"), entry("http://a/y", "y")])
            .await
            .unwrap();

        let hit = storage.match_url("http://a/x").await.unwrap().unwrap();
        assert_eq!(hit.text(), "old");
        assert!(storage.match_url("http://a/y").await.unwrap().is_some());
        assert!(storage.match_url("http://a/z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let storage = MemoryCacheStorage::new();
        storage.open("v1").await.unwrap();
        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert_matches!(
            storage.urls("v1").await,
            Err(CacheError::CacheNotFound(_))
        );
    }
}
