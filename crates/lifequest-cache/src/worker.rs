//! The cache-first worker.
//!
//! Lifecycle: `Parsed → Installing → Installed → Activating → Activated`.
//! A failed install leaves the worker `Redundant` and the storage untouched.

use std::fmt;
use std::sync::Arc;

use futures::future::try_join_all;
use lifequest_settings::CacheSettings;
use parking_lot::Mutex;
use reqwest::{Method, Url};
use tracing::{debug, error, info, instrument, warn};

use crate::errors::{CacheError, Result};
use crate::fetcher::Fetcher;
use crate::response::{CachedResponse, Request, parse_url};
use crate::storage::CacheStorage;

/// Lifecycle state of a [`ServiceWorker`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, not installed.
    Parsed,
    /// Install in progress.
    Installing,
    /// Manifest cached.
    Installed,
    /// Old generations being pruned.
    Activating,
    /// Serving.
    Activated,
    /// Install failed; this worker will never activate.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Where a served response came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchSource {
    /// A cache hit.
    Cache,
    /// The live network.
    Network,
}

/// Response to an intercepted request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Served {
    /// The response.
    pub response: CachedResponse,
    /// Its origin.
    pub source: FetchSource,
}

/// Cache generation, scope and manifest.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Current cache generation.
    pub cache_name: String,
    /// Base URL for relative manifest entries.
    pub scope: String,
    /// Resources installed into the cache.
    pub manifest: Vec<String>,
}

impl WorkerConfig {
    /// Config from loaded settings.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self {
            cache_name: settings.cache_name.clone(),
            scope: settings.scope.clone(),
            manifest: settings.manifest.clone(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from_settings(&CacheSettings::default())
    }
}

/// Cache-first network interceptor.
pub struct ServiceWorker {
    cache_name: String,
    scope: Url,
    manifest: Vec<String>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<WorkerState>,
}

impl ServiceWorker {
    /// Worker for `config`. Fails if the scope is not an absolute URL.
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let scope = parse_url(&config.scope)?;
        Ok(Self {
            cache_name: config.cache_name,
            scope,
            manifest: config.manifest,
            storage,
            fetcher,
            state: Mutex::new(WorkerState::Parsed),
        })
    }

    /// Current cache generation.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    fn set_state(&self, next: WorkerState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        debug!(from = %prev, to = %next, "worker state");
    }

    /// Resolve `raw` against the scope.
    pub fn resolve(&self, raw: &str) -> Result<Url> {
        self.scope.join(raw).map_err(|e| CacheError::InvalidUrl {
            url: raw.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Manifest entries as absolute URLs.
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.manifest.iter().map(|raw| self.resolve(raw)).collect()
    }

    /// Fetch every manifest resource into the current cache generation.
    ///
    /// All resources must fetch with a 2xx status; otherwise nothing is
    /// stored, the worker becomes `Redundant` and `InstallFailed` is
    /// returned. Returns the number of cached entries.
    #[instrument(skip(self), fields(cache = %self.cache_name))]
    pub async fn on_install(&self) -> Result<usize> {
        self.set_state(WorkerState::Installing);
        match self.populate().await {
            Ok(count) => {
                self.set_state(WorkerState::Installed);
                info!(entries = count, "cache installed");
                Ok(count)
            }
            Err(e) => {
                self.set_state(WorkerState::Redundant);
                error!(error = %e, "install failed");
                Err(CacheError::InstallFailed {
                    cache: self.cache_name.clone(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn populate(&self) -> Result<usize> {
        let urls = self.manifest_urls()?;
        let fetches = urls.into_iter().map(|url| async move {
            let response = self.fetcher.fetch(&Request::new(Method::GET, url)).await?;
            if response.is_success() {
                Ok(response)
            } else {
                Err(CacheError::BadStatus {
                    url: response.url,
                    status: response.status,
                })
            }
        });
        let responses = try_join_all(fetches).await?;
        let count = responses.len();
        self.storage.put_all(&self.cache_name, responses).await?;
        Ok(count)
    }

    /// Answer a request: cached response for GETs found in any cache,
    /// otherwise the live network response (not stored).
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn on_fetch(&self, request: &Request) -> Result<Served> {
        if request.method == Method::GET {
            match self.storage.match_url(request.key()).await {
                Ok(Some(response)) => {
                    debug!("cache hit");
                    return Ok(Served {
                        response,
                        source: FetchSource::Cache,
                    });
                }
                Ok(None) => debug!("cache miss"),
                Err(e) => warn!(error = %e, "cache lookup failed, using network"),
            }
        }
        let response = self.fetcher.fetch(request).await?;
        Ok(Served {
            response,
            source: FetchSource::Network,
        })
    }

    /// Delete every cache generation except the current one. Returns the
    /// deleted names.
    #[instrument(skip(self), fields(cache = %self.cache_name))]
    pub async fn on_activate(&self) -> Result<Vec<String>> {
        self.set_state(WorkerState::Activating);
        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name == self.cache_name {
                continue;
            }
            if self.storage.delete(&name).await? {
                info!(old_cache = %name, "deleted stale cache");
                deleted.push(name);
            }
        }
        self.set_state(WorkerState::Activated);
        Ok(deleted)
    }
}

impl fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("cache_name", &self.cache_name)
            .field("scope", &self.scope.as_str())
            .field("manifest", &self.manifest.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCacheStorage;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `200 <url>` for every URL except those containing `fail`.
    #[derive(Default)]
    struct StubFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: &Request) -> Result<CachedResponse> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            let status = if request.url.as_str().contains("fail") { 500 } else { 200 };
            Ok(CachedResponse {
                url: request.url.to_string(),
                status,
                headers: Vec::new(),
                body: request.url.as_str().as_bytes().to_vec(),
            })
        }
    }

    fn worker(manifest: &[&str]) -> (ServiceWorker, Arc<MemoryCacheStorage>, Arc<StubFetcher>) {
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(StubFetcher::default());
        let config = WorkerConfig {
            cache_name: "v2".into(),
            scope: "http://localhost/app/".into(),
            manifest: manifest.iter().map(ToString::to_string).collect(),
        };
        let sw = ServiceWorker::new(
            config,
            Arc::clone(&storage) as Arc<dyn CacheStorage>,
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        )
        .unwrap();
        (sw, storage, fetcher)
    }

    #[test]
    fn manifest_resolves_against_scope() {
        let (sw, _, _) = worker(&["/", "lifequest_ai.html", "https://cdn.tailwindcss.com"]);
        let urls: Vec<String> = sw
            .manifest_urls()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost/",
                "http://localhost/app/lifequest_ai.html",
                "https://cdn.tailwindcss.com/",
            ]
        );
    }

    #[test]
    fn default_config_matches_settings() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "lifequest-ai-cache-v1");
        assert_eq!(config.manifest.len(), 6);
    }

    #[test]
    fn relative_scope_is_rejected() {
        let result = ServiceWorker::new(
            WorkerConfig {
                scope: "app/".into(),
                ..WorkerConfig::default()
            },
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StubFetcher::default()),
        );
        assert_matches!(result, Err(CacheError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn install_caches_every_entry() {
        let (sw, storage, _) = worker(&["/", "index.html", "manifest.json"]);
        assert_eq!(sw.state(), WorkerState::Parsed);

        assert_eq!(sw.on_install().await.unwrap(), 3);

        assert_eq!(sw.state(), WorkerState::Installed);
        assert_eq!(
            storage.urls("v2").await.unwrap(),
            vec![
                "http://localhost/",
                "http://localhost/app/index.html",
                "http://localhost/app/manifest.json",
            ]
        );
    }

    #[tokio::test]
    async fn failed_entry_aborts_whole_install() {
        let (sw, storage, _) = worker(&["/", "fail.js", "manifest.json"]);

        let err = sw.on_install().await.unwrap_err();

        assert_matches!(
            err,
            CacheError::InstallFailed { ref source, .. }
                if matches!(**source, CacheError::BadStatus { status: 500, .. })
        );
        assert_eq!(sw.state(), WorkerState::Redundant);
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_prefers_cache() {
        let (sw, _, fetcher) = worker(&["index.html"]);
        let _ = sw.on_install().await.unwrap();
        let before = fetcher.calls.load(Ordering::SeqCst);

        let served = sw
            .on_fetch(&Request::get("http://localhost/app/index.html").unwrap())
            .await
            .unwrap();

        assert_eq!(served.source, FetchSource::Cache);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn miss_goes_to_network_without_storing() {
        let (sw, storage, _) = worker(&["index.html"]);
        let _ = sw.on_install().await.unwrap();

        let request = Request::get("http://localhost/api/quests").unwrap();
        let served = sw.on_fetch(&request).await.unwrap();

        assert_eq!(served.source, FetchSource::Network);
        assert!(storage.match_url(request.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_get_bypasses_cache() {
        let (sw, _, fetcher) = worker(&["index.html"]);
        let _ = sw.on_install().await.unwrap();
        let url = sw.resolve("index.html").unwrap();

        let served = sw
            .on_fetch(&Request::new(Method::POST, url))
            .await
            .unwrap();

        assert_eq!(served.source, FetchSource::Network);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn activate_prunes_other_generations() {
        let (sw, storage, _) = worker(&["index.html"]);
        storage.open("v0").await.unwrap();
        storage.open("v1").await.unwrap();
        let _ = sw.on_install().await.unwrap();

        let deleted = sw.on_activate().await.unwrap();

        assert_eq!(deleted, vec!["v0", "v1"]);
        assert_eq!(storage.keys().await.unwrap(), vec!["v2"]);
        assert_eq!(sw.state(), WorkerState::Activated);
    }
}
