//! On-disk cache storage.
//!
//! Layout under the root directory:
//!
//! ```text
//! <sha256(cache name)>/meta.json              {"name": ..., "createdUs": ...}
//! <sha256(cache name)>/entries/<sha256(url)>.json
//! ```
//!
//! Entry files are written to a temporary name and renamed into place, so a
//! reader never sees a half-written entry. A cache only becomes visible once
//! its `meta.json` exists, and `put_all` writes that file last when it
//! creates the cache.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};

use super::CacheStorage;
use crate::errors::{CacheError, Result};
use crate::response::CachedResponse;

const META_FILE: &str = "meta.json";
const ENTRIES_DIR: &str = "entries";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheMeta {
    name: String,
    created_us: i64,
}

/// Persistent [`CacheStorage`] rooted at a directory.
#[derive(Clone, Debug)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Storage rooted at `root` (created lazily).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(digest_hex(name))
    }

    fn entry_path(&self, name: &str, url: &str) -> PathBuf {
        self.cache_dir(name)
            .join(ENTRIES_DIR)
            .join(format!("{}.json", digest_hex(url)))
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(fs::try_exists(self.cache_dir(name).join(META_FILE)).await?)
    }

    async fn require(&self, name: &str) -> Result<()> {
        if self.exists(name).await? {
            Ok(())
        } else {
            Err(CacheError::CacheNotFound(name.to_owned()))
        }
    }

    async fn write_meta(&self, name: &str) -> Result<()> {
        let meta = CacheMeta {
            name: name.to_owned(),
            created_us: chrono::Utc::now().timestamp_micros(),
        };
        write_atomic(&self.cache_dir(name).join(META_FILE), &serde_json::to_vec(&meta)?).await
    }

    /// Undo a failed `put_all`: drop a cache it was creating, or just the
    /// temporary files it staged in an existing one.
    async fn discard(&self, name: &str, created: bool, staged: &[PathBuf]) {
        let result = if created {
            fs::remove_dir_all(self.cache_dir(name)).await
        } else {
            let mut result = Ok(());
            for tmp in staged {
                if let Err(e) = fs::remove_file(tmp).await {
                    result = Err(e);
                }
            }
            result
        };
        if let Err(e) = result {
            warn!(cache = name, error = %e, "failed to clean up after aborted write");
        }
    }

    async fn read_meta(dir: &Path) -> Option<CacheMeta> {
        let raw = fs::read(dir.join(META_FILE)).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "ignoring cache with unreadable metadata");
                None
            }
        }
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        if self.exists(name).await? {
            return Ok(());
        }
        let dir = self.cache_dir(name);
        fs::create_dir_all(dir.join(ENTRIES_DIR)).await?;
        self.write_meta(name).await?;
        debug!(cache = name, dir = %dir.display(), "cache created");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut dirs = match fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut metas = Vec::new();
        while let Some(entry) = dirs.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(meta) = Self::read_meta(&entry.path()).await {
                    metas.push(meta);
                }
            }
        }
        metas.sort_by(|a, b| a.created_us.cmp(&b.created_us).then_with(|| a.name.cmp(&b.name)));
        Ok(metas.into_iter().map(|m| m.name).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match fs::remove_dir_all(self.cache_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_all(&self, name: &str, entries: Vec<CachedResponse>) -> Result<()> {
        // Serialize everything before touching the disk; a repeated URL keeps
        // its last entry.
        let encoded = entries
            .iter()
            .map(|e| -> Result<(PathBuf, Vec<u8>)> {
                Ok((self.entry_path(name, &e.url), serde_json::to_vec(e)?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let created = !self.exists(name).await?;
        fs::create_dir_all(self.cache_dir(name).join(ENTRIES_DIR)).await?;

        // Stage every entry before any of them replaces a live one.
        let mut staged = Vec::with_capacity(encoded.len());
        for (path, bytes) in &encoded {
            let tmp = path.with_extension("tmp");
            if let Err(e) = fs::write(&tmp, bytes).await {
                self.discard(name, created, &staged).await;
                return Err(e.into());
            }
            staged.push(tmp);
        }
        for (i, (tmp, (path, _))) in staged.iter().zip(&encoded).enumerate() {
            if let Err(e) = fs::rename(tmp, path).await {
                self.discard(name, created, &staged[i..]).await;
                return Err(e.into());
            }
        }
        if created {
            if let Err(e) = self.write_meta(name).await {
                self.discard(name, true, &[]).await;
                return Err(e);
            }
        }
        debug!(cache = name, entries = encoded.len(), created, "entries stored");
        Ok(())
    }

    async fn match_in(&self, name: &str, url: &str) -> Result<Option<CachedResponse>> {
        self.require(name).await?;
        match fs::read(self.entry_path(name, url)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn urls(&self, name: &str) -> Result<Vec<String>> {
        self.require(name).await?;
        let mut files = fs::read_dir(self.cache_dir(name).join(ENTRIES_DIR)).await?;
        let mut urls = Vec::new();
        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let entry: CachedResponse = serde_json::from_slice(&fs::read(&path).await?)?;
                urls.push(entry.url);
            }
        }
        urls.sort();
        Ok(urls)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn digest_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
