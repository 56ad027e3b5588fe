//! Offline cache worker settings.

use serde::{Deserialize, Serialize};

/// Current cache generation name.
pub const DEFAULT_CACHE_NAME: &str = "lifequest-ai-cache-v1";

/// Static resources installed into the cache.
pub const DEFAULT_MANIFEST: [&str; 6] = [
    "/",
    "lifequest_ai.html",
    "manifest.json",
    "https://cdn.tailwindcss.com",
    "https://unpkg.com/lucide@latest",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;600;700&family=Press+Start+2P&family=Roboto+Mono:wght@400;700&family=MedievalSharp&display=swap",
];

/// Cache worker configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Name of the live cache generation. Changing it prunes the old one on
    /// the next activation.
    pub cache_name: String,
    /// Base URL that relative manifest entries resolve against.
    pub scope: String,
    /// Resources fetched at install time.
    pub manifest: Vec<String>,
    /// Directory for the persistent cache store (`~` is expanded).
    pub storage_dir: String,
    /// Per-request network timeout.
    pub request_timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            scope: "http://localhost/".to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(ToString::to_string).collect(),
            storage_dir: "~/.lifequest/cache".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}
