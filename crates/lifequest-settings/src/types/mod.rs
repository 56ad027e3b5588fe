//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file may contain any subset of fields.

mod backend;
mod cache;
mod logging;
mod sync;

pub use backend::*;
pub use cache::*;
pub use logging::*;
pub use sync::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "cache": { "cacheName": "lifequest-ai-cache-v2" },
///   "sync": { "resumeChatOnError": true }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifeQuestSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Hosted backend project and collection names.
    pub backend: BackendSettings,
    /// Session & subscription manager behavior.
    pub sync: SyncSettings,
    /// Offline cache worker.
    pub cache: CacheSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for LifeQuestSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "lifequest".to_string(),
            backend: BackendSettings::default(),
            sync: SyncSettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl LifeQuestSettings {
    /// Reject values that would make the components misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.cache.cache_name.trim().is_empty() {
            return Err(SettingsError::InvalidValue("cache.cacheName is empty".into()));
        }
        if self.cache.manifest.iter().any(|u| u.trim().is_empty()) {
            return Err(SettingsError::InvalidValue(
                "cache.manifest contains an empty entry".into(),
            ));
        }
        for (key, value) in [
            ("backend.usersCollection", &self.backend.users_collection),
            ("backend.chatsCollection", &self.backend.chats_collection),
            ("backend.messagesCollection", &self.backend.messages_collection),
            (
                "backend.communitiesCollection",
                &self.backend.communities_collection,
            ),
            ("sync.defaultRoom", &self.sync.default_room),
        ] {
            if value.is_empty() || value.contains('/') {
                return Err(SettingsError::InvalidValue(format!(
                    "{key} must be a single path segment, got {value:?}"
                )));
            }
        }
        Ok(())
    }
}
