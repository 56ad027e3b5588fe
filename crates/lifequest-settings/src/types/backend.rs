//! Hosted backend settings.

use serde::{Deserialize, Serialize};

/// Project identifiers and the collection layout of the document database.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Backend project id.
    pub project_id: String,
    /// Auth domain used by the popup sign-in.
    pub auth_domain: String,
    /// Public web API key.
    pub api_key: String,
    /// Collection holding one record per user.
    pub users_collection: String,
    /// Collection holding one document per chat room.
    pub chats_collection: String,
    /// Sub-collection of a room holding its messages.
    pub messages_collection: String,
    /// Collection holding communities.
    pub communities_collection: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            project_id: "isk-ia".to_string(),
            auth_domain: "isk-ia.firebaseapp.com".to_string(),
            api_key: String::new(),
            users_collection: "users".to_string(),
            chats_collection: "chats".to_string(),
            messages_collection: "messages".to_string(),
            communities_collection: "communities".to_string(),
        }
    }
}
