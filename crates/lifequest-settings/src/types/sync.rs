//! Session & subscription manager settings.

use lifequest_core::StateDefaults;
use serde::{Deserialize, Serialize};

/// Behavior knobs for the session manager.
///
/// Both recovery knobs are off by default: a failed send is reported and
/// dropped, a failed chat listener stays down until the room is reopened.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Room opened when the chat view first appears.
    pub default_room: String,
    /// Re-open the current chat room after its listener reports an error.
    pub resume_chat_on_error: bool,
    /// Extra attempts for a failed message send.
    pub send_retries: u32,
    /// Values used for missing progress fields.
    pub default_state: StateDefaults,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_room: "global".to_string(),
            resume_chat_on_error: false,
            send_retries: 0,
            default_state: StateDefaults::default(),
        }
    }
}
