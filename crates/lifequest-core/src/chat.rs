//! Chat messages and communities as decoded from backend documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{CoreError, Result};
use crate::ids::{CommunityId, MessageId, UserId};

/// Number of uid characters shown when an author has no display name.
const SHORT_UID_LEN: usize = 6;

/// One message in a chat room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Backend document id.
    pub id: MessageId,
    /// Author uid.
    pub user_id: UserId,
    /// Author display name at send time.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Author avatar URL at send time.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Message body (already trimmed by the sender).
    pub text: String,
    /// Server-assigned send time; the room's sort key.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Decode a message document.
    ///
    /// Never fails: a missing author or body becomes an empty string, and a
    /// timestamp that is not a number of milliseconds (pending, absent or
    /// mistyped) becomes `None`, so every document in a room is shown.
    pub fn from_document(id: &str, data: &Map<String, Value>) -> Self {
        Self {
            id: MessageId::from(id),
            user_id: UserId::from(text_field(data, "userId")),
            user_name: optional_str(data, "userName"),
            avatar: optional_str(data, "avatar"),
            text: text_field(data, "text"),
            timestamp: data
                .get("timestamp")
                .and_then(millis)
                .and_then(DateTime::from_timestamp_millis),
        }
    }

    /// Name to show next to the message: the author name, else a uid prefix.
    pub fn display_name(&self) -> &str {
        match self.user_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                let uid = self.user_id.as_str();
                let end = uid
                    .char_indices()
                    .nth(SHORT_UID_LEN)
                    .map_or(uid.len(), |(i, _)| i);
                &uid[..end]
            }
        }
    }
}

/// String field, with non-string scalars rendered and null / missing as "".
fn text_field(data: &Map<String, Value>, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

fn optional_str(data: &Map<String, Value>, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Integer or float milliseconds.
#[allow(clippy::cast_possible_truncation)]
fn millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64))
}

/// A community that users can join and chat in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    /// Document id (slug).
    pub id: CommunityId,
    /// Display name; falls back to the id when the document has none.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Member uids.
    #[serde(default)]
    pub members: Vec<UserId>,
}

impl Community {
    /// Decode a community document.
    pub fn from_document(id: &str, data: &Map<String, Value>) -> Result<Self> {
        let mut fields = data.clone();
        let _ = fields.insert("id".into(), Value::from(id));
        let has_name = fields
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.is_empty());
        if !has_name {
            let _ = fields.insert("name".into(), Value::from(id));
        }
        serde_json::from_value(Value::Object(fields)).map_err(|source| CoreError::Decode {
            kind: "community",
            source,
        })
    }

    /// Whether `uid` has joined.
    pub fn has_member(&self, uid: &UserId) -> bool {
        self.members.contains(uid)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
