//! Branded ID newtypes.
//!
//! Every addressable backend entity gets its own newtype around `String` so a
//! room id can't be passed where a user id is expected. IDs double as document
//! path segments, so [`parse`](UserId::parse) rejects empty values and values
//! containing `/`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{CoreError, Result};

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh id (UUID v7, time-ordered).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().simple().to_string())
            }

            /// Validate and wrap a path segment.
            pub fn parse(raw: &str) -> Result<Self> {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.contains('/') {
                    return Err(CoreError::InvalidId(format!(
                        concat!($label, " {:?}"),
                        raw
                    )));
                }
                Ok(Self(trimmed.to_owned()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Stable uid assigned by the auth provider.
    UserId, "user id"
}

branded_id! {
    /// Chat room key (`global` or a community id).
    RoomId, "room id"
}

branded_id! {
    /// Community document id (a slug derived from the community name).
    CommunityId, "community id"
}

branded_id! {
    /// Backend-assigned document id of a chat message.
    MessageId, "message id"
}

impl CommunityId {
    /// Derive a community id from a display name.
    ///
    /// Lowercases the name and replaces every character outside
    /// `[a-z0-9-_]` with `-`. Returns `None` for a blank name.
    pub fn slugify(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        Some(Self(slug))
    }
}

impl From<CommunityId> for RoomId {
    fn from(id: CommunityId) -> Self {
        Self(id.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
