//! Authenticated identity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::UserId;

/// A signed-in user as reported by the auth provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable provider uid.
    pub uid: UserId,
    /// Display name, if the provider has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Email address, if shared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Avatar URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Identity {
    /// Identity with only a uid.
    pub fn new(uid: impl Into<UserId>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    /// Builder-style display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Builder-style email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Builder-style avatar URL.
    #[must_use]
    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    /// Profile attributes to merge into the user's backing record.
    ///
    /// Only attributes the provider actually reported are included, so a
    /// merge never blanks out a value stored earlier.
    pub fn profile_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(name) = &self.display_name {
            let _ = fields.insert("name".into(), Value::from(name.as_str()));
        }
        if let Some(email) = &self.email {
            let _ = fields.insert("email".into(), Value::from(email.as_str()));
        }
        if let Some(photo) = &self.photo_url {
            let _ = fields.insert("profilePicture".into(), Value::from(photo.as_str()));
        }
        fields
    }
}
