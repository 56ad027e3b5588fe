//! Requests and cached responses.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, Result};

/// An intercepted request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL; also the cache key.
    pub url: Url,
}

impl Request {
    /// GET request for an absolute URL.
    pub fn get(url: &str) -> Result<Self> {
        Ok(Self {
            method: Method::GET,
            url: parse_url(url)?,
        })
    }

    /// Request with an explicit method.
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Cache key of this request.
    pub fn key(&self) -> &str {
        self.url.as_str()
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| CacheError::InvalidUrl {
        url: raw.to_owned(),
        reason: e.to_string(),
    })
}

/// A response as stored in a cache (or returned from the network).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    /// URL the response was fetched from.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers in wire order.
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Raw body.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

mod body_base64 {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
