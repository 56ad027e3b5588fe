//! Slash-separated document and collection paths.

use std::fmt;

/// Path of a collection: an odd number of segments (`chats/global/messages`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
    segments: Vec<String>,
}

/// Path of a document: an even number of segments (`users/u1`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<String>,
}

impl CollectionPath {
    /// Top-level collection.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Document inside this collection.
    pub fn doc(&self, id: impl AsRef<str>) -> DocPath {
        let mut segments = self.segments.clone();
        segments.push(id.as_ref().to_owned());
        DocPath { segments }
    }

    /// Last segment.
    pub fn id(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// Document that owns this sub-collection, if any.
    pub fn parent(&self) -> Option<DocPath> {
        (self.segments.len() > 1).then(|| DocPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl DocPath {
    /// Sub-collection under this document.
    pub fn collection(&self, name: impl Into<String>) -> CollectionPath {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        CollectionPath { segments }
    }

    /// Collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        CollectionPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        }
    }

    /// Document id (last segment).
    pub fn id(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}
