//! Document database boundary.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::listener::ListenerHandle;
use super::path::{CollectionPath, DocPath};
use super::write::WriteData;
use crate::errors::{BackendError, BackendResult};

/// A document as read from the backend.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    /// Document id.
    pub id: String,
    /// Field data.
    pub data: Map<String, Value>,
}

/// Sort direction for [`OrderBy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Ordering clause of a [`Query`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    /// Field to sort on.
    pub field: String,
    /// Sort direction.
    pub direction: Direction,
}

/// A collection query, optionally ordered by one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// Collection to read.
    pub collection: CollectionPath,
    /// Sort clause; unordered queries return documents by id.
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Whole-collection query.
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            order_by: None,
        }
    }

    /// Add an ordering clause.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

/// Called with the current document (`None` if it does not exist) on every push.
pub type DocumentCallback = Box<dyn Fn(Option<DocumentSnapshot>) + Send + Sync>;
/// Called with the complete ordered result set on every push.
pub type QueryCallback = Box<dyn Fn(Vec<DocumentSnapshot>) + Send + Sync>;
/// Called once when a listener fails; the listener is dead afterwards.
pub type ErrorCallback = Box<dyn Fn(BackendError) + Send + Sync>;

/// Path-addressed document database with real-time listeners.
///
/// Listener callbacks run on the backend's delivery context and must not
/// block. Pushes for one listener arrive in commit order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    async fn get(&self, path: &DocPath) -> BackendResult<Option<DocumentSnapshot>>;

    /// Create or shallow-merge into a document.
    async fn set_merge(&self, path: &DocPath, data: WriteData) -> BackendResult<()>;

    /// Shallow-merge into an existing document; `NotFound` if it is missing.
    async fn update(&self, path: &DocPath, data: WriteData) -> BackendResult<()>;

    /// Create a document with a backend-assigned id and return the id.
    async fn add(&self, collection: &CollectionPath, data: WriteData) -> BackendResult<String>;

    /// Listen to one document.
    fn listen_document(
        &self,
        path: &DocPath,
        on_next: DocumentCallback,
        on_error: ErrorCallback,
    ) -> BackendResult<ListenerHandle>;

    /// Listen to a query; every push carries the full ordered result.
    fn listen_query(
        &self,
        query: &Query,
        on_next: QueryCallback,
        on_error: ErrorCallback,
    ) -> BackendResult<ListenerHandle>;
}
