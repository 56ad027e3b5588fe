//! In-memory document store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use lifequest_core::MessageId;
use lifequest_core::value::compare_values;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::backend::{
    CollectionPath, Direction, DocPath, DocumentCallback, DocumentSnapshot, DocumentStore,
    ErrorCallback, FieldValue, ListenerHandle, Query, QueryCallback, WriteData,
};
use crate::errors::{BackendError, BackendResult};

type DocFn = Arc<dyn Fn(Option<DocumentSnapshot>) + Send + Sync>;
type QueryFn = Arc<dyn Fn(Vec<DocumentSnapshot>) + Send + Sync>;
type ErrFn = Arc<dyn Fn(BackendError) + Send + Sync>;

struct DocListener {
    path: DocPath,
    on_next: DocFn,
    on_error: ErrFn,
}

struct QueryListener {
    query: Query,
    on_next: QueryFn,
    on_error: ErrFn,
}

/// Pending callback invocations, collected under the lock and run after it
/// is released.
enum Delivery {
    Doc(DocFn, Option<DocumentSnapshot>),
    Query(QueryFn, Vec<DocumentSnapshot>),
}

impl Delivery {
    fn run(self) {
        match self {
            Self::Doc(f, snapshot) => f(snapshot),
            Self::Query(f, docs) => f(docs),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// collection path -> document id -> data
    collections: BTreeMap<String, BTreeMap<String, Map<String, Value>>>,
    doc_listeners: HashMap<u64, DocListener>,
    query_listeners: HashMap<u64, QueryListener>,
    next_listener: u64,
    last_timestamp: i64,
    writes: usize,
    fail_write: Option<BackendError>,
    fail_read: Option<BackendError>,
    fail_listen: Option<BackendError>,
}

impl Inner {
    fn document(&self, path: &DocPath) -> Option<&Map<String, Value>> {
        self.collections
            .get(&path.parent().to_string())
            .and_then(|docs| docs.get(path.id()))
    }

    fn snapshot(&self, path: &DocPath) -> Option<DocumentSnapshot> {
        self.document(path).map(|data| DocumentSnapshot {
            id: path.id().to_owned(),
            data: data.clone(),
        })
    }

    /// Query result: documents lacking the order field are left out, ties
    /// break on document id.
    fn run_query(&self, query: &Query) -> Vec<DocumentSnapshot> {
        let Some(docs) = self.collections.get(&query.collection.to_string()) else {
            return Vec::new();
        };
        let mut out: Vec<DocumentSnapshot> = docs
            .iter()
            .filter(|(_, data)| {
                query
                    .order_by
                    .as_ref()
                    .is_none_or(|o| data.contains_key(&o.field))
            })
            .map(|(id, data)| DocumentSnapshot {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some(order) = &query.order_by {
            out.sort_by(|a, b| {
                let ord = compare_values(
                    a.data.get(&order.field).unwrap_or(&Value::Null),
                    b.data.get(&order.field).unwrap_or(&Value::Null),
                )
                .then_with(|| a.id.cmp(&b.id));
                match order.direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        out
    }

    fn server_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis().max(self.last_timestamp + 1);
        self.last_timestamp = now;
        now
    }

    /// Apply a shallow merge to `path`, creating the document if needed.
    fn apply(&mut self, path: &DocPath, data: &WriteData) {
        let mut resolved = Vec::with_capacity(data.iter().count());
        for (key, value) in data.iter() {
            let v = match value {
                FieldValue::Value(v) => v.clone(),
                FieldValue::ServerTimestamp => Value::from(self.server_timestamp()),
                FieldValue::ArrayUnion(items) => {
                    let mut current = self
                        .document(path)
                        .and_then(|d| d.get(key))
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    for item in items {
                        if !current.contains(item) {
                            current.push(item.clone());
                        }
                    }
                    Value::Array(current)
                }
            };
            resolved.push((key.to_owned(), v));
        }

        let doc = self
            .collections
            .entry(path.parent().to_string())
            .or_default()
            .entry(path.id().to_owned())
            .or_default();
        for (key, v) in resolved {
            let _ = doc.insert(key, v);
        }
        self.writes += 1;
    }

    /// Callbacks owed to listeners watching `path` or its collection.
    fn deliveries_for(&self, path: &DocPath) -> Vec<Delivery> {
        let collection = path.parent();
        let mut out = Vec::new();
        for listener in self.doc_listeners.values() {
            if listener.path == *path {
                out.push(Delivery::Doc(
                    Arc::clone(&listener.on_next),
                    self.snapshot(path),
                ));
            }
        }
        for listener in self.query_listeners.values() {
            if listener.query.collection == collection {
                out.push(Delivery::Query(
                    Arc::clone(&listener.on_next),
                    self.run_query(&listener.query),
                ));
            }
        }
        out
    }

    fn next_listener_id(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document without counting it as a write or notifying
    /// listeners.
    pub fn seed(&self, path: &DocPath, data: Map<String, Value>) {
        let _ = self
            .inner
            .lock()
            .collections
            .entry(path.parent().to_string())
            .or_default()
            .insert(path.id().to_owned(), data);
    }

    /// Current data of one document.
    pub fn document(&self, path: &DocPath) -> Option<Map<String, Value>> {
        self.inner.lock().document(path).cloned()
    }

    /// Number of documents in a collection.
    pub fn collection_len(&self, collection: &CollectionPath) -> usize {
        self.inner
            .lock()
            .collections
            .get(&collection.to_string())
            .map_or(0, BTreeMap::len)
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().writes
    }

    /// Live listeners (documents and queries).
    pub fn listener_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.doc_listeners.len() + inner.query_listeners.len()
    }

    /// Targets of the live listeners, sorted.
    pub fn active_targets(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut targets: Vec<String> = inner
            .doc_listeners
            .values()
            .map(|l| l.path.to_string())
            .chain(
                inner
                    .query_listeners
                    .values()
                    .map(|l| l.query.collection.to_string()),
            )
            .collect();
        targets.sort();
        targets
    }

    /// Make the next write (`set_merge`, `update` or `add`) fail.
    pub fn fail_next_write(&self, err: BackendError) {
        self.inner.lock().fail_write = Some(err);
    }

    /// Make the next `get` fail.
    pub fn fail_next_read(&self, err: BackendError) {
        self.inner.lock().fail_read = Some(err);
    }

    /// Make the next listener registration fail.
    pub fn fail_next_listen(&self, err: BackendError) {
        self.inner.lock().fail_listen = Some(err);
    }

    /// Kill every listener on `target` with `err`, the way the hosted
    /// service does when rules or connectivity change. Returns how many
    /// listeners were hit.
    pub fn emit_listener_error(&self, target: &str, err: &BackendError) -> usize {
        let callbacks: Vec<ErrFn> = {
            let mut inner = self.inner.lock();
            let doc_ids: Vec<u64> = inner
                .doc_listeners
                .iter()
                .filter(|(_, l)| l.path.to_string() == target)
                .map(|(id, _)| *id)
                .collect();
            let query_ids: Vec<u64> = inner
                .query_listeners
                .iter()
                .filter(|(_, l)| l.query.collection.to_string() == target)
                .map(|(id, _)| *id)
                .collect();

            let mut callbacks = Vec::new();
            for id in doc_ids {
                if let Some(l) = inner.doc_listeners.remove(&id) {
                    callbacks.push(l.on_error);
                }
            }
            for id in query_ids {
                if let Some(l) = inner.query_listeners.remove(&id) {
                    callbacks.push(l.on_error);
                }
            }
            callbacks
        };
        for cb in &callbacks {
            cb(err.clone());
        }
        callbacks.len()
    }

    fn write(&self, path: &DocPath, data: &WriteData, must_exist: bool) -> BackendResult<()> {
        let deliveries = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.fail_write.take() {
                return Err(err);
            }
            if must_exist && inner.document(path).is_none() {
                return Err(BackendError::NotFound(path.to_string()));
            }
            inner.apply(path, data);
            inner.deliveries_for(path)
        };
        debug!(path = %path, listeners = deliveries.len(), "document written");
        deliveries.into_iter().for_each(Delivery::run);
        Ok(())
    }

    fn canceller(&self, id: u64) -> impl FnOnce() + Send + 'static {
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(&self.inner);
        move || {
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock();
                let _ = inner.doc_listeners.remove(&id);
                let _ = inner.query_listeners.remove(&id);
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> BackendResult<Option<DocumentSnapshot>> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.fail_read.take() {
            return Err(err);
        }
        Ok(inner.snapshot(path))
    }

    async fn set_merge(&self, path: &DocPath, data: WriteData) -> BackendResult<()> {
        self.write(path, &data, false)
    }

    async fn update(&self, path: &DocPath, data: WriteData) -> BackendResult<()> {
        self.write(path, &data, true)
    }

    async fn add(&self, collection: &CollectionPath, data: WriteData) -> BackendResult<String> {
        let id = MessageId::generate().into_inner();
        self.write(&collection.doc(&id), &data, false)?;
        Ok(id)
    }

    fn listen_document(
        &self,
        path: &DocPath,
        on_next: DocumentCallback,
        on_error: ErrorCallback,
    ) -> BackendResult<ListenerHandle> {
        let on_next: DocFn = Arc::from(on_next);
        let (id, initial) = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.fail_listen.take() {
                return Err(err);
            }
            let id = inner.next_listener_id();
            let _ = inner.doc_listeners.insert(
                id,
                DocListener {
                    path: path.clone(),
                    on_next: Arc::clone(&on_next),
                    on_error: Arc::from(on_error),
                },
            );
            (id, inner.snapshot(path))
        };
        debug!(path = %path, listener = id, "document listener registered");
        let handle = ListenerHandle::new(path.to_string(), self.canceller(id));
        on_next(initial);
        Ok(handle)
    }

    fn listen_query(
        &self,
        query: &Query,
        on_next: QueryCallback,
        on_error: ErrorCallback,
    ) -> BackendResult<ListenerHandle> {
        let on_next: QueryFn = Arc::from(on_next);
        let (id, initial) = {
            let mut inner = self.inner.lock();
            if let Some(err) = inner.fail_listen.take() {
                return Err(err);
            }
            let id = inner.next_listener_id();
            let _ = inner.query_listeners.insert(
                id,
                QueryListener {
                    query: query.clone(),
                    on_next: Arc::clone(&on_next),
                    on_error: Arc::from(on_error),
                },
            );
            (id, inner.run_query(query))
        };
        debug!(collection = %query.collection, listener = id, "query listener registered");
        let handle = ListenerHandle::new(query.collection.to_string(), self.canceller(id));
        on_next(initial);
        Ok(handle)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryStore")
            .field("collections", &inner.collections.len())
            .field("listeners", &(inner.doc_listeners.len() + inner.query_listeners.len()))
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
