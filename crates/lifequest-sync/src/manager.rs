//! Session & subscription manager.
//!
//! [`SessionManager`] ties the auth stream, the document listeners and the
//! shared [`AppContext`] together:
//!
//! - **Auth transitions** are funneled through one event channel and handled
//!   one at a time (signing in binds the user-document listener, signing out
//!   releases it and leaves the state alone)
//! - **Navigation** (`open_chat_room`, `listen_communities`) rebinds the
//!   matching [`SubscriptionSlot`]; the previous listener is always cancelled
//!   first
//! - **User actions** (send, save, create/join community) check their
//!   preconditions locally and report blocking failures through the
//!   [`Notifier`]
//! - **Listener failures** arrive as events too and only drop the listener
//!   that failed

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use lifequest_core::{
    ChatMessage, Community, CommunityId, Identity, MessageId, Notice, RoomId, UserId,
};
use lifequest_settings::{BackendSettings, LifeQuestSettings, SyncSettings};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{
    AuthProvider, CollectionPath, Direction, DocPath, DocumentSnapshot, DocumentStore,
    ErrorCallback, ListenerHandle, Query, WriteData,
};
use crate::context::AppContext;
use crate::errors::{BackendError, BackendResult, Result, SyncError};
use crate::notifier::Notifier;
use crate::slot::{SlotState, SubscriptionSlot};

/// Field the chat query orders by.
const TIMESTAMP_FIELD: &str = "timestamp";

/// Automatic re-subscriptions of a chat room allowed until one of them
/// delivers an update past its initial snapshot.
const CHAT_RESUME_BUDGET: u32 = 1;

/// Receives the full ordered message list of the open room on every push.
pub type ChatListFn = dyn Fn(Vec<ChatMessage>) + Send + Sync;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Collection names of the document database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionLayout {
    /// One record per user, keyed by uid.
    pub users: String,
    /// One document per chat room.
    pub chats: String,
    /// Message sub-collection of a room.
    pub messages: String,
    /// Community documents.
    pub communities: String,
}

impl Default for CollectionLayout {
    fn default() -> Self {
        Self::from_settings(&BackendSettings::default())
    }
}

impl CollectionLayout {
    /// Layout from backend settings.
    pub fn from_settings(backend: &BackendSettings) -> Self {
        Self {
            users: backend.users_collection.clone(),
            chats: backend.chats_collection.clone(),
            messages: backend.messages_collection.clone(),
            communities: backend.communities_collection.clone(),
        }
    }

    /// `users/{uid}`
    pub fn user_doc(&self, uid: &UserId) -> DocPath {
        CollectionPath::root(&self.users).doc(uid)
    }

    /// `chats/{room}/messages`
    pub fn messages(&self, room: &RoomId) -> CollectionPath {
        CollectionPath::root(&self.chats)
            .doc(room)
            .collection(&self.messages)
    }

    /// `communities`
    pub fn communities(&self) -> CollectionPath {
        CollectionPath::root(&self.communities)
    }

    /// `communities/{id}`
    pub fn community(&self, id: &CommunityId) -> DocPath {
        self.communities().doc(id)
    }
}

/// Everything the manager needs besides its collaborators.
#[derive(Clone, Debug, Default)]
pub struct ManagerConfig {
    /// Collection names.
    pub layout: CollectionLayout,
    /// Behavior knobs and state defaults.
    pub sync: SyncSettings,
}

impl ManagerConfig {
    /// Config from loaded settings.
    pub fn from_settings(settings: &LifeQuestSettings) -> Self {
        Self {
            layout: CollectionLayout::from_settings(&settings.backend),
            sync: settings.sync.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Logical resource a slot tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// The signed-in user's record.
    User,
    /// The open chat room's messages.
    ChatRoom,
    /// The community list.
    Communities,
}

impl Resource {
    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ChatRoom => "chat_room",
            Self::Communities => "communities",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work for the driver loop.
#[derive(Debug)]
enum SyncEvent {
    AuthChanged(Option<Identity>),
    ListenerFailed {
        resource: Resource,
        binding: u64,
        error: BackendError,
    },
}

struct OpenRoom {
    room: RoomId,
    on_list: Arc<ChatListFn>,
    /// Resumes since the last healthy update.
    resumes: Arc<AtomicU32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Client-side session and subscription lifecycle.
pub struct SessionManager {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    context: Arc<AppContext>,
    notifier: Arc<dyn Notifier>,
    config: ManagerConfig,

    identity: RwLock<Option<Identity>>,
    user_slot: SubscriptionSlot,
    chat_slot: SubscriptionSlot,
    community_slot: SubscriptionSlot,
    open_room: Mutex<Option<OpenRoom>>,
    auth_registration: Mutex<Option<ListenerHandle>>,

    /// Serializes auth transitions that are driven directly instead of
    /// through the event loop.
    transition: tokio::sync::Mutex<()>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SyncEvent>>,
}

impl SessionManager {
    /// Manager with no session and every slot unbound.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
        context: Arc<AppContext>,
        notifier: Arc<dyn Notifier>,
        config: ManagerConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            store,
            auth,
            context,
            notifier,
            config,
            identity: RwLock::new(None),
            user_slot: SubscriptionSlot::new("user"),
            chat_slot: SubscriptionSlot::new("chat_room"),
            community_slot: SubscriptionSlot::new("communities"),
            open_room: Mutex::new(None),
            auth_registration: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
        }
    }

    /// Subscribe to the auth stream.
    ///
    /// Transitions are queued and handled by [`run`](Self::run) or
    /// [`process_pending`](Self::process_pending). Attaching again replaces
    /// the previous registration.
    pub fn attach(&self) {
        let tx = self.events_tx.clone();
        let handle = self.auth.on_auth_state_changed(Box::new(move |identity| {
            let _ = tx.send(SyncEvent::AuthChanged(identity));
        }));
        let previous = self.auth_registration.lock().replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
        debug!("attached to auth stream");
    }

    /// Drive queued events until `cancel` fires, then tear everything down.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.events_rx.lock().await;
        info!("session manager running");
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
                () = cancel.cancelled() => break,
            }
        }
        drop(rx);
        self.shutdown();
        info!("session manager stopped");
    }

    /// Handle every event queued so far. Returns how many were handled, or 0
    /// when [`run`](Self::run) owns the queue.
    pub async fn process_pending(&self) -> usize {
        let mut handled = 0;
        loop {
            let event = {
                let Ok(mut rx) = self.events_rx.try_lock() else {
                    return handled;
                };
                match rx.try_recv() {
                    Ok(event) => event,
                    Err(_) => return handled,
                }
            };
            self.handle_event(event).await;
            handled += 1;
        }
    }

    async fn handle_event(&self, event: SyncEvent) {
        match event {
            SyncEvent::AuthChanged(identity) => self.on_auth_changed(identity).await,
            SyncEvent::ListenerFailed {
                resource,
                binding,
                error,
            } => self.on_listener_failed(resource, binding, &error),
        }
    }

    // ── Auth ────────────────────────────────────────────────────────────────

    /// React to an auth transition.
    ///
    /// Signing in releases the previous user listener, makes sure the user's
    /// record exists, merges the provider's profile attributes into it and
    /// binds a fresh listener. Signing out only releases the listener. The
    /// render hook runs in both cases. Backend failures along the way are
    /// logged; the remaining steps still run.
    #[instrument(skip_all, fields(uid = identity.as_ref().map(|i| i.uid.as_str())))]
    pub async fn on_auth_changed(&self, identity: Option<Identity>) {
        let _transition = self.transition.lock().await;

        let _ = self.user_slot.release();
        match identity {
            Some(identity) => {
                *self.identity.write() = Some(identity.clone());
                let path = self.config.layout.user_doc(&identity.uid);

                match self.ensure_user_record(&path, &identity).await {
                    Ok(true) => info!(path = %path, "created user record"),
                    Ok(false) => {}
                    Err(e) => error!(path = %path, error = %e, "failed to ensure user record"),
                }

                let profile = identity.profile_fields();
                if !profile.is_empty() {
                    if let Err(e) = self
                        .store
                        .set_merge(&path, WriteData::from_map(profile))
                        .await
                    {
                        error!(path = %path, error = %e, "failed to merge profile into user record");
                    }
                }

                if let Err(e) = self.bind_user(&path) {
                    error!(path = %path, error = %e, "failed to listen to user record");
                }
            }
            None => {
                let previous = self.identity.write().take();
                if let Some(previous) = previous {
                    info!(uid = %previous.uid, "signed out");
                }
            }
        }

        let _ = self.context.request_render();
    }

    /// Create the user's record from the local state if it doesn't exist.
    async fn ensure_user_record(&self, path: &DocPath, identity: &Identity) -> BackendResult<bool> {
        if self.store.get(path).await?.is_some() {
            return Ok(false);
        }
        let mut record = self
            .context
            .read(|s| s.to_persisted(&self.config.sync.default_state));
        let name = identity
            .display_name
            .as_deref()
            .map_or(Value::Null, Value::from);
        let _ = record.insert("name".into(), name);
        self.store
            .set_merge(path, WriteData::from_map(record))
            .await?;
        Ok(true)
    }

    fn bind_user(&self, path: &DocPath) -> BackendResult<u64> {
        let context = Arc::clone(&self.context);
        let defaults = self.config.sync.default_state.clone();
        self.user_slot.rebind(|binding| {
            self.store.listen_document(
                path,
                Box::new(move |snapshot: Option<DocumentSnapshot>| {
                    let Some(doc) = snapshot else { return };
                    context.apply_snapshot(&doc.data, &defaults);
                    let _ = context.request_render();
                }),
                self.failure_callback(Resource::User, binding),
            )
        })
    }

    /// Interactive sign-in. The resulting transition arrives through the auth
    /// stream.
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<Identity> {
        match self.auth.sign_in_with_popup().await {
            Ok(identity) => {
                info!(uid = %identity.uid, "signed in");
                Ok(identity)
            }
            Err(e) => {
                error!(error = %e, "sign-in failed");
                self.notifier
                    .notify(Notice::error(format!("Login error: {e}")));
                Err(e.into())
            }
        }
    }

    /// End the session. Failures are logged only.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        self.auth.sign_out().await.map_err(|e| {
            error!(error = %e, "sign-out failed");
            SyncError::from(e)
        })
    }

    // ── Chat ────────────────────────────────────────────────────────────────

    /// Show `room`: cancel the previous chat listener and listen to the
    /// room's messages in timestamp order. `on_list` gets the whole list on
    /// every push.
    #[instrument(skip(self, on_list), fields(room = %room))]
    pub fn open_chat_room(
        &self,
        room: &RoomId,
        on_list: impl Fn(Vec<ChatMessage>) + Send + Sync + 'static,
    ) -> Result<()> {
        let on_list: Arc<ChatListFn> = Arc::new(on_list);
        let resumes = Arc::new(AtomicU32::new(0));
        *self.open_room.lock() = Some(OpenRoom {
            room: room.clone(),
            on_list: Arc::clone(&on_list),
            resumes: Arc::clone(&resumes),
        });
        let _ = self.bind_chat(room, on_list, resumes).map_err(|e| {
            error!(room = %room, error = %e, "failed to listen to chat room");
            SyncError::from(e)
        })?;
        Ok(())
    }

    fn bind_chat(
        &self,
        room: &RoomId,
        on_list: Arc<ChatListFn>,
        resumes: Arc<AtomicU32>,
    ) -> BackendResult<u64> {
        let query = Query::new(self.config.layout.messages(room))
            .order_by(TIMESTAMP_FIELD, Direction::Ascending);
        let initial_seen = AtomicBool::new(false);
        self.chat_slot.rebind(|binding| {
            self.store.listen_query(
                &query,
                Box::new(move |docs: Vec<DocumentSnapshot>| {
                    if initial_seen.swap(true, Ordering::SeqCst) {
                        resumes.store(0, Ordering::SeqCst);
                    }
                    on_list(
                        docs.iter()
                            .map(|doc| ChatMessage::from_document(&doc.id, &doc.data))
                            .collect(),
                    );
                }),
                self.failure_callback(Resource::ChatRoom, binding),
            )
        })
    }

    /// Leave the chat view. Returns whether a room listener was live.
    pub fn close_chat_room(&self) -> bool {
        let _ = self.open_room.lock().take();
        self.chat_slot.release()
    }

    /// Post `text` to `room` as the signed-in user.
    ///
    /// Without a session, or with blank text, the user is warned and nothing
    /// reaches the backend. Retryable failures are retried up to
    /// `send_retries` times before the user is notified.
    #[instrument(skip(self, text), fields(room = %room))]
    pub async fn send_message(&self, room: &RoomId, text: &str) -> Result<MessageId> {
        let Some(identity) = self.current_identity() else {
            self.notifier
                .notify(Notice::warning("Sign in to send messages."));
            return Err(SyncError::NotSignedIn);
        };
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank message");
            self.notifier.notify(Notice::warning("Type a message first."));
            return Err(SyncError::EmptyMessage);
        }

        let collection = self.config.layout.messages(room);
        let data = WriteData::new()
            .set("userId", identity.uid.as_str())
            .set("userName", optional(identity.display_name.as_deref()))
            .set("avatar", optional(identity.photo_url.as_deref()))
            .set("text", text)
            .server_timestamp(TIMESTAMP_FIELD);

        let retries = self.config.sync.send_retries;
        let mut attempt = 0;
        loop {
            match self.store.add(&collection, data.clone()).await {
                Ok(id) => {
                    debug!(message_id = %id, attempt, "message sent");
                    return Ok(MessageId::from(id));
                }
                Err(e) if e.is_retryable() && attempt < retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, max_retries = retries, "send failed, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    error!(error = %e, "send failed");
                    self.notifier
                        .notify(Notice::error(format!("Error sending: {e}")));
                    return Err(e.into());
                }
            }
        }
    }

    // ── Progress & profile ──────────────────────────────────────────────────

    /// Persist the shared state into the user's record.
    ///
    /// `level`, `xp` and `gold` are written as numbers. Without an identity
    /// this does nothing. Failures are logged only.
    #[instrument(skip_all, fields(uid = identity.map(|i| i.uid.as_str())))]
    pub async fn save_progress(&self, identity: Option<&Identity>) -> Result<()> {
        let Some(identity) = identity else {
            debug!("no identity, progress not saved");
            return Ok(());
        };
        let path = self.config.layout.user_doc(&identity.uid);
        let record = self
            .context
            .read(|s| s.to_persisted(&self.config.sync.default_state));
        match self
            .store
            .set_merge(&path, WriteData::from_map(record))
            .await
        {
            Ok(()) => {
                debug!(path = %path, "progress saved");
                Ok(())
            }
            Err(e) => {
                error!(path = %path, error = %e, "failed to save progress");
                Err(e.into())
            }
        }
    }

    /// Store a new avatar (URL or data URL) on the user's record.
    #[instrument(skip_all)]
    pub async fn save_profile_picture(&self, picture: &str) -> Result<()> {
        let Some(identity) = self.current_identity() else {
            self.notifier
                .notify(Notice::warning("Sign in to save your picture."));
            return Err(SyncError::NotSignedIn);
        };
        let path = self.config.layout.user_doc(&identity.uid);
        let data = WriteData::new().set(lifequest_core::state::PROFILE_PICTURE, picture);
        match self.store.set_merge(&path, data).await {
            Ok(()) => {
                self.notifier.notify(Notice::info("Profile picture saved."));
                Ok(())
            }
            Err(e) => {
                error!(path = %path, error = %e, "failed to save profile picture");
                self.notifier.notify(Notice::error("Error saving image"));
                Err(e.into())
            }
        }
    }

    // ── Communities ─────────────────────────────────────────────────────────

    /// Create (or merge into) the community named `name`; the id is the
    /// slugified name.
    #[instrument(skip(self))]
    pub async fn create_community(&self, name: &str) -> Result<CommunityId> {
        let Some(id) = CommunityId::slugify(name) else {
            self.notifier.notify(Notice::warning("Enter a name"));
            return Err(SyncError::EmptyCommunityName);
        };
        let data = WriteData::new()
            .set("name", name.trim())
            .set("description", "")
            .set("members", Value::Array(Vec::new()));
        match self
            .store
            .set_merge(&self.config.layout.community(&id), data)
            .await
        {
            Ok(()) => {
                info!(community = %id, "community created");
                self.notifier
                    .notify(Notice::info(format!("Community created: {id}")));
                Ok(id)
            }
            Err(e) => {
                error!(community = %id, error = %e, "failed to create community");
                self.notifier.notify(Notice::error(format!("Error: {e}")));
                Err(e.into())
            }
        }
    }

    /// Add the signed-in user to a community's members.
    #[instrument(skip(self), fields(community = %id))]
    pub async fn join_community(&self, id: &CommunityId) -> Result<()> {
        let Some(identity) = self.current_identity() else {
            self.notifier.notify(Notice::warning("Sign in to join"));
            return Err(SyncError::NotSignedIn);
        };
        let data =
            WriteData::new().array_union("members", vec![Value::from(identity.uid.as_str())]);
        match self
            .store
            .update(&self.config.layout.community(id), data)
            .await
        {
            Ok(()) => {
                info!(uid = %identity.uid, "joined community");
                self.notifier.notify(Notice::info(format!("Joined: {id}")));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to join community");
                self.notifier.notify(Notice::error(format!("Error: {e}")));
                Err(e.into())
            }
        }
    }

    /// Listen to the community list, ordered by name.
    pub fn listen_communities(
        &self,
        on_list: impl Fn(Vec<Community>) + Send + Sync + 'static,
    ) -> Result<()> {
        let query =
            Query::new(self.config.layout.communities()).order_by("name", Direction::Ascending);
        let collection = self.config.layout.communities().to_string();
        let _ = self
            .community_slot
            .rebind(|binding| {
                self.store.listen_query(
                    &query,
                    Box::new(move |docs: Vec<DocumentSnapshot>| {
                        on_list(decode_all(&docs, Community::from_document, &collection));
                    }),
                    self.failure_callback(Resource::Communities, binding),
                )
            })
            .map_err(|e| {
                error!(error = %e, "failed to listen to communities");
                SyncError::from(e)
            })?;
        Ok(())
    }

    // ── Failures & teardown ─────────────────────────────────────────────────

    fn failure_callback(&self, resource: Resource, binding: u64) -> ErrorCallback {
        let tx = self.events_tx.clone();
        Box::new(move |error| {
            let _ = tx.send(SyncEvent::ListenerFailed {
                resource,
                binding,
                error,
            });
        })
    }

    fn on_listener_failed(&self, resource: Resource, binding: u64, error: &BackendError) {
        let released = self.slot(resource).release_if(binding);
        if !released {
            debug!(resource = %resource, binding, error = %error, "stale listener failure ignored");
            return;
        }
        error!(resource = %resource, binding, error = %error, "listener failed");

        if resource == Resource::ChatRoom && self.config.sync.resume_chat_on_error {
            let reopen = self.open_room.lock().as_ref().map(|open| {
                (
                    open.room.clone(),
                    Arc::clone(&open.on_list),
                    Arc::clone(&open.resumes),
                )
            });
            let Some((room, on_list, resumes)) = reopen else {
                return;
            };
            let attempt = resumes.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > CHAT_RESUME_BUDGET {
                warn!(room = %room, attempt, "chat listener keeps failing, not resuming");
                return;
            }
            match self.bind_chat(&room, on_list, resumes) {
                Ok(_) => info!(room = %room, attempt, "chat listener resumed"),
                Err(e) => error!(room = %room, error = %e, "failed to resume chat listener"),
            }
        }
    }

    /// Release every listener and the auth registration.
    pub fn shutdown(&self) {
        let _ = self.user_slot.release();
        let _ = self.chat_slot.release();
        let _ = self.community_slot.release();
        let _ = self.open_room.lock().take();
        let registration = self.auth_registration.lock().take();
        if let Some(registration) = registration {
            registration.cancel();
        }
        debug!("session manager shut down");
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    /// The signed-in identity.
    pub fn current_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    /// Room whose listener was last opened.
    pub fn current_room(&self) -> Option<RoomId> {
        self.open_room.lock().as_ref().map(|o| o.room.clone())
    }

    /// Shared state and render hook.
    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Effective configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// State of one resource's slot.
    pub fn slot_state(&self, resource: Resource) -> SlotState {
        self.slot(resource).state()
    }

    fn slot(&self, resource: Resource) -> &SubscriptionSlot {
        match resource {
            Resource::User => &self.user_slot,
            Resource::ChatRoom => &self.chat_slot,
            Resource::Communities => &self.community_slot,
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("identity", &*self.identity.read())
            .field("user", &self.user_slot)
            .field("chat_room", &self.chat_slot)
            .field("communities", &self.community_slot)
            .finish_non_exhaustive()
    }
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::Null, Value::from)
}

/// Decode a pushed result set, skipping (and logging) malformed documents.
fn decode_all<T>(
    docs: &[DocumentSnapshot],
    decode: impl Fn(&str, &serde_json::Map<String, Value>) -> lifequest_core::Result<T>,
    source: &dyn fmt::Display,
) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(&doc.id, &doc.data) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(source = %source, doc_id = %doc.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAuth, MemoryStore};
    use crate::notifier::RecordingNotifier;
    use lifequest_core::NoticeLevel;
    use lifequest_core::logging::capture_logs;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Level;

    struct Fixture {
        store: MemoryStore,
        auth: MemoryAuth,
        notices: Arc<RecordingNotifier>,
        renders: Arc<AtomicUsize>,
        manager: SessionManager,
    }

    fn fixture_with(config: ManagerConfig) -> Fixture {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let notices = Arc::new(RecordingNotifier::new());
        let renders = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&renders);
        let context = Arc::new(AppContext::default().with_render_hook(Arc::new(move || {
            let _ = r.fetch_add(1, Ordering::SeqCst);
        })));
        let manager = SessionManager::new(
            Arc::new(store.clone()),
            Arc::new(auth.clone()),
            context,
            Arc::clone(&notices) as Arc<dyn Notifier>,
            config,
        );
        Fixture {
            store,
            auth,
            notices,
            renders,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ManagerConfig::default())
    }

    fn ana() -> Identity {
        Identity::new("u1")
            .with_display_name("Ana")
            .with_email("ana@example.com")
    }

    #[test]
    fn layout_paths() {
        let layout = CollectionLayout::default();
        assert_eq!(layout.user_doc(&UserId::from("u1")).to_string(), "users/u1");
        assert_eq!(
            layout.messages(&RoomId::from("global")).to_string(),
            "chats/global/messages"
        );
        assert_eq!(
            layout.community(&CommunityId::from("guild")).to_string(),
            "communities/guild"
        );
    }

    #[test]
    fn config_follows_settings() {
        let mut settings = LifeQuestSettings::default();
        settings.backend.users_collection = "players".into();
        settings.sync.send_retries = 3;
        let config = ManagerConfig::from_settings(&settings);
        assert_eq!(config.layout.users, "players");
        assert_eq!(config.sync.send_retries, 3);
    }

    #[test]
    fn resource_names() {
        assert_eq!(Resource::ChatRoom.to_string(), "chat_room");
        assert_eq!(Resource::User.as_str(), "user");
    }

    #[tokio::test]
    async fn sign_in_creates_record_and_binds_listener() {
        let f = fixture();
        f.manager.on_auth_changed(Some(ana())).await;

        let record = f.store.document(&CollectionPath::root("users").doc("u1")).unwrap();
        assert_eq!(record["name"], json!("Ana"));
        assert_eq!(record["email"], json!("ana@example.com"));
        assert_eq!(record["level"], json!(1));
        assert!(!record.contains_key("profilePicture") || record["profilePicture"].is_null());
        assert_eq!(f.store.active_targets(), vec!["users/u1".to_string()]);
        assert!(f.renders.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn existing_record_is_not_overwritten() {
        let f = fixture();
        let path = CollectionPath::root("users").doc("u1");
        f.store.seed(
            &path,
            json!({"level": 7, "xp": 30, "gold": 9, "name": "Old"})
                .as_object()
                .cloned()
                .unwrap(),
        );

        f.manager.on_auth_changed(Some(Identity::new("u1"))).await;

        let record = f.store.document(&path).unwrap();
        assert_eq!(record["level"], json!(7));
        assert_eq!(record["name"], json!("Old"));
        assert_eq!(f.manager.context().state().get("level"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn listener_failure_drops_only_that_listener() {
        let f = fixture();
        f.manager.on_auth_changed(Some(ana())).await;
        f.manager
            .open_chat_room(&RoomId::from("global"), |_| {})
            .unwrap();

        let _ = f.store.emit_listener_error(
            "chats/global/messages",
            &BackendError::PermissionDenied("rules".into()),
        );
        assert_eq!(f.manager.process_pending().await, 1);

        assert_eq!(f.manager.slot_state(Resource::ChatRoom), SlotState::Unbound);
        assert!(matches!(
            f.manager.slot_state(Resource::User),
            SlotState::Bound { .. }
        ));
        assert!(f.manager.current_identity().is_some());
    }

    #[tokio::test]
    async fn stale_failure_does_not_release_successor() {
        let f = fixture();
        let room = RoomId::from("global");
        f.manager.open_chat_room(&room, |_| {}).unwrap();
        let SlotState::Bound { binding: first, .. } = f.manager.slot_state(Resource::ChatRoom)
        else {
            panic!("expected bound slot");
        };
        f.manager.open_chat_room(&room, |_| {}).unwrap();

        f.manager.on_listener_failed(
            Resource::ChatRoom,
            first,
            &BackendError::Unavailable("late".into()),
        );

        assert!(matches!(
            f.manager.slot_state(Resource::ChatRoom),
            SlotState::Bound { .. }
        ));
    }

    #[tokio::test]
    async fn chat_resumes_when_configured() {
        let mut config = ManagerConfig::default();
        config.sync.resume_chat_on_error = true;
        let f = fixture_with(config);
        let pushes = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pushes);
        f.manager
            .open_chat_room(&RoomId::from("guild"), move |_| {
                let _ = p.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let _ = f.store.emit_listener_error(
            "chats/guild/messages",
            &BackendError::Unavailable("blip".into()),
        );
        let _ = f.manager.process_pending().await;

        assert_eq!(
            f.store.active_targets(),
            vec!["chats/guild/messages".to_string()]
        );
        assert_eq!(pushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn send_retries_retryable_failures() {
        let mut config = ManagerConfig::default();
        config.sync.send_retries = 1;
        let f = fixture_with(config);
        f.manager.on_auth_changed(Some(ana())).await;
        f.store
            .fail_next_write(BackendError::Unavailable("offline".into()));

        let id = f
            .manager
            .send_message(&RoomId::from("global"), "hello")
            .await
            .unwrap();

        let messages = CollectionPath::root("chats").doc("global").collection("messages");
        assert!(f.store.document(&messages.doc(&id)).is_some());
        assert!(f.notices.notices().is_empty());
    }

    #[tokio::test]
    async fn send_failure_notifies_without_retry_by_default() {
        let f = fixture();
        f.manager.on_auth_changed(Some(ana())).await;
        f.store
            .fail_next_write(BackendError::Unavailable("offline".into()));

        let err = f
            .manager
            .send_message(&RoomId::from("global"), "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Backend(BackendError::Unavailable(_))));
        let notice = f.notices.last().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Error sending: unavailable: offline");
    }

    #[tokio::test]
    async fn message_carries_author_and_trimmed_text() {
        let f = fixture();
        f.manager
            .on_auth_changed(Some(ana().with_photo_url("https://img/ana.png")))
            .await;

        let id = f
            .manager
            .send_message(&RoomId::from("global"), "  hi there  ")
            .await
            .unwrap();

        let path = CollectionPath::root("chats")
            .doc("global")
            .collection("messages")
            .doc(&id);
        let doc = f.store.document(&path).unwrap();
        assert_eq!(doc["userId"], json!("u1"));
        assert_eq!(doc["userName"], json!("Ana"));
        assert_eq!(doc["avatar"], json!("https://img/ana.png"));
        assert_eq!(doc["text"], json!("hi there"));
        assert!(doc["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn sign_in_failure_is_surfaced() {
        let f = fixture();
        let err = f.manager.sign_in().await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Backend(BackendError::SignInCancelled(_))
        ));
        assert!(f.notices.last().unwrap().message.starts_with("Login error: "));
    }

    #[tokio::test]
    async fn sign_out_failure_is_logged_only() {
        let f = fixture();
        let (logs, _guard) = capture_logs();
        f.auth
            .fail_next_sign_out(BackendError::Unavailable("offline".into()));

        assert!(f.manager.sign_out().await.is_err());
        assert!(f.notices.notices().is_empty());
        assert!(logs.has_event(Level::ERROR, "sign-out failed"));
    }

    #[tokio::test]
    async fn attach_queues_initial_state() {
        let f = fixture();
        f.auth.set_user(Some(ana()));
        f.manager.attach();
        assert_eq!(f.auth.observer_count(), 1);

        assert_eq!(f.manager.process_pending().await, 1);
        assert_eq!(
            f.manager.current_identity().map(|i| i.uid),
            Some(UserId::from("u1"))
        );

        f.manager.shutdown();
        assert_eq!(f.auth.observer_count(), 0);
        assert_eq!(f.store.listener_count(), 0);
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancel() {
        let f = fixture();
        let manager = Arc::new(f.manager);
        manager.attach();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&manager).run(cancel.clone()));

        f.auth.set_user(Some(ana()));
        for _ in 0..50 {
            if manager.slot_state(Resource::User) != SlotState::Unbound {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            manager.slot_state(Resource::User),
            SlotState::Bound { .. }
        ));

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(f.store.listener_count(), 0);
        assert_eq!(f.auth.observer_count(), 0);
    }

    #[tokio::test]
    async fn incomplete_messages_are_still_delivered() {
        let f = fixture();
        let messages = CollectionPath::root("chats").doc("global").collection("messages");
        for (id, data) in [
            ("a", json!({"userId": "u1", "text": "hi", "timestamp": 1})),
            ("b", json!({"userName": "Ana", "text": "no author", "timestamp": 2})),
            ("c", json!({"userId": "u2", "timestamp": 3.0})),
        ] {
            f.store.seed(&messages.doc(id), data.as_object().cloned().unwrap());
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);

        f.manager
            .open_chat_room(&RoomId::from("global"), move |list| {
                *s.lock() = list;
            })
            .unwrap();

        let list = seen.lock().clone();
        let ids: Vec<&str> = list.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(list[1].display_name(), "Ana");
        assert_eq!(list[2].text, "");
        assert_eq!(list[2].timestamp.unwrap().timestamp_millis(), 3);
    }

    #[tokio::test]
    async fn chat_resume_gives_up_after_repeated_failures() {
        let mut config = ManagerConfig::default();
        config.sync.resume_chat_on_error = true;
        let f = fixture_with(config);
        let target = "chats/guild/messages";
        f.manager
            .open_chat_room(&RoomId::from("guild"), |_| {})
            .unwrap();

        let _ = f
            .store
            .emit_listener_error(target, &BackendError::Unavailable("blip".into()));
        let _ = f.manager.process_pending().await;
        assert_eq!(f.store.active_targets(), vec![target.to_string()]);

        let _ = f
            .store
            .emit_listener_error(target, &BackendError::Unavailable("blip".into()));
        let _ = f.manager.process_pending().await;

        assert!(f.store.active_targets().is_empty());
        assert_eq!(f.manager.slot_state(Resource::ChatRoom), SlotState::Unbound);
        assert_eq!(f.manager.current_room(), Some(RoomId::from("guild")));
    }

    #[tokio::test]
    async fn update_after_resume_restores_budget() {
        let mut config = ManagerConfig::default();
        config.sync.resume_chat_on_error = true;
        let f = fixture_with(config);
        let target = "chats/guild/messages";
        let messages = CollectionPath::root("chats").doc("guild").collection("messages");
        f.manager
            .open_chat_room(&RoomId::from("guild"), |_| {})
            .unwrap();

        for round in 0..3 {
            let _ = f
                .store
                .emit_listener_error(target, &BackendError::Unavailable("blip".into()));
            let _ = f.manager.process_pending().await;
            assert_eq!(f.store.active_targets(), vec![target.to_string()], "round {round}");

            let _ = f
                .store
                .add(&messages, WriteData::new().set("text", "ping").server_timestamp("timestamp"))
                .await
                .unwrap();
        }
    }
}
