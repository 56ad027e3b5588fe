//! # lifequest-sync
//!
//! Client-side real-time synchronization for LifeQuest.
//!
//! - **Backend boundary** ([`backend`]): `AuthProvider` and `DocumentStore`
//!   traits, path types, write payloads, and [`ListenerHandle`], the
//!   cancellable registration every listener returns
//! - **Slots** ([`slot`]): [`SubscriptionSlot`] keeps at most one live
//!   listener per logical resource and always cancels before rebinding
//! - **Context** ([`context`]): the shared [`AppContext`] (state + render hook)
//!   and the [`Notifier`] used for user-facing notices
//! - **Manager** ([`manager`]): [`SessionManager`], which reacts to auth
//!   changes and navigation and relays pushed documents into the context
//! - **In-memory backend** ([`memory`]): `MemoryStore` / `MemoryAuth` fakes
//!   with the same listener semantics as the hosted service

#![deny(unsafe_code)]

pub mod backend;
pub mod context;
pub mod errors;
pub mod manager;
pub mod memory;
pub mod notifier;
pub mod slot;

pub use backend::{
    AuthProvider, CollectionPath, Direction, DocPath, DocumentSnapshot, DocumentStore, FieldValue,
    ListenerHandle, Query, WriteData,
};
pub use context::{AppContext, RenderHook};
pub use errors::{BackendError, Result, SyncError};
pub use manager::{ChatListFn, CollectionLayout, ManagerConfig, Resource, SessionManager};
pub use memory::{MemoryAuth, MemoryStore};
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use slot::{SlotState, SubscriptionSlot};
