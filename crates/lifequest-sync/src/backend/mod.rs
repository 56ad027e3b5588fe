//! Boundary to the hosted auth provider and document database.
//!
//! Everything here is backend-agnostic: the manager only sees these traits,
//! so the hosted client and the in-memory fake are interchangeable.

mod auth;
mod listener;
mod path;
mod store;
mod write;

pub use auth::{AuthCallback, AuthProvider};
pub use listener::ListenerHandle;
pub use path::{CollectionPath, DocPath};
pub use store::{
    Direction, DocumentCallback, DocumentSnapshot, DocumentStore, ErrorCallback, OrderBy, Query,
    QueryCallback,
};
pub use write::{FieldValue, WriteData};
