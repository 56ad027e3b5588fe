//! In-memory backend.
//!
//! [`MemoryStore`] and [`MemoryAuth`] implement the backend traits with the
//! listener semantics of the hosted service (initial snapshot on subscribe,
//! full ordered result on every change, server timestamps, array-union) and
//! add fault injection for tests and offline demos.

mod auth;
mod store;

pub use auth::MemoryAuth;
pub use store::MemoryStore;
