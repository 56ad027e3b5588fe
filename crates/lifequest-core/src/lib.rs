//! # lifequest-core
//!
//! Foundation types shared by the LifeQuest sync and cache crates:
//!
//! - **Branded IDs**: `UserId`, `RoomId`, `CommunityId`, `MessageId` as newtypes
//! - **Identity**: the signed-in user's uid and profile attributes
//! - **Application state**: the shared [`AppState`] record plus the pure
//!   [`merge_snapshot`] used to fold backend pushes into it
//! - **Chat**: [`ChatMessage`] and [`Community`] decoded from documents
//! - **Notices**: user-facing [`Notice`] values (the "blocking alert" channel)
//! - **Errors**: [`CoreError`] via `thiserror`
//! - **Logging**: `tracing` subscriber setup and log capture for tests

#![deny(unsafe_code)]

pub mod chat;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod notice;
pub mod state;
pub mod value;

pub use chat::{ChatMessage, Community};
pub use errors::{CoreError, Result};
pub use identity::Identity;
pub use ids::{CommunityId, MessageId, RoomId, UserId};
pub use notice::{Notice, NoticeLevel};
pub use state::{AppState, StateDefaults, merge_snapshot};
