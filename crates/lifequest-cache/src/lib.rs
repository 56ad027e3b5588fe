//! # lifequest-cache
//!
//! Offline support for the LifeQuest web app: a cache-first network
//! interceptor modeled on the service-worker lifecycle.
//!
//! - **Install** fetches the static manifest into the current cache
//!   generation, all or nothing
//! - **Fetch** answers GET requests from any cache, falling back to the
//!   network without storing the result
//! - **Activate** deletes every cache generation except the current one
//!
//! Storage ([`CacheStorage`]) and network ([`Fetcher`]) are injected; the
//! crate ships an in-memory and an on-disk storage and a `reqwest` fetcher.

#![deny(unsafe_code)]

pub mod errors;
pub mod fetcher;
pub mod response;
pub mod storage;
pub mod worker;

pub use errors::{CacheError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use response::{CachedResponse, Request};
pub use storage::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use worker::{FetchSource, Served, ServiceWorker, WorkerConfig, WorkerState};
