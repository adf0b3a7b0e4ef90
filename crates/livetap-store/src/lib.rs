//! # livetap-store
//!
//! Storage for the ingestion pipeline:
//!
//! - [`buffer`]: the per-session [`SessionBuffer`] (Redis lists in
//!   production, an in-memory map in tests)
//! - [`archive`]: durable [`ArchiveStore`] on `SQLite`
//! - [`sessions`]: [`BroadcastSession`] records on the same database
//! - [`relay`]: Redis pub/sub carrying live messages from collectors to the
//!   API server

#![deny(unsafe_code)]

pub mod archive;
pub mod buffer;
pub mod errors;
pub mod relay;
pub mod sessions;
pub mod sqlite;

pub use archive::ArchiveStore;
pub use buffer::{InMemorySessionBuffer, RedisSessionBuffer, SessionBuffer, buffer_key};
pub use errors::{BufferError, RelayError, StorageError};
pub use relay::{LivePublisher, RedisLivePublisher, RedisLiveSubscriber, live_channel};
pub use sessions::{BroadcastSession, SessionRecordStore};
pub use sqlite::SqliteStore;
