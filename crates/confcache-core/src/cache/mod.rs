//! Local persistent cache for offline data access.
//!
//! This module provides the persistence layers of the engine:
//! - `CacheStore`: raw key/value persistence (`FileStore`, `MemoryStore`)
//! - `CacheEntry`: a checksummed, timestamped snapshot of one table
//! - `EntryCodec`: converts entries to and from their stored form
//!
//! One entry is kept per logical table key (e.g. `agenda_items`).

pub mod codec;
pub mod entry;
pub mod error;
pub mod file_store;
pub mod store;

pub use codec::{EntryCodec, CODEC_VERSION};
pub use entry::{checksum, CacheEntry, Record};
pub use error::{DecodeError, StoreError};
pub use file_store::FileStore;
pub use store::{CacheStore, MemoryStore};
