//! State management module
//!
//! Handles bookmarks: the highest replication key value each entity has
//! committed. Bookmarks are persisted between runs to enable incremental
//! syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `Bookmark` / `BookmarkValue` - what a run commits
//! - `BookmarkStore` - the storage seam used by the sync engine
//! - `FileBookmarkStore` - JSON file persistence with atomic writes
//! - `MemoryBookmarkStore` - process-local storage

mod store;
mod types;

pub use store::{BookmarkStore, FileBookmarkStore, MemoryBookmarkStore};
pub use types::{parse_timestamp, Bookmark, BookmarkValue, StateFile};
