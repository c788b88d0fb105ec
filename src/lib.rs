//! # entity-tap
//!
//! Schema discovery and resumable, incremental extraction for
//! entity-oriented HTTP APIs.
//!
//! ## Features
//!
//! - **Discovery**: enumerate entities from a listing endpoint, cached with a TTL
//! - **Schemas**: canonical types from remote field descriptors, replication
//!   key detection, optional flattening of nested fields
//! - **Pagination**: HATEOAS `next_page` links with retry, backoff and loop detection
//! - **Incremental Sync**: bookmarks with an overlap window, committed only
//!   after a complete page sequence
//! - **Batches**: bounded cross-entity concurrency with per-entity failure isolation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use entity_tap::{Tap, TapConfig, Result};
//! use futures::StreamExt;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = TapConfig::from_file("tap.yaml")?;
//!     let tap = Arc::new(Tap::new(config).await?);
//!     let cancel = CancellationToken::new();
//!
//!     let catalog = tap.discover(&cancel).await?;
//!
//!     let (messages, handle) = tap.read_stream(cancel);
//!     futures::pin_mut!(messages);
//!     while let Some(message) = messages.next().await {
//!         // records, bookmarks and outcomes
//!     }
//!     let report = handle.await.expect("read task")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                              Tap                                │
//! │   check() → Status   discover() → Catalog   read() → Report     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌────────────┬─────────────┬───┴─────────┬────────────┬───────────┐
//! │ Discovery  │   Schema    │   Engine    │ Pagination │   State   │
//! ├────────────┼─────────────┼─────────────┼────────────┼───────────┤
//! │ Listing    │ Type mapper │ Validation  │ next_page  │ Bookmarks │
//! │ TTL cache  │ Repl. key   │ Max-seen    │ Loop check │ JSON file │
//! │ Globs      │ Flattening  │ Worker pool │ Page clamp │ Memory    │
//! └────────────┴─────────────┴─────────────┴────────────┴───────────┘
//!                                │
//!               HTTP: retry, backoff, rate limit, auth
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Authentication implementations
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Entity discovery
pub mod discovery;

/// Canonical schemas and replication key detection
pub mod schema;

/// Cursor pagination
pub mod pagination;

/// Bookmarks and their persistence
pub mod state;

/// Per-entity sync and the batch runner
pub mod engine;

/// Run configuration
pub mod config;

/// Template interpolation
pub mod template;

/// Facade wiring the components together
pub mod tap;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::TapConfig;
pub use engine::{BatchReport, EntityOutcome, EntityStatus, Message, SyncEngine};
pub use error::{Error, Result};
pub use tap::{Catalog, CheckResult, Tap};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
