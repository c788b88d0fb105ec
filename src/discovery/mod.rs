//! Entity discovery module
//!
//! Lists the entities a remote API exposes and works out where their records
//! and field metadata live.
//!
//! # Features
//!
//! - **Listing formats**: bare arrays or `results`/`entities`/`data` wrappers
//! - **Glob filters**: include/exclude patterns, exclude wins
//! - **TTL cache**: repeated discovery within the TTL makes no request

mod cache;
mod discoverer;
mod glob;
mod types;

pub use cache::DiscoveryCache;
pub use discoverer::EntityDiscoverer;
pub use glob::{glob_to_regex, NameFilter};
pub use types::{DiscovererConfig, EntityRef};
