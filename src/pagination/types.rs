//! Pagination types
//!
//! Request/response shapes for one entity's page sequence and the state the
//! paginator keeps across pages.

use crate::types::Record;
use std::collections::{BTreeMap, HashSet};

/// Default query parameter for the page size
pub const DEFAULT_PAGE_SIZE_PARAM: &str = "page_size";
/// Default query parameter for ordering
pub const DEFAULT_ORDERING_PARAM: &str = "ordering";
/// Default location of the record array
pub const DEFAULT_RECORDS_PATH: &str = "results";
/// Default location of the next-page link
pub const DEFAULT_NEXT_PAGE_PATH: &str = "next_page";
/// Page size cap when the remote advertises none
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1250;

/// One page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Entity being read
    pub entity: String,
    /// Path of the entity's list endpoint (first page only)
    pub list_path: String,
    /// Next-page URL returned by the previous page
    pub cursor: Option<String>,
    /// Filters as `field__op` → value (first page only)
    pub filters: BTreeMap<String, String>,
    /// Ordering expression (first page only)
    pub ordering: Option<String>,
    /// Requested page size
    pub page_size: u32,
}

impl PageRequest {
    /// Request for the first page of an entity
    pub fn first(entity: impl Into<String>, list_path: impl Into<String>, page_size: u32) -> Self {
        Self {
            entity: entity.into(),
            list_path: list_path.into(),
            cursor: None,
            filters: BTreeMap::new(),
            ordering: None,
            page_size,
        }
    }

    /// Add a filter
    #[must_use]
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Set the ordering
    #[must_use]
    pub fn with_ordering(mut self, ordering: Option<String>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Start from an explicit cursor instead of the list path
    #[must_use]
    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// The request that follows `response`, if any
    pub fn next(&self, response: &PageResponse) -> Option<PageRequest> {
        response.next_cursor.as_ref().map(|cursor| PageRequest {
            cursor: Some(cursor.clone()),
            ..self.clone()
        })
    }
}

/// One fetched page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResponse {
    /// Records in server order
    pub records: Vec<Record>,
    /// Link to the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

impl PageResponse {
    /// Whether this was the final page
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Where the paginator is in its page sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PagePhase {
    /// No page requested yet
    #[default]
    Ready,
    /// A request is in flight
    Fetching,
    /// The last page pointed at another one
    More,
    /// The last page had no successor
    Done,
    /// A page could not be fetched
    Failed,
}

/// Counters and visited cursors for one entity's page sequence
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    visited: HashSet<String>,
    cursors: Vec<String>,
    /// Pages fetched successfully
    pub pages: u32,
    /// Records received
    pub records: u64,
    /// HTTP retries spent
    pub retries: u32,
    /// Current phase
    pub phase: PagePhase,
}

impl PaginationState {
    /// Create a fresh state
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a cursor; returns false if it was already visited
    pub fn visit(&mut self, cursor: &str) -> bool {
        if self.visited.contains(cursor) {
            return false;
        }
        self.visited.insert(cursor.to_string());
        self.cursors.push(cursor.to_string());
        true
    }

    /// Whether a cursor was already visited
    pub fn has_visited(&self, cursor: &str) -> bool {
        self.visited.contains(cursor)
    }

    /// Visited cursors in the order they were seen
    pub fn visited_cursors(&self) -> &[String] {
        &self.cursors
    }

    /// Whether the sequence reached its last page
    pub fn is_done(&self) -> bool {
        self.phase == PagePhase::Done
    }
}

/// Settings for [`super::Paginator`]
#[derive(Debug, Clone)]
pub struct PaginatorConfig {
    /// Query parameter carrying the page size
    pub page_size_param: String,
    /// Query parameter carrying the ordering
    pub ordering_param: String,
    /// Dotted path to the record array
    pub records_path: String,
    /// Dotted path to the next-page link
    pub next_page_path: String,
    /// Cap used when the schema advertises none
    pub max_page_size: u32,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            page_size_param: DEFAULT_PAGE_SIZE_PARAM.to_string(),
            ordering_param: DEFAULT_ORDERING_PARAM.to_string(),
            records_path: DEFAULT_RECORDS_PATH.to_string(),
            next_page_path: DEFAULT_NEXT_PAGE_PATH.to_string(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}
