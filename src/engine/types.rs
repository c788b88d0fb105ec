//! Engine types
//!
//! Jobs, per-entity run state, outcomes and the messages emitted during a
//! batch.

use crate::discovery::EntityRef;
use crate::error::Error;
use crate::pagination::{PaginationState, DEFAULT_MAX_PAGE_SIZE};
use crate::schema::{Schema, DEFAULT_SEPARATOR};
use crate::state::{Bookmark, BookmarkValue};
use crate::types::{Record, SyncMode};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for sync operations
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Subtracted from timestamp bookmarks to re-read late writes
    pub overlap_window: Duration,
    /// Requested page size when a job sets none
    pub page_size: u32,
    /// Entities processed at once by `run_batch`
    pub concurrency: usize,
    /// Lift nested record objects into `parent<sep>child` keys
    pub flatten: bool,
    /// Separator for flattened keys
    pub flatten_separator: String,
    /// Operator suffix for the incremental lower bound filter
    pub filter_operator: String,
    /// Ordering used when a job sets none
    pub ordering: Option<String>,
    /// Order by the replication key when no ordering is configured
    pub order_by_replication_key: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            overlap_window: Duration::from_secs(600),
            page_size: DEFAULT_MAX_PAGE_SIZE,
            concurrency: 1,
            flatten: false,
            flatten_separator: DEFAULT_SEPARATOR.to_string(),
            filter_operator: "gte".to_string(),
            ordering: None,
            order_by_replication_key: true,
        }
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// One entity to sync
#[derive(Debug, Clone)]
pub struct EntityJob {
    /// Where the entity lives
    pub entity: EntityRef,
    /// Its canonical schema
    pub schema: Schema,
    /// Replication mode
    pub mode: SyncMode,
    /// Requested page size; falls back to the engine default
    pub page_size: Option<u32>,
    /// Static filters added to the first page
    pub filters: BTreeMap<String, String>,
    /// Ordering for the first page
    pub ordering: Option<String>,
}

impl EntityJob {
    /// Create a job
    pub fn new(entity: EntityRef, schema: Schema, mode: SyncMode) -> Self {
        Self {
            entity,
            schema,
            mode,
            page_size: None,
            filters: BTreeMap::new(),
            ordering: None,
        }
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set static filters
    #[must_use]
    pub fn with_filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters = filters;
        self
    }

    /// Set the ordering
    #[must_use]
    pub fn with_ordering(mut self, ordering: Option<String>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Entity name
    pub fn name(&self) -> &str {
        &self.entity.name
    }
}

// ============================================================================
// Per-entity run state
// ============================================================================

/// Lifecycle of one entity within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityPhase {
    #[default]
    Validating,
    Rejected,
    Extracting,
    Committed,
    Aborted,
}

/// Running maximum of the replication key
#[derive(Debug, Clone)]
pub struct ReplicationTracker {
    key: String,
    max: Option<BookmarkValue>,
    skipped: u64,
}

impl ReplicationTracker {
    /// Track the given field
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            max: None,
            skipped: 0,
        }
    }

    /// Field being tracked
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Highest value seen so far
    pub fn max(&self) -> Option<&BookmarkValue> {
        self.max.as_ref()
    }

    /// Values skipped because they could not be compared
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Fold one record into the maximum; null or missing values are ignored
    pub fn observe(&mut self, record: &Record) {
        let Some(value) = record.get(&self.key).and_then(BookmarkValue::from_json) else {
            return;
        };
        self.offer(value);
    }

    /// Fold one value into the maximum
    ///
    /// When kinds cannot be compared the higher ranked kind wins, so a stray
    /// string never hides the timestamps that follow it.
    pub fn offer(&mut self, value: BookmarkValue) {
        let Some(current) = &self.max else {
            self.max = Some(value);
            return;
        };
        match value.compare(current) {
            Some(Ordering::Greater) => self.max = Some(value),
            Some(_) => {}
            None => {
                let (kept, dropped) = if value.rank() > current.rank() {
                    (value.kind(), current.kind())
                } else {
                    (current.kind(), value.kind())
                };
                if self.skipped == 0 {
                    warn!(
                        "Replication key '{}' mixes {kept} and {dropped} values; ignoring the {dropped}",
                        self.key
                    );
                }
                self.skipped += 1;
                if value.rank() > current.rank() {
                    self.max = Some(value);
                }
            }
        }
    }
}

/// Ephemeral state of one entity's sync
#[derive(Debug, Clone)]
pub struct SyncRun {
    /// Entity name
    pub entity: String,
    /// Replication mode
    pub mode: SyncMode,
    /// Current phase
    pub phase: EntityPhase,
    /// Pages, records, retries and visited cursors
    pub pagination: PaginationState,
    /// Replication key tracking (incremental only)
    pub tracker: Option<ReplicationTracker>,
}

impl SyncRun {
    /// Start a run
    pub fn new(entity: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            entity: entity.into(),
            mode,
            phase: EntityPhase::Validating,
            pagination: PaginationState::new(),
            tracker: None,
        }
    }

    /// Records emitted so far
    pub fn records(&self) -> u64 {
        self.pagination.records
    }
}

/// Result of a collecting sync
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Records in server order
    pub records: Vec<Record>,
    /// Bookmark the run would commit
    pub bookmark: Option<Bookmark>,
    /// Final run state
    pub run: SyncRun,
}

// ============================================================================
// Outcomes
// ============================================================================

/// How one entity of a batch ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityStatus {
    /// Incremental run finished and its bookmark was saved
    Committed { bookmark: Bookmark },
    /// Run finished with nothing to commit
    Completed,
    /// Entity cannot run in the requested mode
    Rejected { reason: String },
    /// Run aborted by an error
    Failed { kind: String, reason: String },
    /// Run stopped by cancellation
    Cancelled,
}

impl EntityStatus {
    /// Build a failure status from an error
    pub fn failed(error: &Error) -> Self {
        Self::Failed {
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }

    /// Whether the entity finished without error
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Committed { .. } | Self::Completed)
    }
}

/// Per-entity line of a batch report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityOutcome {
    /// Entity name
    pub entity: String,
    /// Replication mode
    pub mode: SyncMode,
    /// Final status
    #[serde(flatten)]
    pub status: EntityStatus,
    /// Records emitted
    pub records: u64,
    /// Pages fetched
    pub pages: u32,
    /// HTTP retries spent
    pub retries: u32,
}

impl EntityOutcome {
    /// Outcome for an entity that never started
    pub fn not_started(job: &EntityJob, status: EntityStatus) -> Self {
        Self {
            entity: job.name().to_string(),
            mode: job.mode,
            status,
            records: 0,
            pages: 0,
            retries: 0,
        }
    }

    /// Outcome from a run's counters
    pub fn from_run(run: &SyncRun, status: EntityStatus) -> Self {
        Self {
            entity: run.entity.clone(),
            mode: run.mode,
            status,
            records: run.pagination.records,
            pages: run.pagination.pages,
            retries: run.pagination.retries,
        }
    }
}

/// Result of `run_batch`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// One outcome per job, in job order
    pub outcomes: Vec<EntityOutcome>,
    /// Set when a run-scoped error stopped the batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl BatchReport {
    /// Outcome of one entity
    pub fn outcome(&self, entity: &str) -> Option<&EntityOutcome> {
        self.outcomes.iter().find(|o| o.entity == entity)
    }

    /// Whether every entity succeeded
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Number of failed, rejected or cancelled entities
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !o.status.is_success())
            .count()
    }
}

// ============================================================================
// Messages
// ============================================================================

/// A message emitted during a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// One page of records
    Records {
        /// Entity name
        entity: String,
        /// Records in server order
        records: Vec<Record>,
    },
    /// A bookmark was committed
    Bookmark {
        /// The committed bookmark
        bookmark: Bookmark,
    },
    /// An entity finished
    Outcome(EntityOutcome),
}

impl Message {
    /// Create a records message
    pub fn records(entity: impl Into<String>, records: Vec<Record>) -> Self {
        Self::Records {
            entity: entity.into(),
            records,
        }
    }
}
