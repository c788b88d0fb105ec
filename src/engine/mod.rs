//! Execution engine module
//!
//! Per-entity read loop, bookmark computation and the batch runner.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - validates, extracts and commits one entity at a time, or
//!   a batch of entities through a bounded worker pool
//! - `SyncConfig` - overlap window, page size, concurrency and flattening
//! - `BatchReport` / `EntityOutcome` - what happened to each entity
//! - `Message` - records, bookmarks and outcomes streamed to the caller
//!
//! A bookmark is saved only after the entity's last page arrived. Failures
//! and cancellation leave the previously committed bookmark untouched.

mod types;

pub use types::{
    BatchReport, EntityJob, EntityOutcome, EntityPhase, EntityStatus, Message,
    ReplicationTracker, SyncConfig, SyncResult, SyncRun,
};

use crate::error::{Error, ErrorScope, Result};
use crate::http::HttpClient;
use crate::pagination::{PageRequest, Paginator, PaginatorConfig};
use crate::schema::flatten_record;
use crate::state::{Bookmark, BookmarkStore};
use crate::types::{Record, SyncMode};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Channel the batch runner streams messages into
///
/// The channel is bounded; a slow consumer holds back the next page fetch.
pub type MessageSender = mpsc::Sender<Message>;

/// Receives an entity's records one page at a time
#[async_trait]
pub trait PageSink: Send {
    /// Take one page; may wait until the consumer catches up
    async fn accept(&mut self, entity: &str, records: Vec<Record>);
}

#[async_trait]
impl PageSink for Vec<Record> {
    async fn accept(&mut self, _entity: &str, records: Vec<Record>) {
        self.extend(records);
    }
}

#[async_trait]
impl PageSink for MessageSender {
    async fn accept(&mut self, entity: &str, records: Vec<Record>) {
        // A closed receiver only means nobody is listening
        let _ = self.send(Message::records(entity, records)).await;
    }
}

/// Sync engine for orchestrating data extraction
pub struct SyncEngine {
    /// HTTP client shared by every entity
    client: Arc<HttpClient>,
    /// Bookmark persistence
    store: Arc<dyn BookmarkStore>,
    /// Paginator settings
    paginator_config: PaginatorConfig,
    /// Sync configuration
    config: SyncConfig,
    /// Keeps two runs of the same entity from overlapping
    entity_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        client: Arc<HttpClient>,
        store: Arc<dyn BookmarkStore>,
        paginator_config: PaginatorConfig,
    ) -> Self {
        Self {
            client,
            store,
            paginator_config,
            config: SyncConfig::default(),
            entity_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sync configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Bookmark store
    pub fn store(&self) -> &Arc<dyn BookmarkStore> {
        &self.store
    }

    // ========================================================================
    // Single entity
    // ========================================================================

    /// Extract an entity and collect its records
    ///
    /// `bookmark` is the prior bookmark; nothing is loaded or saved.
    pub async fn sync(
        &self,
        job: &EntityJob,
        bookmark: Option<&Bookmark>,
        cancel: &CancellationToken,
    ) -> Result<SyncResult> {
        let mut records = Vec::new();
        let mut run = SyncRun::new(job.name(), job.mode);
        let bookmark = self
            .extract(job, bookmark, &mut run, cancel, &mut records)
            .await?;

        Ok(SyncResult {
            records,
            bookmark,
            run,
        })
    }

    /// Extract an entity, handing each page to `sink` as it arrives
    ///
    /// Returns the bookmark the run would commit. Nothing is loaded or saved.
    pub async fn sync_with<S>(
        &self,
        job: &EntityJob,
        bookmark: Option<&Bookmark>,
        run: &mut SyncRun,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<Option<Bookmark>>
    where
        S: PageSink + ?Sized,
    {
        self.extract(job, bookmark, run, cancel, sink).await
    }

    /// Extract an entity with bookmark load and commit
    ///
    /// Incremental jobs load the stored bookmark first and save the new one
    /// after the last page. Full-table jobs never touch the store.
    pub async fn sync_entity(
        &self,
        job: &EntityJob,
        run: &mut SyncRun,
        cancel: &CancellationToken,
        sink: &MessageSender,
    ) -> Result<Option<Bookmark>> {
        let lock = self.entity_lock(job.name()).await;
        let _guard = lock.lock().await;

        let prior = match job.mode {
            SyncMode::Incremental if job.schema.replication_key.is_some() => {
                self.store.load(job.name()).await?
            }
            _ => None,
        };

        let mut pages = sink.clone();
        let bookmark = self
            .extract(job, prior.as_ref(), run, cancel, &mut pages)
            .await?;

        if let Some(bookmark) = &bookmark {
            if cancel.is_cancelled() {
                run.phase = EntityPhase::Aborted;
                return Err(Error::Cancelled);
            }
            self.store.save(job.name(), bookmark.clone()).await?;
            info!(
                "Committed bookmark for '{}': {} = {}",
                job.name(),
                bookmark.replication_key,
                bookmark.last_value
            );
            let _ = sink
                .send(Message::Bookmark {
                    bookmark: bookmark.clone(),
                })
                .await;
        }

        run.phase = EntityPhase::Committed;
        Ok(bookmark)
    }

    /// Validation, page loop and bookmark computation shared by every entry point
    async fn extract<S>(
        &self,
        job: &EntityJob,
        prior: Option<&Bookmark>,
        run: &mut SyncRun,
        cancel: &CancellationToken,
        sink: &mut S,
    ) -> Result<Option<Bookmark>>
    where
        S: PageSink + ?Sized,
    {
        run.phase = EntityPhase::Validating;
        let schema = &job.schema;

        let replication_key = match job.mode {
            SyncMode::Incremental => match &schema.replication_key {
                Some(key) => Some(key.clone()),
                None => {
                    run.phase = EntityPhase::Rejected;
                    return Err(Error::ReplicationKeyMissing {
                        entity: job.name().to_string(),
                    });
                }
            },
            SyncMode::FullTable => None,
        };

        // A bookmark for another field says nothing about this one
        let prior = match (prior, &replication_key) {
            (Some(b), Some(key)) if &b.replication_key == key => Some(b),
            (Some(b), Some(key)) => {
                warn!(
                    "Stored bookmark for '{}' tracks '{}' but the replication key is '{key}'; doing a full scan",
                    job.name(),
                    b.replication_key
                );
                None
            }
            _ => None,
        };

        let mut request = self.first_request(job, replication_key.as_deref(), prior);
        run.tracker = replication_key.as_deref().map(ReplicationTracker::new);

        if cancel.is_cancelled() {
            run.phase = EntityPhase::Aborted;
            return Err(Error::Cancelled);
        }

        run.phase = EntityPhase::Extracting;
        info!(
            "Starting {} sync of '{}'{}",
            job.mode,
            job.name(),
            prior.map_or(String::new(), |b| format!(" from {}", b.last_value))
        );

        let mut paginator = Paginator::new(
            Arc::clone(&self.client),
            self.paginator_config.clone(),
            job.name(),
            schema.max_page_size,
        );

        let outcome = loop {
            let page = match paginator.fetch_page(&request, cancel).await {
                Ok(page) => page,
                Err(e) => break Err(e),
            };

            let next = request.next(&page);
            let mut records = page.records;
            if self.config.flatten {
                records = records
                    .into_iter()
                    .map(|r| flatten_record(r, &self.config.flatten_separator))
                    .collect();
            }
            if let Some(tracker) = run.tracker.as_mut() {
                records.iter().for_each(|r| tracker.observe(r));
            }

            debug!("'{}': page with {} records", job.name(), records.len());
            if !records.is_empty() {
                tokio::select! {
                    () = sink.accept(job.name(), records) => {}
                    () = cancel.cancelled() => break Err(Error::Cancelled),
                }
            }

            match next {
                Some(next) => request = next,
                None => break Ok(()),
            }
        };

        run.pagination = paginator.into_state();
        if let Err(e) = outcome {
            run.phase = EntityPhase::Aborted;
            return Err(e);
        }

        info!(
            "Finished '{}': {} records in {} pages ({} retries)",
            job.name(),
            run.pagination.records,
            run.pagination.pages,
            run.pagination.retries
        );

        Ok(run
            .tracker
            .as_ref()
            .and_then(|tracker| next_bookmark(job.name(), tracker, prior)))
    }

    /// First page request with ordering, static filters and the lower bound
    fn first_request(
        &self,
        job: &EntityJob,
        replication_key: Option<&str>,
        prior: Option<&Bookmark>,
    ) -> PageRequest {
        let ordering = job.ordering.clone().or_else(|| self.config.ordering.clone()).or_else(|| {
            if self.config.order_by_replication_key {
                job.schema.replication_key.clone()
            } else {
                None
            }
        });

        let mut request = PageRequest::first(
            job.name(),
            &job.entity.list_path,
            job.page_size.unwrap_or(self.config.page_size),
        )
        .with_ordering(ordering);
        request.filters.clone_from(&job.filters);

        if let (Some(key), Some(prior)) = (replication_key, prior) {
            let lower = prior.last_value.minus(self.config.overlap_window);
            request = request.with_filter(
                format!("{key}__{}", self.config.filter_operator),
                lower.to_query_value(),
            );
        }

        request
    }

    async fn entity_lock(&self, entity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.entity_locks.lock().await;
        Arc::clone(locks.entry(entity.to_string()).or_default())
    }

    // ========================================================================
    // Batch
    // ========================================================================

    /// Sync many entities with bounded concurrency
    ///
    /// Entity-scoped failures only fail their entity. A run-scoped failure
    /// (auth, discovery, config) cancels the rest of the batch and is
    /// reported in [`BatchReport::aborted`].
    pub async fn run_batch(
        &self,
        jobs: Vec<EntityJob>,
        cancel: &CancellationToken,
        sink: &MessageSender,
    ) -> BatchReport {
        let batch_cancel = cancel.child_token();
        let aborted: std::sync::Mutex<Option<String>> = std::sync::Mutex::new(None);
        let concurrency = self.config.concurrency.max(1);

        info!(
            "Starting batch of {} entities (concurrency {concurrency})",
            jobs.len()
        );

        let mut outcomes: Vec<(usize, EntityOutcome)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| {
                let batch_cancel = &batch_cancel;
                let aborted = &aborted;
                async move {
                    let outcome = self.run_job(&job, batch_cancel, sink, aborted).await;
                    let _ = sink.send(Message::Outcome(outcome.clone())).await;
                    (index, outcome)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        outcomes.sort_by_key(|(index, _)| *index);
        let report = BatchReport {
            outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
            aborted: aborted.into_inner().unwrap_or_else(|e| e.into_inner()),
        };

        info!(
            "Batch finished: {} entities, {} not successful",
            report.outcomes.len(),
            report.failures()
        );
        report
    }

    async fn run_job(
        &self,
        job: &EntityJob,
        cancel: &CancellationToken,
        sink: &MessageSender,
        aborted: &std::sync::Mutex<Option<String>>,
    ) -> EntityOutcome {
        if cancel.is_cancelled() {
            return EntityOutcome::not_started(job, EntityStatus::Cancelled);
        }

        let mut run = SyncRun::new(job.name(), job.mode);
        let status = match self.sync_entity(job, &mut run, cancel, sink).await {
            Ok(Some(bookmark)) => EntityStatus::Committed { bookmark },
            Ok(None) => EntityStatus::Completed,
            Err(e @ Error::ReplicationKeyMissing { .. }) => {
                warn!("Skipping '{}': {e}", job.name());
                EntityStatus::Rejected {
                    reason: e.to_string(),
                }
            }
            Err(Error::Cancelled) => EntityStatus::Cancelled,
            Err(e) => {
                warn!("Entity '{}' failed: {e}", job.name());
                if e.scope() == ErrorScope::Run {
                    let mut slot = aborted.lock().unwrap_or_else(|p| p.into_inner());
                    if slot.is_none() {
                        *slot = Some(e.to_string());
                    }
                    cancel.cancel();
                }
                EntityStatus::failed(&e)
            }
        };

        EntityOutcome::from_run(&run, status)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Bookmark to commit after a complete run
///
/// The new value never goes below the prior one; if the run saw no values
/// the prior bookmark is carried forward.
fn next_bookmark(
    entity: &str,
    tracker: &ReplicationTracker,
    prior: Option<&Bookmark>,
) -> Option<Bookmark> {
    let prior_value = prior.map(|b| &b.last_value);
    let value = match (tracker.max(), prior_value) {
        (Some(seen), Some(prior)) => match seen.compare(prior) {
            Some(Ordering::Less) => prior.clone(),
            Some(_) => seen.clone(),
            None => {
                warn!(
                    "'{entity}': {} value {seen} cannot replace the {} bookmark {prior}; keeping it",
                    seen.kind(),
                    prior.kind()
                );
                prior.clone()
            }
        },
        (Some(seen), None) => seen.clone(),
        (None, Some(prior)) => prior.clone(),
        (None, None) => return None,
    };
    Some(Bookmark::new(entity, tracker.key(), value))
}
