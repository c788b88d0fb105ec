//! The tap facade
//!
//! [`Tap`] wires the configured HTTP client, discoverer, schema generator,
//! bookmark store and sync engine together for one process run. The CLI is a
//! thin layer over it.

use crate::auth::Authenticator;
use crate::config::TapConfig;
use crate::discovery::{EntityDiscoverer, EntityRef};
use crate::engine::{
    BatchReport, EntityJob, EntityOutcome, EntityStatus, Message, MessageSender, SyncEngine,
};
use crate::error::{ErrorScope, Result};
use crate::http::{HttpClient, HttpClientConfig, ReqwestTransport, Transport};
use crate::schema::{Schema, SchemaGenerator};
use crate::state::{BookmarkStore, FileBookmarkStore, MemoryBookmarkStore};
use crate::types::SyncMode;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ============================================================================
// Results
// ============================================================================

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// Whether the API could be reached and listed
    pub success: bool,

    /// Entities visible to the configured credentials
    pub entities: usize,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One entity of a catalog
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    /// Entity name
    pub entity: String,
    /// Path records are listed from
    pub list_path: String,
    /// Replication mode the entity would run in
    pub mode: SyncMode,
    /// Detected or configured replication key
    pub replication_key: Option<String>,
    /// Server-advertised page size cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_page_size: Option<u32>,
    /// JSON-Schema document of the records
    pub schema: serde_json::Value,
}

/// Entities with their schemas
#[derive(Debug, Clone, Default, Serialize)]
pub struct Catalog {
    /// Catalog entries in discovery order
    pub entries: Vec<CatalogEntry>,
}

// ============================================================================
// Tap
// ============================================================================

/// Everything a run needs, built from a [`TapConfig`]
pub struct Tap {
    config: TapConfig,
    discoverer: EntityDiscoverer,
    generator: SchemaGenerator,
    engine: SyncEngine,
}

impl Tap {
    /// Build a tap, opening the configured bookmark file if any
    pub async fn new(config: TapConfig) -> Result<Self> {
        let store: Arc<dyn BookmarkStore> = match &config.state_path {
            Some(path) => Arc::new(FileBookmarkStore::open(path).await?),
            None => Arc::new(MemoryBookmarkStore::new()),
        };
        Self::with_store(config, store)
    }

    /// Build a tap over an existing bookmark store
    pub fn with_store(config: TapConfig, store: Arc<dyn BookmarkStore>) -> Result<Self> {
        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new(&config.transport_config())?);
        Self::with_transport(config, store, transport)
    }

    /// Build a tap over an existing store and transport
    pub fn with_transport(
        config: TapConfig,
        store: Arc<dyn BookmarkStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let http_config: HttpClientConfig = config.http_client_config();
        let auth = Authenticator::new(config.auth.clone());
        let client = Arc::new(HttpClient::with_parts(http_config, transport, Arc::new(auth))?);

        Ok(Self {
            discoverer: EntityDiscoverer::new(Arc::clone(&client), config.discoverer_config()),
            generator: SchemaGenerator::new(Arc::clone(&client), config.generator_config()),
            engine: SyncEngine::new(client, store, config.paginator_config())
                .with_config(config.sync_config()),
            config,
        })
    }

    /// The configuration this tap runs with
    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    /// The sync engine
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// The entity discoverer
    pub fn discoverer(&self) -> &EntityDiscoverer {
        &self.discoverer
    }

    /// Verify the API can be reached and listed with the configured credentials
    pub async fn check(&self, cancel: &CancellationToken) -> CheckResult {
        self.discoverer.invalidate().await;
        match self.discoverer.discover_all(cancel).await {
            Ok(entities) => CheckResult {
                success: true,
                entities: entities.len(),
                message: None,
            },
            Err(e) => CheckResult {
                success: false,
                entities: 0,
                message: Some(e.to_string()),
            },
        }
    }

    /// Entities selected by the include/exclude patterns
    pub async fn entities(&self, cancel: &CancellationToken) -> Result<Vec<EntityRef>> {
        self.discoverer
            .discover(
                &self.config.discovery.include,
                &self.config.discovery.exclude,
                cancel,
            )
            .await
    }

    /// Discover entities and generate their schemas
    ///
    /// Entities whose schema cannot be generated are left out with a warning.
    pub async fn discover(&self, cancel: &CancellationToken) -> Result<Catalog> {
        let mut catalog = Catalog::default();
        for (entity, schema) in self.schemas(cancel).await? {
            match schema {
                Ok(schema) => catalog.entries.push(CatalogEntry {
                    mode: self.config.mode_for(&entity.name),
                    replication_key: schema.replication_key.clone(),
                    max_page_size: schema.max_page_size,
                    schema: schema.to_json_schema().to_json(),
                    list_path: entity.list_path,
                    entity: entity.name,
                }),
                Err(e) => warn!("Leaving '{}' out of the catalog: {e}", entity.name),
            }
        }
        Ok(catalog)
    }

    /// Sync every selected entity, streaming messages into `sink`
    ///
    /// Discovery failures are returned as errors; a failed schema only fails
    /// its entity.
    pub async fn read(&self, cancel: &CancellationToken, sink: &MessageSender) -> Result<BatchReport> {
        let schemas = self.schemas(cancel).await?;
        let order: Vec<String> = schemas.iter().map(|(e, _)| e.name.clone()).collect();

        let mut jobs = Vec::new();
        let mut unschematized = HashMap::new();
        for (entity, schema) in schemas {
            match schema {
                Ok(schema) => jobs.push(self.job(entity, schema)),
                Err(e) => {
                    let outcome = EntityOutcome {
                        entity: entity.name.clone(),
                        mode: self.config.mode_for(&entity.name),
                        status: EntityStatus::failed(&e),
                        records: 0,
                        pages: 0,
                        retries: 0,
                    };
                    let _ = sink.send(Message::Outcome(outcome.clone())).await;
                    unschematized.insert(entity.name, outcome);
                }
            }
        }

        let report = self.engine.run_batch(jobs, cancel, sink).await;

        let mut by_entity: HashMap<String, EntityOutcome> = report
            .outcomes
            .into_iter()
            .map(|o| (o.entity.clone(), o))
            .collect();
        by_entity.extend(unschematized);

        Ok(BatchReport {
            outcomes: order
                .iter()
                .filter_map(|name| by_entity.remove(name))
                .collect(),
            aborted: report.aborted,
        })
    }

    /// Run [`Tap::read`] in a task and expose its messages as a stream
    ///
    /// At most `sync.message_buffer` messages are queued; extraction waits
    /// for the stream to be polled. The stream ends once the batch has
    /// finished; the handle yields its report.
    pub fn read_stream(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> (
        impl Stream<Item = Message> + Send + 'static,
        JoinHandle<Result<BatchReport>>,
    ) {
        let (tx, rx) = mpsc::channel(self.config.sync.message_buffer);
        let tap = Arc::clone(self);
        let handle = tokio::spawn(async move { tap.read(&cancel, &tx).await });

        let messages = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        (messages, handle)
    }

    /// Selected entities paired with their schema results
    async fn schemas(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<(EntityRef, Result<Schema>)>> {
        let entities = self.entities(cancel).await?;
        info!("Generating schemas for {} entities", entities.len());

        let mut results: Vec<(EntityRef, Result<Schema>)> = stream::iter(entities)
            .map(|entity| async move {
                let schema = self.generator.generate(&entity, cancel).await;
                (entity, schema)
            })
            .buffered(self.config.sync.concurrency.max(1))
            .collect()
            .await;

        // Credentials or the listing going away affect every entity
        let run_failure = results
            .iter()
            .position(|(_, r)| r.as_ref().is_err_and(|e| e.scope() == ErrorScope::Run));
        if let Some(index) = run_failure {
            if let (_, Err(e)) = results.swap_remove(index) {
                return Err(e);
            }
        }
        Ok(results)
    }

    fn job(&self, entity: EntityRef, schema: Schema) -> EntityJob {
        let mode = self.config.mode_for(&entity.name);
        let overrides = self.config.entity(&entity.name).cloned().unwrap_or_default();
        EntityJob::new(entity, schema, mode)
            .with_page_size(overrides.page_size)
            .with_filters(overrides.filters)
            .with_ordering(overrides.ordering)
    }
}

impl std::fmt::Debug for Tap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tap")
            .field("base_url", &self.config.base_url)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
