//! # vectorstore
//!
//! A persistent, in-process vector store: similarity/distance search over
//! dense float vectors, a document-style metadata filter language, a
//! resource governor with automatic eviction, and crash-safe JSON
//! persistence of the primary table.
//!
//! ```ignore
//! use vectorstore::{VectorStore, VectorStoreConfig, SearchOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = VectorStore::new(VectorStoreConfig::new(3));
//!     store.initialize().await?;
//!     let id = store.store(vec![1.0, 0.0, 0.0], None).await?;
//!     let hits = store.search(vec![1.0, 0.0, 0.0], SearchOptions { k: 1, ..Default::default() }).await?;
//!     assert_eq!(hits[0].id, id);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The store is a thin façade (this module, `VectorStore`) over a set of
//! single-purpose subsystems, each owning one slice of the data model
//! described in its own module: the [`kernel`] (similarity metrics), the
//! [`filter`] tree and its result cache/usage stats, the
//! [`memory_accountant`], the [`pruning`] engine, the [`constraint`] gate,
//! the [`record_store`] (primary map, access-time table, workspace
//! counts), the [`persistence`] layer, the [`search`] pipeline, the
//! optional [`accelerator`], and [`metrics`]. All mutable state lives
//! behind a single `tokio::sync::Mutex`, matching the single-threaded
//! cooperative execution model described in the crate's design notes: no
//! two mutations interleave, and the lock is never held across an
//! `.await` on an injected collaborator.
pub mod accelerator;
pub mod capability;
pub mod config;
pub mod constraint;
pub mod error;
pub mod filter;
pub mod kernel;
pub mod memory_accountant;
pub mod metrics;
pub mod persistence;
pub mod pruning;
pub mod record;
pub mod record_store;
pub mod search;

/// Initialize `tracing` output for hosts that want the crate's internal
/// `tracing::warn!` calls (accelerator/pruning failures, persistence
/// fallback) surfaced without wiring up their own subscriber. The log
/// level is controlled by the `VECTORSTORE_LOG` environment variable
/// (`error`/`warn`/`info`/`debug`/`trace`; default `info`).
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("VECTORSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}

pub use accelerator::{AcceleratorDocument, AcceleratorHit, AcceleratorSearchOptions, ScalableIndex};
pub use capability::{CrossEncoder, EmbeddingModelInfo, EmbeddingProvider, RerankCandidate, RerankScore};
pub use config::{
    MemoryConstraintMode, MemoryMode, MemoryPressureThresholds, PruningConfig, VectorStoreConfig,
    WorkspaceOverride,
};
pub use error::{BatchItemError, VectorStoreError, VectorStoreResult};
pub use filter::{FilterCacheStats, FilterStatsSummary};
pub use kernel::SimilarityMetric;
pub use memory_accountant::{PressureCallback, PressureLevel};
pub use metrics::{Anomaly, HealthReport, HealthStatus, LatencySummary, OperationKind};
pub use pruning::{CustomPruningStrategy, PruneReason, PruningHistoryEntry, PruningStats, PruningStrategyKind};
pub use record::{Metadata, MetadataValue, Record, Scalar};
pub use search::{SearchHit, SearchOptions};

use accelerator::AcceleratorShim;
use constraint::{ConstraintContext, ConstraintOutcome, PruneDirective, PruneScope};
use filter::{Filter, FilterResultCache, FilterStatsTable};
use kernel::validate_vector;
use memory_accountant::MemoryAccountant;
use metrics::MetricsRegistry;
use pruning::PruningEngine;
use record::{generate_id, Record as Rec};
use record_store::RecordStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const DEFAULT_PRUNING_HISTORY_CAP: usize = 1000;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// The outright failure a prune directive becomes once it has made no
/// progress on retry: the triggering operation retries once before
/// failing.
fn stalled_prune_error(directive: &PruneDirective) -> VectorStoreError {
    match directive.scope {
        PruneScope::Workspace(ref workspace_id) => VectorStoreError::CapacityExceeded {
            reason: format!(
                "auto-pruning found no eligible victims in workspace '{workspace_id}' (all pinned?)"
            ),
        },
        PruneScope::Global => match directive.reason {
            PruneReason::MemoryPressure | PruneReason::MemoryExceeded => VectorStoreError::MemoryExceeded {
                reason: "auto-pruning found no eligible victims to free memory (all pinned?)".to_string(),
            },
            _ => VectorStoreError::CapacityExceeded {
                reason: "auto-pruning found no eligible victims to free capacity (all pinned?)".to_string(),
            },
        },
    }
}

/// The store's lifecycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreState {
    Created,
    Initialized,
    Closed,
}

/// The outcome of a `storeBatch`/`upsertBatch` call: successfully stored
/// ids alongside any per-index failures.
#[derive(Debug, Clone, Default)]
pub struct BatchStoreOutcome {
    pub stored: Vec<String>,
    pub errors: Vec<BatchItemError>,
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintReport {
    pub within_global_capacity: bool,
    pub within_memory_cap: bool,
    pub workspace_violations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryUsageReport {
    pub total_bytes: u64,
    pub cap_bytes: f64,
    pub usage_ratio: f64,
    pub record_count: usize,
}

#[derive(Debug, Clone)]
pub struct WorkspaceStat {
    pub workspace_id: String,
    pub count: usize,
    pub limit: usize,
}

/// All mutable state, guarded by a single mutex.
struct Inner {
    state: StoreState,
    config: VectorStoreConfig,
    store: RecordStore,
    accountant: MemoryAccountant,
    filter_cache: FilterResultCache,
    filter_stats: FilterStatsTable,
    pruning: PruningEngine,
    metrics: MetricsRegistry,
    precomputed_queries: HashMap<String, Vec<f64>>,
    persistence_enabled: bool,
    /// Efficient-memory mode: the resident map is kept empty between
    /// calls and rehydrated from disk on demand (see `VectorStore::
    /// ensure_hydrated`/`dehydrate_if_efficient`). Only ever true when a
    /// path is configured; `MemoryMode::Efficient` without a path, or
    /// after a fallback-to-memory downgrade, behaves like `Normal`.
    efficient_memory: bool,
}

impl Inner {
    fn new(config: VectorStoreConfig) -> Self {
        let accountant = MemoryAccountant::new(
            config.max_memory_mb,
            config.memory_pressure_thresholds.warning,
            config.memory_pressure_thresholds.critical,
        );
        Self {
            state: StoreState::Created,
            filter_cache: FilterResultCache::new(config.filter_cache_size),
            store: RecordStore::new(),
            accountant,
            filter_stats: FilterStatsTable::new(),
            pruning: PruningEngine::new(DEFAULT_PRUNING_HISTORY_CAP),
            metrics: MetricsRegistry::default(),
            precomputed_queries: HashMap::new(),
            persistence_enabled: config.path.is_some(),
            efficient_memory: false,
            config,
        }
    }

    fn require_initialized(&self) -> VectorStoreResult<()> {
        match self.state {
            StoreState::Created => Err(VectorStoreError::NotInitialized),
            StoreState::Closed => Err(VectorStoreError::AlreadyClosed),
            StoreState::Initialized => Ok(()),
        }
    }

    /// Run the victim-selection half of one Constraint Gate prune
    /// directive synchronously, applying it to the store and pruning
    /// bookkeeping. Returns the removed ids so the caller can mirror the
    /// removal into the Accelerator outside the lock.
    fn execute_prune(
        &mut self,
        directive: &PruneDirective,
        custom: Option<&CustomPruningStrategy>,
        now: i64,
    ) -> Vec<String> {
        let strategy = match &directive.scope {
            PruneScope::Workspace(w) => self.config.effective_pruning_strategy_for_workspace(w),
            PruneScope::Global => self.config.pruning_strategy,
        };
        let candidates: Vec<&Rec> = match &directive.scope {
            PruneScope::Global => self.store.iter().collect(),
            PruneScope::Workspace(w) => self.store.records_in_workspace(w),
        };
        let req = pruning::PruningRequest {
            strategy,
            count: directive.count,
            priority_field: &self.config.priority_field,
            respect_pinned: self.config.pruning_config.respect_pinned,
            access_times: self.store.access_times(),
            custom,
        };
        let started = std::time::Instant::now();
        let victims = pruning::select_victims(&candidates, &req);

        for id in &victims {
            self.store.remove(id);
        }
        self.accountant.refresh(self.store.iter());
        self.filter_cache.clear();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.pruning.record_event(now, victims.len(), strategy, directive.reason, duration_ms);
        tracing::debug!(
            count = victims.len(),
            reason = ?directive.reason,
            strategy = ?strategy,
            "pruned records"
        );
        victims
    }

    /// The victim-selection half of `execute_prune` without the mutation:
    /// compute and return what a pruning pass would evict right now,
    /// under the global strategy, leaving the store untouched.
    fn preview_prune(&self, custom: Option<&CustomPruningStrategy>, count: usize) -> Vec<String> {
        let candidates: Vec<&Rec> = self.store.iter().collect();
        let req = pruning::PruningRequest {
            strategy: self.config.pruning_strategy,
            count,
            priority_field: &self.config.priority_field,
            respect_pinned: self.config.pruning_config.respect_pinned,
            access_times: self.store.access_times(),
            custom,
        };
        pruning::select_victims(&candidates, &req)
    }

    fn constraint_context<'a>(&'a self, workspace_id: &'a str, incoming_bytes: u64) -> ConstraintContext<'a> {
        ConstraintContext {
            config: &self.config,
            workspace_id,
            total_size: self.store.len(),
            workspace_size: self.store.workspace_count(workspace_id),
            incoming_bytes,
            current_memory_bytes: self.accountant.total_bytes(),
            memory_cap_bytes: self.accountant.cap_bytes(),
        }
    }
}

/// The store façade: a cheap-to-clone handle (internally `Arc`-backed
/// state) exposing the full public API over one logical executor.
pub struct VectorStore {
    inner: Mutex<Inner>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    accelerator: AcceleratorShim,
    custom_pruning: Option<CustomPruningStrategy>,
}

impl VectorStore {
    pub fn new(config: VectorStoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new(config)),
            embedding_provider: None,
            cross_encoder: None,
            accelerator: AcceleratorShim::new(None),
            custom_pruning: None,
        }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    pub fn with_cross_encoder(mut self, encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(encoder);
        self
    }

    pub fn with_accelerator(mut self, index: Arc<dyn ScalableIndex>) -> Self {
        self.accelerator = AcceleratorShim::new(Some(index));
        self
    }

    /// Register the victim-selection function used when `pruningStrategy
    /// = custom`.
    pub fn with_custom_pruning_strategy(mut self, strategy: CustomPruningStrategy) -> Self {
        self.custom_pruning = Some(strategy);
        self
    }

    // ---- Lifecycle -----------------------------------------------------

    /// Validate configuration, load any existing snapshot (or validate it
    /// without loading, under efficient-memory mode), and transition to
    /// `Initialized`. Idempotent if already initialized.
    pub async fn initialize(&self) -> VectorStoreResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            StoreState::Initialized => return Ok(()),
            StoreState::Closed => return Err(VectorStoreError::AlreadyClosed),
            StoreState::Created => {}
        }

        inner.config.validate()?;

        let efficient = matches!(inner.config.memory_mode, MemoryMode::Efficient);
        if let Some(path) = inner.config.path.clone() {
            let load_result = if efficient {
                persistence::validate_snapshot(&path).await.map(|_| HashMap::new())
            } else {
                persistence::load_snapshot(&path).await
            };
            match load_result {
                Ok(records) => {
                    let now = now_ms();
                    inner.store.replace_all(records, now);
                    inner.persistence_enabled = true;
                    inner.efficient_memory = efficient;
                }
                Err(e) => {
                    if inner.config.fallback_to_memory {
                        tracing::warn!(error = %e, "persistence unavailable at initialize; falling back to in-memory mode");
                        inner.persistence_enabled = false;
                        inner.efficient_memory = false;
                    } else {
                        return Err(e);
                    }
                }
            }
        } else {
            inner.persistence_enabled = false;
            inner.efficient_memory = false;
        }

        inner.accountant.refresh(inner.store.iter());
        inner.state = StoreState::Initialized;
        Ok(())
    }

    /// Write a final snapshot (if persistence is enabled) and transition
    /// to `Closed`. Further API calls fail `AlreadyClosed`.
    pub async fn close(&self) -> VectorStoreResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == StoreState::Closed {
            return Err(VectorStoreError::AlreadyClosed);
        }
        if inner.persistence_enabled {
            if let Some(path) = inner.config.path.clone() {
                let snapshot = inner.store.snapshot();
                persistence::write_snapshot(&path, &snapshot).await?;
            }
        }
        inner.state = StoreState::Closed;
        Ok(())
    }

    // ---- Single-record operations ---------------------------------------

    /// Insert a new vector, running it through the Constraint Gate
    /// (pruning as directed) before committing.
    pub async fn store(&self, vector: Vec<f64>, metadata: Option<Metadata>) -> VectorStoreResult<String> {
        let metadata = metadata.unwrap_or_default();
        let now = now_ms();
        let candidate = Rec::new(String::new(), vector, metadata);
        validate_vector(&candidate.vector, {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            inner.config.dimension
        })?;

        self.ensure_hydrated().await?;
        self.admit(&candidate, now).await?;

        let id = generate_id(now);
        let record = Rec::new(id.clone(), candidate.vector, candidate.metadata);

        let mut inner = self.inner.lock().await;
        inner.store.insert(record.clone(), now);
        inner.accountant.refresh(inner.store.iter());
        inner.filter_cache.clear();
        let persist = inner.persistence_enabled.then(|| inner.config.path.clone()).flatten();
        let snapshot = persist.as_ref().map(|_| inner.store.snapshot());
        let efficient = inner.efficient_memory;
        drop(inner);

        self.accelerator.on_insert(&record).await;
        if let (Some(path), Some(snapshot)) = (persist, snapshot) {
            persistence::write_snapshot(&path, &snapshot).await?;
        }
        // Efficient-memory mode: the chunk just persisted (this single
        // record) is dropped from the resident map again rather than
        // staying memory-resident.
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(id)
    }

    /// Run one record's projected footprint through the Constraint Gate,
    /// executing any directed prunes (with the lock released around the
    /// Accelerator mirror call) until the gate proceeds or rejects.
    ///
    /// A directive that selects zero victims (every candidate pinned, or
    /// a `custom` strategy that declines to act) makes no progress, so
    /// re-planning would see the same numbers and prune again forever.
    /// Spec.md §7 documents the policy for this case as "the triggering
    /// operation retries once before failing": we give the directive one
    /// extra attempt, then convert it to the matching outright failure.
    async fn admit(&self, candidate: &Rec, now: i64) -> VectorStoreResult<()> {
        let mut stalled_once = false;
        loop {
            let outcome = {
                let mut inner = self.inner.lock().await;
                let workspace_id = candidate.workspace_id().to_string();
                let incoming_bytes = memory_accountant::estimate_record_bytes(candidate) as u64;
                let ctx = inner.constraint_context(&workspace_id, incoming_bytes);
                match constraint::plan(&ctx) {
                    ConstraintOutcome::Proceed => return Ok(()),
                    ConstraintOutcome::Reject(e) => return Err(e),
                    ConstraintOutcome::Prune(directive) => {
                        let removed = inner.execute_prune(&directive, self.custom_pruning.as_ref(), now);
                        (removed, directive)
                    }
                }
            };
            let (removed, directive) = outcome;
            if removed.is_empty() {
                if stalled_once {
                    return Err(stalled_prune_error(&directive));
                }
                stalled_once = true;
                continue;
            }
            stalled_once = false;
            for id in &removed {
                self.accelerator.on_delete(id).await;
            }
        }
    }

    /// Under efficient-memory mode, load the on-disk snapshot into the
    /// resident map if it is currently empty. A no-op under normal mode,
    /// or once the map is already resident. Every read or write that
    /// touches `inner.store` calls this first so a record that exists
    /// only on disk is never silently invisible.
    async fn ensure_hydrated(&self) -> VectorStoreResult<()> {
        let (needs_load, path) = {
            let inner = self.inner.lock().await;
            (inner.efficient_memory && inner.store.is_empty(), inner.config.path.clone())
        };
        let Some(path) = (if needs_load { path } else { None }) else {
            return Ok(());
        };
        let records = persistence::load_snapshot(&path).await?;
        let mut inner = self.inner.lock().await;
        if inner.store.is_empty() {
            let now = now_ms();
            inner.store.replace_all(records, now);
            inner.accountant.refresh(inner.store.iter());
        }
        Ok(())
    }

    /// Under efficient-memory mode, drop the resident map back to empty
    /// once an operation no longer needs it — the counterpart to
    /// `ensure_hydrated`. A no-op under normal mode.
    async fn dehydrate_if_efficient(&self) {
        let mut inner = self.inner.lock().await;
        if inner.efficient_memory {
            inner.store.clear();
            inner.accountant.refresh(inner.store.iter());
        }
    }

    /// `storeText`: resolve `text` via the precomputed-query table or the
    /// `EmbeddingProvider`, then delegate to `store`.
    pub async fn store_text(&self, text: &str, mut metadata: Option<Metadata>) -> VectorStoreResult<String> {
        let (dimension, cached) = {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            (inner.config.dimension, inner.precomputed_queries.get(text).cloned())
        };
        let vector = match cached {
            Some(v) => v,
            None => {
                let provider = self
                    .embedding_provider
                    .as_ref()
                    .ok_or(VectorStoreError::EmbeddingProviderMissing)?;
                search::embed_query(provider.as_ref(), text, dimension).await?
            }
        };
        let meta = metadata.get_or_insert_with(Metadata::new);
        meta.entry(record::reserved::TEXT.to_string())
            .or_insert_with(|| MetadataValue::from(text));
        self.store(vector, metadata).await
    }

    /// Read a record, bumping its access-time. Under efficient-memory
    /// mode, loads the snapshot from disk on demand if it is not
    /// already resident, and drops it again afterward.
    pub async fn get(&self, id: &str) -> VectorStoreResult<Option<Record>> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let record = inner.store.get(id, now).cloned();
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(record)
    }

    /// Delete a single record. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> VectorStoreResult<bool> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let mut inner = self.inner.lock().await;
        let removed = inner.store.remove(id).is_some();
        if removed {
            inner.accountant.refresh(inner.store.iter());
            inner.filter_cache.clear();
        }
        let persist = inner.persistence_enabled.then(|| inner.config.path.clone()).flatten();
        let snapshot = if removed { persist.as_ref().map(|_| inner.store.snapshot()) } else { None };
        let efficient = inner.efficient_memory;
        drop(inner);

        if removed {
            self.accelerator.on_delete(id).await;
            if let (Some(path), Some(snapshot)) = (persist, snapshot) {
                persistence::write_snapshot(&path, &snapshot).await?;
            }
        }
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(removed)
    }

    /// Remove every record matching `filter` (deleteByFilter): gathers the
    /// matching id set under the lock, then reuses `delete_batch`'s
    /// all-or-nothing snapshot/restore discipline.
    pub async fn delete_by_filter(&self, filter: serde_json::Value) -> VectorStoreResult<usize> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let ids: Vec<String> = {
            let inner = self.inner.lock().await;
            let parsed = Filter::parse(&filter);
            let now = now_ms();
            inner
                .store
                .iter()
                .filter(|r| {
                    let ctx = filter::EvalContext { now_ms: now, created_ms: r.id_creation_epoch_ms() };
                    filter::evaluate(&parsed.node, &r.metadata, ctx)
                })
                .map(|r| r.id.clone())
                .collect()
        };
        self.delete_batch(&ids).await
    }

    /// Clear the store entirely (primary map, caches, accountant, and the
    /// mirrored Accelerator).
    pub async fn clear(&self) -> VectorStoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.require_initialized()?;
        inner.store.clear();
        inner.filter_cache.clear();
        inner.accountant.refresh(inner.store.iter());
        let persist = inner.persistence_enabled.then(|| inner.config.path.clone()).flatten();
        drop(inner);

        self.accelerator.on_clear().await;
        if let Some(path) = persist {
            persistence::write_snapshot(&path, &HashMap::new()).await?;
        }
        Ok(())
    }

    // ---- Search -----------------------------------------------------------

    /// The base vector search: accelerator path when one is configured,
    /// otherwise the in-process filter+score pipeline.
    pub async fn search(&self, query: Vec<f64>, opts: SearchOptions) -> VectorStoreResult<Vec<SearchHit>> {
        let start = std::time::Instant::now();
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            if query.len() != inner.config.dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: inner.config.dimension,
                    actual: query.len(),
                });
            }
        }

        // Efficient-memory mode loads the snapshot from disk on demand for
        // the in-process path; the accelerator path never touches the
        // resident map, so it skips the load entirely.
        if !self.accelerator.is_present() {
            self.ensure_hydrated().await?;
        }

        let mut inner = self.inner.lock().await;
        let hits = if self.accelerator.is_present() {
            drop(inner);
            let hits = search::search_via_accelerator(&self.accelerator, &query, &opts).await?;
            inner = self.inner.lock().await;
            hits
        } else {
            let now = now_ms();
            let metric = inner.config.metric;
            let enable_cache = inner.config.enable_filter_cache;
            let track_stats = inner.config.track_filter_stats;
            let Inner { store, filter_cache, filter_stats, .. } = &mut *inner;
            let ctx = search::InProcessSearch {
                store,
                metric,
                cache: filter_cache,
                stats: Some(filter_stats),
                enable_cache,
                track_stats,
                now_ms: now,
            };
            search::search_in_process(ctx, &query, &opts)?
        };

        inner.metrics.record(OperationKind::Search, start.elapsed().as_secs_f64() * 1000.0);
        let efficient = inner.efficient_memory && !self.accelerator.is_present();
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(hits)
    }

    /// `searchText`: resolve a query embedding then delegate to `search`.
    pub async fn search_text(&self, text: &str, opts: SearchOptions) -> VectorStoreResult<Vec<SearchHit>> {
        let query = self.resolve_query_embedding(text).await?;
        self.search(query, opts).await
    }

    async fn resolve_query_embedding(&self, text: &str) -> VectorStoreResult<Vec<f64>> {
        let (dimension, cached) = {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            (inner.config.dimension, inner.precomputed_queries.get(text).cloned())
        };
        if let Some(v) = cached {
            return Ok(v);
        }
        let provider = self
            .embedding_provider
            .as_ref()
            .ok_or(VectorStoreError::EmbeddingProviderMissing)?;
        search::embed_query(provider.as_ref(), text, dimension).await
    }

    /// Fan out independent queries concurrently, preserving input order.
    pub async fn search_batch(&self, queries: Vec<(Vec<f64>, SearchOptions)>) -> Vec<VectorStoreResult<Vec<SearchHit>>> {
        let futs = queries.into_iter().map(|(q, opts)| self.search(q, opts));
        futures::future::join_all(futs).await
    }

    /// `hybridSearch`: widen to `k' = 2k`, then re-rank by a blend of
    /// vector similarity and filter-match weight.
    pub async fn hybrid_search(
        &self,
        text: &str,
        mut opts: SearchOptions,
        weight_vector: f64,
        weight_metadata: f64,
    ) -> VectorStoreResult<Vec<SearchHit>> {
        let k = opts.k;
        let has_filter = opts.filter.is_some();
        opts.k = k.saturating_mul(2).max(k);
        let base = self.search_text(text, opts).await?;
        let ranked = search::apply_hybrid_ranking(base, has_filter, weight_vector, weight_metadata, k);
        Ok(ranked.into_iter().map(|(hit, _)| hit).collect())
    }

    /// `searchWithReranking`: widen to `max(k, rerankTop)`, then reorder
    /// with the `CrossEncoder`.
    pub async fn search_with_reranking(
        &self,
        text: &str,
        mut opts: SearchOptions,
        rerank_top: usize,
    ) -> VectorStoreResult<Vec<SearchHit>> {
        let k = opts.k;
        opts.k = k.max(rerank_top);
        let base = self.search_text(text, opts).await?;
        let encoder = self.cross_encoder.as_ref().ok_or(VectorStoreError::CrossEncoderMissing)?;
        search::apply_reranking(encoder.as_ref(), text, base, k).await
    }

    /// Register a precomputed query embedding consulted by `storeText`/
    /// `searchText` before falling back to the `EmbeddingProvider`.
    pub async fn register_precomputed_query(&self, text: impl Into<String>, vector: Vec<f64>) {
        let mut inner = self.inner.lock().await;
        inner.precomputed_queries.insert(text.into(), vector);
    }

    // ---- Batch operations ---------------------------------------------

    /// `storeBatch`: strict mode pre-validates every vector and writes
    /// nothing on any failure; `allowPartialBatch` processes item-by-item,
    /// accumulating successes and per-index errors.
    pub async fn store_batch(&self, items: Vec<(Vec<f64>, Option<Metadata>)>) -> VectorStoreResult<BatchStoreOutcome> {
        let (allow_partial, dimension) = {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            (inner.config.allow_partial_batch, inner.config.dimension)
        };

        if !allow_partial {
            let mut errors = Vec::new();
            for (i, (vector, _)) in items.iter().enumerate() {
                if let Err(e) = validate_vector(vector, dimension) {
                    errors.push(BatchItemError::new(i, e.to_string()));
                }
            }
            if !errors.is_empty() {
                return Err(VectorStoreError::BatchValidationFailure { errors });
            }
            let mut stored = Vec::with_capacity(items.len());
            for (vector, metadata) in items {
                stored.push(self.store(vector, metadata).await?);
            }
            return Ok(BatchStoreOutcome { stored, errors: Vec::new() });
        }

        let mut stored = Vec::new();
        let mut errors = Vec::new();
        for (i, (vector, metadata)) in items.into_iter().enumerate() {
            match self.store(vector, metadata).await {
                Ok(id) => stored.push(id),
                Err(e) => errors.push(BatchItemError::new(i, e.to_string())),
            }
        }
        Ok(BatchStoreOutcome { stored, errors })
    }

    /// `upsertBatch`: same-id mutation. Existing ids are overwritten
    /// directly; unseen ids go through the Constraint Gate exactly like
    /// `store`.
    pub async fn upsert_batch(
        &self,
        items: Vec<(String, Vec<f64>, Option<Metadata>)>,
    ) -> VectorStoreResult<BatchStoreOutcome> {
        let dimension = {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            inner.config.dimension
        };

        let mut stored = Vec::new();
        let mut errors = Vec::new();
        for (i, (id, vector, metadata)) in items.into_iter().enumerate() {
            if let Err(e) = validate_vector(&vector, dimension) {
                errors.push(BatchItemError::new(i, e.to_string()));
                continue;
            }
            if let Err(e) = self.ensure_hydrated().await {
                errors.push(BatchItemError::new(i, e.to_string()));
                continue;
            }
            let metadata = metadata.unwrap_or_default();
            let now = now_ms();
            let exists = {
                let inner = self.inner.lock().await;
                inner.store.contains(&id)
            };
            let record = Rec::new(id.clone(), vector, metadata);
            if !exists {
                if let Err(e) = self.admit(&record, now).await {
                    errors.push(BatchItemError::new(i, e.to_string()));
                    self.dehydrate_if_efficient().await;
                    continue;
                }
            }

            let mut inner = self.inner.lock().await;
            inner.store.upsert(record.clone(), now);
            inner.accountant.refresh(inner.store.iter());
            inner.filter_cache.clear();
            let persist = inner.persistence_enabled.then(|| inner.config.path.clone()).flatten();
            let snapshot = persist.as_ref().map(|_| inner.store.snapshot());
            drop(inner);

            self.accelerator.on_insert(&record).await;
            if let (Some(path), Some(snapshot)) = (persist, snapshot) {
                if let Err(e) = persistence::write_snapshot(&path, &snapshot).await {
                    errors.push(BatchItemError::new(i, e.to_string()));
                    self.dehydrate_if_efficient().await;
                    continue;
                }
            }
            stored.push(id);
            // Efficient-memory mode: each item is its own persisted chunk,
            // dropped from the resident map once written.
            self.dehydrate_if_efficient().await;
        }
        Ok(BatchStoreOutcome { stored, errors })
    }

    pub async fn get_batch(&self, ids: &[String]) -> VectorStoreResult<Vec<Option<Record>>> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let mut inner = self.inner.lock().await;
        let now = now_ms();
        let result: Vec<Option<Record>> = ids.iter().map(|id| inner.store.get(id, now).cloned()).collect();
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(result)
    }

    pub async fn get_batch_by_filter(&self, filter: serde_json::Value) -> VectorStoreResult<Vec<Record>> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let inner = self.inner.lock().await;
        let parsed = Filter::parse(&filter);
        let now = now_ms();
        let result: Vec<Record> = inner
            .store
            .iter()
            .filter(|r| {
                let ctx = filter::EvalContext { now_ms: now, created_ms: r.id_creation_epoch_ms() };
                filter::evaluate(&parsed.node, &r.metadata, ctx)
            })
            .cloned()
            .collect();
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(result)
    }

    /// `deleteBatch`: snapshot the map before the loop; on any persistence
    /// failure, restore the snapshot and rethrow so the store's on-disk
    /// and in-memory state never diverge.
    pub async fn delete_batch(&self, ids: &[String]) -> VectorStoreResult<usize> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let mut inner = self.inner.lock().await;
        let backup = inner.store.snapshot();
        let backup_access_times = inner.store.access_times().clone();

        let mut deleted_ids = Vec::new();
        for id in ids {
            if inner.store.remove(id).is_some() {
                deleted_ids.push(id.clone());
            }
        }
        if deleted_ids.is_empty() {
            let efficient = inner.efficient_memory;
            drop(inner);
            if efficient {
                self.dehydrate_if_efficient().await;
            }
            return Ok(0);
        }
        inner.accountant.refresh(inner.store.iter());
        inner.filter_cache.clear();

        let persist = inner.persistence_enabled.then(|| inner.config.path.clone()).flatten();
        let efficient = inner.efficient_memory;
        if let Some(path) = persist.clone() {
            let snapshot = inner.store.snapshot();
            drop(inner);
            if let Err(e) = persistence::write_snapshot(&path, &snapshot).await {
                let mut inner = self.inner.lock().await;
                let restore_now = backup_access_times.values().copied().max().unwrap_or_else(now_ms);
                inner.store.replace_all(backup, restore_now);
                inner.accountant.refresh(inner.store.iter());
                inner.filter_cache.clear();
                drop(inner);
                if efficient {
                    self.dehydrate_if_efficient().await;
                }
                return Err(e);
            }
            for id in &deleted_ids {
                self.accelerator.on_delete(id).await;
            }
        } else {
            drop(inner);
            for id in &deleted_ids {
                self.accelerator.on_delete(id).await;
            }
        }
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(deleted_ids.len())
    }

    // ---- Backup / restore -----------------------------------------------

    /// Write a `.backup.<epoch-ms>` snapshot alongside the primary one.
    pub async fn create_backup(&self) -> VectorStoreResult<PathBuf> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let (path, snapshot) = {
            let inner = self.inner.lock().await;
            let path = inner.config.path.clone().ok_or(VectorStoreError::PersistenceRequired)?;
            (path, inner.store.snapshot())
        };
        let result = persistence::create_backup(&path, now_ms(), &snapshot).await;
        self.dehydrate_if_efficient().await;
        result
    }

    /// Replace the live store's contents with a backup (the most recent
    /// one under the configured path, or an explicit path). Mirrors the
    /// whole replaced set into the Accelerator.
    pub async fn restore_from_backup(&self, backup_path: Option<&Path>) -> VectorStoreResult<()> {
        let path = {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
            inner.config.path.clone().ok_or(VectorStoreError::PersistenceRequired)?
        };
        let records = persistence::restore_from_backup(&path, backup_path).await?;

        let mut inner = self.inner.lock().await;
        inner.store.replace_all(records, now_ms());
        inner.accountant.refresh(inner.store.iter());
        inner.filter_cache.clear();
        let snapshot = inner.store.snapshot();
        drop(inner);

        self.accelerator.on_clear().await;
        let records: Vec<_> = snapshot.values().cloned().collect();
        self.accelerator.on_insert_batch(&records).await;
        persistence::write_snapshot(&path, &snapshot).await?;
        self.dehydrate_if_efficient().await;
        Ok(())
    }

    // ---- Diagnostics ------------------------------------------------------

    /// Check current counts/memory against configured limits without
    /// attempting any insert.
    pub async fn validate_constraints(&self) -> VectorStoreResult<ConstraintReport> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let inner = self.inner.lock().await;
        let cfg = &inner.config;
        let within_global_capacity = inner.store.len() <= cfg.max_vectors;
        let within_memory_cap = inner.accountant.usage_ratio() <= 1.0;
        let mut workspace_violations = Vec::new();
        for (workspace_id, count) in inner.store.workspace_counts() {
            let limit = cfg.effective_max_vectors_for_workspace(workspace_id);
            if *count > limit {
                workspace_violations.push(workspace_id.clone());
            }
        }
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(ConstraintReport { within_global_capacity, within_memory_cap, workspace_violations })
    }

    pub async fn get_memory_usage(&self) -> VectorStoreResult<MemoryUsageReport> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let inner = self.inner.lock().await;
        let report = MemoryUsageReport {
            total_bytes: inner.accountant.total_bytes(),
            cap_bytes: inner.accountant.cap_bytes(),
            usage_ratio: inner.accountant.usage_ratio(),
            record_count: inner.store.len(),
        };
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(report)
    }

    pub async fn get_workspace_stats(&self) -> VectorStoreResult<Vec<WorkspaceStat>> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let inner = self.inner.lock().await;
        let mut stats: Vec<WorkspaceStat> = inner
            .store
            .workspace_counts()
            .iter()
            .map(|(workspace_id, count)| WorkspaceStat {
                workspace_id: workspace_id.clone(),
                count: *count,
                limit: inner.config.effective_max_vectors_for_workspace(workspace_id),
            })
            .collect();
        stats.sort_by(|a, b| a.workspace_id.cmp(&b.workspace_id));
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(stats)
    }

    pub async fn get_pruning_stats(&self) -> VectorStoreResult<PruningStats> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        Ok(inner.pruning.stats())
    }

    pub async fn get_pruning_history(&self) -> VectorStoreResult<Vec<PruningHistoryEntry>> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        Ok(inner.pruning.history())
    }

    /// Compute what the next pruning pass would evict under the current
    /// strategy and `pruningConfig.batchSize`, without mutating the store.
    pub async fn preview_pruning(&self) -> VectorStoreResult<Vec<String>> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        self.ensure_hydrated().await?;
        let inner = self.inner.lock().await;
        let count = inner.config.pruning_config.batch_size;
        let preview = inner.preview_prune(self.custom_pruning.as_ref(), count);
        let efficient = inner.efficient_memory;
        drop(inner);
        if efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(preview)
    }

    /// Register a callback fired once per memory-pressure threshold
    /// crossing.
    pub async fn on_memory_pressure(&self, callback: PressureCallback) -> VectorStoreResult<()> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        inner.accountant.register_callback(callback);
        Ok(())
    }

    /// Apply a mutation to the live configuration, re-validating afterward.
    /// The accountant's cap is rebuilt from the new `maxMemoryMB`/thresholds.
    pub async fn update_constraints(&self, update: impl FnOnce(&mut VectorStoreConfig)) -> VectorStoreResult<()> {
        let mut inner = self.inner.lock().await;
        inner.require_initialized()?;
        let mut candidate = inner.config.clone();
        update(&mut candidate);
        candidate.validate()?;
        let accountant = MemoryAccountant::new(
            candidate.max_memory_mb,
            candidate.memory_pressure_thresholds.warning,
            candidate.memory_pressure_thresholds.critical,
        );
        accountant.refresh(inner.store.iter());
        inner.config = candidate;
        inner.accountant = accountant;
        Ok(())
    }

    /// Surface likely-surprising interactions in a candidate configuration
    /// before it is applied via `updateConstraints`.
    pub async fn validate_constraint_compatibility(&self, candidate: &VectorStoreConfig) -> VectorStoreResult<Vec<String>> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        let mut warnings = Vec::new();
        if candidate.max_vectors < inner.store.len() {
            warnings.push(format!(
                "candidate maxVectors ({}) is below the current record count ({})",
                candidate.max_vectors,
                inner.store.len()
            ));
        }
        if candidate.dimension != inner.config.dimension {
            warnings.push(format!(
                "candidate dimension ({}) differs from the store's fixed dimension ({}); existing vectors would become unsearchable",
                candidate.dimension, inner.config.dimension
            ));
        }
        if matches!(candidate.pruning_strategy, PruningStrategyKind::Custom) && self.custom_pruning.is_none() {
            warnings.push("candidate pruningStrategy is custom but no CustomPruningStrategy is registered".to_string());
        }
        if candidate.max_memory_mb < inner.accountant.total_bytes() as f64 / 1_048_576.0 {
            warnings.push("candidate maxMemoryMB is below the current estimated usage".to_string());
        }
        Ok(warnings)
    }

    /// Heuristic configuration suggestions derived from current usage.
    pub async fn get_config_recommendations(&self) -> VectorStoreResult<Vec<String>> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        let mut out = Vec::new();
        if !inner.config.enable_auto_pruning && inner.accountant.usage_ratio() > inner.config.memory_pressure_thresholds.warning {
            out.push("memory usage is above the warning threshold; consider enabling autoPruning".to_string());
        }
        let cache_stats = inner.filter_cache.stats();
        if cache_stats.hit_rate() < 0.3 && cache_stats.misses > 100 {
            out.push("filter cache hit rate is low; consider raising filterCacheSize or simplifying repeated filters".to_string());
        }
        if inner.config.workspace_isolation && inner.config.max_vectors_per_workspace == usize::MAX {
            out.push("workspaceIsolation is enabled with no per-workspace cap; consider setting maxVectorsPerWorkspace".to_string());
        }
        Ok(out)
    }

    /// Operational suggestions derived from recent latency and pruning
    /// activity, distinct from static config advice.
    pub async fn get_optimization_suggestions(&self) -> VectorStoreResult<Vec<String>> {
        {
            let inner = self.inner.lock().await;
            inner.require_initialized()?;
        }
        let dry_run = { self.inner.lock().await.config.pruning_config.dry_run };
        if dry_run {
            self.ensure_hydrated().await?;
        }
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        let search_summary = inner.metrics.summary(OperationKind::Search);
        if search_summary.p99_ms > 250.0 {
            out.push("search p99 latency is above 250ms; consider an accelerator or a smaller filter cache key space".to_string());
        }
        let pruning_stats = inner.pruning.stats();
        if pruning_stats.event_count > 0 && pruning_stats.ema_duration_ms > 50.0 {
            out.push("pruning passes are taking longer than 50ms on average; consider a smaller pruningBatchSize".to_string());
        }
        if !inner.metrics.anomalies().is_empty() {
            out.push("recent latency anomalies detected; see getAnomalies for details".to_string());
        }
        if inner.config.pruning_config.dry_run {
            let preview = inner.preview_prune(self.custom_pruning.as_ref(), inner.config.pruning_config.batch_size);
            if !preview.is_empty() {
                out.push(format!(
                    "pruningConfig.dryRun is enabled; the next pass would evict {} record(s) (see preview_pruning)",
                    preview.len()
                ));
            }
        }
        let efficient = inner.efficient_memory;
        drop(inner);
        if dry_run && efficient {
            self.dehydrate_if_efficient().await;
        }
        Ok(out)
    }

    pub async fn get_metrics(&self) -> VectorStoreResult<Vec<(OperationKind, LatencySummary)>> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        Ok(inner.metrics.all_summaries())
    }

    pub async fn check_health(&self) -> VectorStoreResult<HealthReport> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        let search_p99 = inner.metrics.summary(OperationKind::Search).p99_ms;
        Ok(metrics::check_health(inner.accountant.usage_ratio(), inner.store.len(), search_p99))
    }

    pub async fn get_anomalies(&self) -> VectorStoreResult<Vec<Anomaly>> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        Ok(inner.metrics.anomalies())
    }

    pub async fn get_filter_cache_stats(&self) -> VectorStoreResult<FilterCacheStats> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        Ok(inner.filter_cache.stats())
    }

    pub async fn get_filter_stats(&self) -> VectorStoreResult<FilterStatsSummary> {
        let inner = self.inner.lock().await;
        inner.require_initialized()?;
        Ok(inner.filter_stats.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{reserved, MetadataValue};
    use tempfile::TempDir;

    fn cfg(dim: usize) -> VectorStoreConfig {
        VectorStoreConfig::new(dim)
    }

    #[tokio::test]
    async fn store_then_get_roundtrips() {
        let store = VectorStore::new(cfg(3));
        store.initialize().await.unwrap();
        let id = store.store(vec![1.0, 0.0, 0.0], None).await.unwrap();
        let record = store.get(&id).await.unwrap().unwrap();
        assert_eq!(record.vector, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let store = VectorStore::new(cfg(3));
        let err = store.store(vec![1.0, 0.0, 0.0], None).await;
        assert!(matches!(err, Err(VectorStoreError::NotInitialized)));
    }

    #[tokio::test]
    async fn operations_fail_after_close() {
        let store = VectorStore::new(cfg(3));
        store.initialize().await.unwrap();
        store.close().await.unwrap();
        let err = store.store(vec![1.0, 0.0, 0.0], None).await;
        assert!(matches!(err, Err(VectorStoreError::AlreadyClosed)));
    }

    #[tokio::test]
    async fn search_returns_top_k_by_cosine() {
        let store = VectorStore::new(cfg(2));
        store.initialize().await.unwrap();
        store.store(vec![1.0, 0.0], None).await.unwrap();
        store.store(vec![0.0, 1.0], None).await.unwrap();
        store.store(vec![0.9, 0.1], None).await.unwrap();

        let hits = store
            .search(vec![1.0, 0.0], SearchOptions { k: 2, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn capacity_exceeded_without_auto_pruning_rejects() {
        let mut config = cfg(2);
        config.max_vectors = 1;
        let store = VectorStore::new(config);
        store.initialize().await.unwrap();
        store.store(vec![1.0, 0.0], None).await.unwrap();
        let err = store.store(vec![0.0, 1.0], None).await;
        assert!(matches!(err, Err(VectorStoreError::CapacityExceeded { .. })));
    }

    #[tokio::test]
    async fn fifo_auto_pruning_evicts_oldest_on_overflow() {
        let mut config = cfg(2);
        config.max_vectors = 2;
        config = config.with_auto_pruning(PruningStrategyKind::Fifo);
        let store = VectorStore::new(config);
        store.initialize().await.unwrap();

        let ts = |t: f64| {
            let mut m = Metadata::new();
            m.insert(reserved::TIMESTAMP.to_string(), MetadataValue::from(t));
            Some(m)
        };
        let first = store.store(vec![1.0, 0.0], ts(1.0)).await.unwrap();
        store.store(vec![0.0, 1.0], ts(2.0)).await.unwrap();
        store.store(vec![0.5, 0.5], ts(3.0)).await.unwrap();

        assert!(store.get(&first).await.unwrap().is_none());
        let usage = store.get_memory_usage().await.unwrap();
        assert_eq!(usage.record_count, 2);
    }

    #[tokio::test]
    async fn preview_pruning_reports_victims_without_removing_them() {
        let mut config = cfg(2);
        config.pruning_strategy = PruningStrategyKind::Fifo;
        config.pruning_config.batch_size = 1;
        let store = VectorStore::new(config);
        store.initialize().await.unwrap();

        let first = store.store(vec![1.0, 0.0], None).await.unwrap();
        store.store(vec![0.0, 1.0], None).await.unwrap();

        let preview = store.preview_pruning().await.unwrap();
        assert_eq!(preview, vec![first.clone()]);

        // A second preview is identical: nothing was actually evicted.
        let preview_again = store.preview_pruning().await.unwrap();
        assert_eq!(preview_again, vec![first.clone()]);
        assert!(store.get(&first).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_by_filter_removes_matching_records() {
        let store = VectorStore::new(cfg(1));
        store.initialize().await.unwrap();
        let mut tagged = Metadata::new();
        tagged.insert("tag".to_string(), MetadataValue::from("keep-me"));
        store.store(vec![1.0], Some(tagged)).await.unwrap();
        store.store(vec![2.0], None).await.unwrap();

        let removed = store
            .delete_by_filter(serde_json::json!({"tag": "keep-me"}))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get_memory_usage().await.unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn pinned_records_survive_auto_pruning() {
        let mut config = cfg(1);
        config.max_vectors = 1;
        config = config.with_auto_pruning(PruningStrategyKind::Fifo);
        let store = VectorStore::new(config);
        store.initialize().await.unwrap();
        let mut pinned = Metadata::new();
        pinned.insert(reserved::PINNED.to_string(), MetadataValue::from(true));
        let first = store.store(vec![1.0], Some(pinned)).await.unwrap();

        let err = store.store(vec![2.0], None).await;
        assert!(matches!(err, Err(VectorStoreError::CapacityExceeded { .. })));
        assert!(store.get(&first).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn persistence_round_trips_through_reinitialize() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(cfg(2).with_path(dir.path()));
        store.initialize().await.unwrap();
        let id = store.store(vec![1.0, 2.0], None).await.unwrap();
        store.close().await.unwrap();

        let reopened = VectorStore::new(cfg(2).with_path(dir.path()));
        reopened.initialize().await.unwrap();
        let record = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(record.vector, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn backup_and_restore_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::new(cfg(1).with_path(dir.path()));
        store.initialize().await.unwrap();
        let id = store.store(vec![1.0], None).await.unwrap();
        store.create_backup().await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());

        store.restore_from_backup(None).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn store_batch_strict_mode_rejects_whole_batch_on_one_bad_vector() {
        let store = VectorStore::new(cfg(2));
        store.initialize().await.unwrap();
        let err = store
            .store_batch(vec![(vec![1.0, 0.0], None), (vec![1.0], None)])
            .await;
        assert!(matches!(err, Err(VectorStoreError::BatchValidationFailure { .. })));
        assert_eq!(store.get_memory_usage().await.unwrap().record_count, 0);
    }

    #[tokio::test]
    async fn store_batch_partial_mode_accumulates_errors() {
        let mut config = cfg(2);
        config.allow_partial_batch = true;
        let store = VectorStore::new(config);
        store.initialize().await.unwrap();
        let outcome = store
            .store_batch(vec![(vec![1.0, 0.0], None), (vec![1.0], None)])
            .await
            .unwrap();
        assert_eq!(outcome.stored.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].index, 1);
    }

    #[tokio::test]
    async fn search_batch_preserves_input_order() {
        let store = VectorStore::new(cfg(2));
        store.initialize().await.unwrap();
        store.store(vec![1.0, 0.0], None).await.unwrap();
        store.store(vec![0.0, 1.0], None).await.unwrap();

        let queries = vec![
            (vec![1.0, 0.0], SearchOptions { k: 1, ..Default::default() }),
            (vec![0.0, 1.0], SearchOptions { k: 1, ..Default::default() }),
        ];
        let results = store.search_batch(queries).await;
        assert!(results[0].as_ref().unwrap()[0].vector == vec![1.0, 0.0]);
        assert!(results[1].as_ref().unwrap()[0].vector == vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn memory_usage_tracks_record_count() {
        let store = VectorStore::new(cfg(2));
        store.initialize().await.unwrap();
        store.store(vec![1.0, 0.0], None).await.unwrap();
        let usage = store.get_memory_usage().await.unwrap();
        assert_eq!(usage.record_count, 1);
        assert!(usage.total_bytes > 0);
    }

    #[tokio::test]
    async fn update_constraints_rejects_invalid_candidate() {
        let store = VectorStore::new(cfg(2));
        store.initialize().await.unwrap();
        let err = store.update_constraints(|c| c.dimension = 0).await;
        assert!(matches!(err, Err(VectorStoreError::InvalidConfig { .. })));
    }
}
