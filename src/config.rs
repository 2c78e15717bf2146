//! Store configuration: an enumerated option struct in place of an
//! open-ended dictionary config.
use crate::error::{VectorStoreError, VectorStoreResult};
use crate::kernel::SimilarityMetric;
use crate::pruning::PruningStrategyKind;
use std::collections::HashMap;
use std::path::PathBuf;

/// Whether the primary store keeps its full map resident, or loads
/// records from disk on demand to keep a lower memory footprint.
///
/// `Efficient` requires a persistence path: `initialize` validates the
/// snapshot file without loading it, leaving the resident map empty.
/// Every read or write then loads the snapshot on demand if the map is
/// currently empty, and drops back to empty again once the operation
/// that needed it completes, so the store never holds more than one
/// record's worth of data resident at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    Normal,
    Efficient,
}

/// Whether a projected memory overage fails outright (`Strict`) or is
/// resolved by pruning when possible (`Soft`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryConstraintMode {
    Strict,
    Soft,
}

/// Fine-grained pruning knobs.
#[derive(Debug, Clone)]
pub struct PruningConfig {
    pub batch_size: usize,
    pub threshold: f64,
    pub preserve_count: usize,
    pub respect_pinned: bool,
    pub dry_run: bool,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            threshold: 0.9,
            preserve_count: 0,
            respect_pinned: true,
            dry_run: false,
        }
    }
}

/// Warning/critical fractions (of `maxMemoryMB`) that trigger pressure callbacks.
#[derive(Debug, Clone, Copy)]
pub struct MemoryPressureThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for MemoryPressureThresholds {
    fn default() -> Self {
        Self { warning: 0.75, critical: 0.9 }
    }
}

/// Per-workspace overrides of the global capacity and pruning policy.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceOverride {
    pub max_vectors: Option<usize>,
    pub pruning_strategy: Option<PruningStrategyKind>,
    pub track_detailed_stats: bool,
    pub track_pruning_stats: bool,
}

/// The full store configuration, validated once at `initialize()`.
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub dimension: usize,
    pub path: Option<PathBuf>,
    pub metric: SimilarityMetric,
    pub memory_mode: MemoryMode,
    pub filter_cache_size: usize,
    pub max_vectors: usize,
    pub max_vectors_per_workspace: usize,
    pub workspace_isolation: bool,
    pub max_memory_mb: f64,
    pub memory_constraint_mode: MemoryConstraintMode,
    pub enable_auto_pruning: bool,
    pub pruning_strategy: PruningStrategyKind,
    pub priority_field: String,
    pub batch_pruning: bool,
    pub pruning_batch_size: usize,
    pub pruning_threshold: f64,
    pub pruning_config: PruningConfig,
    pub memory_pruning_threshold: f64,
    pub memory_pressure_thresholds: MemoryPressureThresholds,
    pub workspace_config: HashMap<String, WorkspaceOverride>,
    pub allow_partial_batch: bool,
    pub track_filter_stats: bool,
    pub track_pruning_stats: bool,
    pub enable_filter_cache: bool,
    pub enable_config_recommendations: bool,
    pub precompute_queries: bool,
    pub fallback_to_memory: bool,
}

impl VectorStoreConfig {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            path: None,
            metric: SimilarityMetric::Cosine,
            memory_mode: MemoryMode::Normal,
            filter_cache_size: 1000,
            max_vectors: usize::MAX,
            max_vectors_per_workspace: usize::MAX,
            workspace_isolation: false,
            max_memory_mb: 1024.0,
            memory_constraint_mode: MemoryConstraintMode::Soft,
            enable_auto_pruning: false,
            pruning_strategy: PruningStrategyKind::Fifo,
            priority_field: "importance".to_string(),
            batch_pruning: false,
            pruning_batch_size: 10,
            pruning_threshold: 0.9,
            pruning_config: PruningConfig::default(),
            memory_pruning_threshold: 0.8,
            memory_pressure_thresholds: MemoryPressureThresholds::default(),
            workspace_config: HashMap::new(),
            allow_partial_batch: false,
            track_filter_stats: true,
            track_pruning_stats: true,
            enable_filter_cache: true,
            enable_config_recommendations: true,
            precompute_queries: false,
            fallback_to_memory: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_vectors(mut self, n: usize) -> Self {
        self.max_vectors = n;
        self
    }

    pub fn with_auto_pruning(mut self, strategy: PruningStrategyKind) -> Self {
        self.enable_auto_pruning = true;
        self.pruning_strategy = strategy;
        self
    }

    /// The effective per-workspace limit for `workspace_id`, honoring the
    /// per-workspace override when present.
    pub fn effective_max_vectors_for_workspace(&self, workspace_id: &str) -> usize {
        self.workspace_config
            .get(workspace_id)
            .and_then(|w| w.max_vectors)
            .unwrap_or(self.max_vectors_per_workspace)
    }

    pub fn effective_pruning_strategy_for_workspace(&self, workspace_id: &str) -> PruningStrategyKind {
        self.workspace_config
            .get(workspace_id)
            .and_then(|w| w.pruning_strategy)
            .unwrap_or(self.pruning_strategy)
    }

    /// Validate the configuration at `initialize()`.
    pub fn validate(&self) -> VectorStoreResult<()> {
        if self.dimension == 0 {
            return Err(VectorStoreError::InvalidConfig {
                reason: "dimension must be > 0".to_string(),
            });
        }
        if self.max_memory_mb <= 0.0 {
            return Err(VectorStoreError::InvalidConfig {
                reason: "maxMemoryMB must be > 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.memory_pruning_threshold) {
            return Err(VectorStoreError::InvalidConfig {
                reason: "memoryPruningThreshold must be within [0, 1]".to_string(),
            });
        }
        if matches!(self.pruning_strategy, PruningStrategyKind::Custom) && self.enable_auto_pruning {
            // Custom strategy requires a callback registered on the store;
            // that is checked at use-time, not at config-validation time.
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_rejected() {
        let cfg = VectorStoreConfig::new(0);
        assert!(matches!(cfg.validate(), Err(VectorStoreError::InvalidConfig { .. })));
    }

    #[test]
    fn zero_memory_cap_is_rejected() {
        let mut cfg = VectorStoreConfig::new(3);
        cfg.max_memory_mb = 0.0;
        assert!(matches!(cfg.validate(), Err(VectorStoreError::InvalidConfig { .. })));
    }

    #[test]
    fn workspace_override_takes_precedence() {
        let mut cfg = VectorStoreConfig::new(3);
        cfg.max_vectors_per_workspace = 10;
        cfg.workspace_config.insert(
            "ws1".to_string(),
            WorkspaceOverride { max_vectors: Some(5), ..Default::default() },
        );
        assert_eq!(cfg.effective_max_vectors_for_workspace("ws1"), 5);
        assert_eq!(cfg.effective_max_vectors_for_workspace("ws2"), 10);
    }
}
