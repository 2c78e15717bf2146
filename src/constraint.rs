//! Constraint Gate: the ordered pre-insert checks, expressed as a pure
//! decision function over a snapshot of current counts/ratios. The
//! caller (the store façade in `lib.rs`) executes
//! any returned prune directive, recomputes the snapshot, and calls
//! `plan` again — this keeps the policy itself free of `.await` and
//! directly unit-testable.
use crate::config::{MemoryConstraintMode, VectorStoreConfig};
use crate::error::VectorStoreError;
use crate::pruning::{PruneReason, PruningStrategyKind};

/// Where a prune directive should draw its candidate set from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneScope {
    Global,
    Workspace(String),
}

/// An action the gate wants the caller to perform before it can re-check.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneDirective {
    pub scope: PruneScope,
    pub reason: PruneReason,
    pub count: usize,
}

/// The gate's verdict for the current snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintOutcome {
    /// Nothing stands in the way of the insert.
    Proceed,
    /// Run this prune, then call `plan` again with fresh numbers.
    Prune(PruneDirective),
    /// The insert cannot proceed.
    Reject(VectorStoreError),
}

/// A read-only snapshot of the numbers the gate needs. Built fresh by
/// the caller before each `plan` call.
pub struct ConstraintContext<'a> {
    pub config: &'a VectorStoreConfig,
    pub workspace_id: &'a str,
    pub total_size: usize,
    pub workspace_size: usize,
    /// Estimated footprint in bytes of the record about to be inserted.
    pub incoming_bytes: u64,
    pub current_memory_bytes: u64,
    pub memory_cap_bytes: f64,
}

impl ConstraintContext<'_> {
    fn projected_bytes(&self) -> u64 {
        self.current_memory_bytes + self.incoming_bytes
    }

    fn projected_ratio(&self) -> f64 {
        if self.memory_cap_bytes <= 0.0 {
            0.0
        } else {
            self.projected_bytes() as f64 / self.memory_cap_bytes
        }
    }

    fn current_ratio(&self) -> f64 {
        if self.memory_cap_bytes <= 0.0 {
            0.0
        } else {
            self.current_memory_bytes as f64 / self.memory_cap_bytes
        }
    }
}

/// Large-insert pre-emption threshold.
const LARGE_INSERT_BYTES: u64 = 100_000;
/// Target ratios for the memory-pressure repair checks below.
const MEMORY_BASED_REPAIR_TARGET: f64 = 0.5;
const AGGRESSIVE_REPAIR_TARGET: f64 = 0.7;
const LARGE_INSERT_PREEMPT_TARGET: f64 = 0.6;
const AGGRESSIVE_PRESSURE_RATIO: f64 = 0.9;

/// Evaluate the ordered pre-insert checks against one snapshot.
pub fn plan(ctx: &ConstraintContext<'_>) -> ConstraintOutcome {
    let cfg = ctx.config;

    // Step 1: batch threshold.
    if cfg.enable_auto_pruning && cfg.batch_pruning {
        let threshold_size = (cfg.max_vectors as f64 * cfg.pruning_threshold) as usize;
        if cfg.max_vectors != usize::MAX && ctx.total_size >= threshold_size {
            return ConstraintOutcome::Prune(PruneDirective {
                scope: PruneScope::Global,
                reason: PruneReason::BatchThreshold,
                count: cfg.pruning_batch_size.max(1),
            });
        }
    }

    // Step 2: global count.
    if ctx.total_size >= cfg.max_vectors {
        return if cfg.enable_auto_pruning {
            ConstraintOutcome::Prune(PruneDirective {
                scope: PruneScope::Global,
                reason: PruneReason::CapacityExceeded,
                count: 1,
            })
        } else {
            ConstraintOutcome::Reject(VectorStoreError::CapacityExceeded {
                reason: format!("global maxVectors ({}) reached", cfg.max_vectors),
            })
        };
    }

    // Step 3-4: workspace count, honoring per-workspace override.
    if cfg.workspace_isolation {
        let limit = cfg.effective_max_vectors_for_workspace(ctx.workspace_id);
        if ctx.workspace_size >= limit {
            return if cfg.enable_auto_pruning {
                ConstraintOutcome::Prune(PruneDirective {
                    scope: PruneScope::Workspace(ctx.workspace_id.to_string()),
                    reason: PruneReason::WorkspaceCapacityExceeded,
                    count: 1,
                })
            } else {
                ConstraintOutcome::Reject(VectorStoreError::CapacityExceeded {
                    reason: format!(
                        "per-workspace maxVectors ({limit}) reached for workspace '{}'",
                        ctx.workspace_id
                    ),
                })
            };
        }
    }

    // Step 5: memory.
    if ctx.projected_ratio() > 1.0 {
        if cfg.memory_constraint_mode == MemoryConstraintMode::Strict {
            return ConstraintOutcome::Reject(VectorStoreError::MemoryExceeded {
                reason: "projected memory usage exceeds maxMemoryMB (strict mode)".to_string(),
            });
        }
        if !cfg.enable_auto_pruning {
            return ConstraintOutcome::Reject(VectorStoreError::MemoryExceeded {
                reason: "projected memory usage exceeds maxMemoryMB".to_string(),
            });
        }
        return ConstraintOutcome::Prune(memory_repair_directive(ctx));
    }

    // Step 6: memory pressure (pre-emptive, below outright exceedance).
    if cfg.enable_auto_pruning {
        if matches!(cfg.pruning_strategy, PruningStrategyKind::MemoryBased)
            && ctx.projected_ratio() >= cfg.memory_pruning_threshold
        {
            return ConstraintOutcome::Prune(memory_repair_directive(ctx));
        }
        if ctx.projected_ratio() >= AGGRESSIVE_PRESSURE_RATIO {
            return ConstraintOutcome::Prune(PruneDirective {
                scope: PruneScope::Global,
                reason: PruneReason::MemoryPressure,
                count: repair_count(ctx, AGGRESSIVE_REPAIR_TARGET).max(1),
            });
        }
        if matches!(cfg.pruning_strategy, PruningStrategyKind::MemoryBased)
            && ctx.incoming_bytes > LARGE_INSERT_BYTES
            && ctx.current_ratio() >= LARGE_INSERT_PREEMPT_TARGET
        {
            return ConstraintOutcome::Prune(PruneDirective {
                scope: PruneScope::Global,
                reason: PruneReason::MemoryPressure,
                count: repair_count(ctx, LARGE_INSERT_PREEMPT_TARGET).max(1),
            });
        }
    }

    ConstraintOutcome::Proceed
}

fn memory_repair_directive(ctx: &ConstraintContext<'_>) -> PruneDirective {
    let target = if matches!(ctx.config.pruning_strategy, PruningStrategyKind::MemoryBased) {
        MEMORY_BASED_REPAIR_TARGET
    } else {
        // "prune 1 then re-check" for non-memory-based auto strategies.
        return PruneDirective {
            scope: PruneScope::Global,
            reason: PruneReason::MemoryExceeded,
            count: 1,
        };
    };
    PruneDirective {
        scope: PruneScope::Global,
        reason: PruneReason::MemoryExceeded,
        count: repair_count(ctx, target).max(2),
    }
}

/// Rough victim count to bring the projected ratio down to `target`,
/// assuming records are roughly uniform in size (a refinement pass; the
/// caller re-invokes `plan` after executing, so an imprecise estimate
/// here only costs an extra round trip, never correctness).
fn repair_count(ctx: &ConstraintContext<'_>, target: f64) -> usize {
    if ctx.total_size == 0 || ctx.memory_cap_bytes <= 0.0 {
        return 1;
    }
    let avg_bytes = ctx.current_memory_bytes as f64 / ctx.total_size as f64;
    if avg_bytes <= 0.0 {
        return 1;
    }
    let target_bytes = target * ctx.memory_cap_bytes;
    let excess = ctx.projected_bytes() as f64 - target_bytes;
    if excess <= 0.0 {
        1
    } else {
        (excess / avg_bytes).ceil() as usize
    }
}
