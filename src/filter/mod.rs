//! Filter subsystem: tree parsing + evaluation, the bounded result
//! cache, and usage statistics.
mod cache;
mod eval;
mod stats;

pub use cache::{FilterCacheStats, FilterResultCache};
pub use eval::{evaluate, EvalContext, Filter, FilterNode, OpBag};
pub use stats::{FieldFrequency, FilterStatsSummary, FilterStatsTable, FilterUsage};
