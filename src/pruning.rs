//! Pruning Engine: victim selection strategies, execution bookkeeping,
//! and pruning history.
use crate::memory_accountant::estimate_record_bytes;
use crate::record::Record;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Eviction policy selecting prune victims, configured via `pruningStrategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruningStrategyKind {
    Fifo,
    Lru,
    Priority,
    MemoryBased,
    Custom,
}

/// A caller-supplied victim selector for `PruningStrategyKind::Custom`:
/// receives the eligible candidates and a count, returns the ids to evict.
pub type CustomPruningStrategy = Box<dyn Fn(&[&Record], usize) -> Vec<String> + Send + Sync>;

/// Why a pruning pass was triggered (recorded in `PruningHistory`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneReason {
    BatchThreshold,
    CapacityExceeded,
    WorkspaceCapacityExceeded,
    MemoryPressure,
    MemoryExceeded,
    Manual,
}

/// Inputs to a single victim-selection call.
pub struct PruningRequest<'a> {
    pub strategy: PruningStrategyKind,
    pub count: usize,
    pub priority_field: &'a str,
    pub respect_pinned: bool,
    pub access_times: &'a HashMap<String, i64>,
    pub custom: Option<&'a CustomPruningStrategy>,
}

/// Select `count` (or fewer, if the candidate set is smaller) victim ids
/// from `candidates` under `req.strategy`. Every strategy breaks ties on
/// `id` ascending for a stable order. `respect_pinned` excludes
/// `metadata.pinned == true` records from consideration entirely.
pub fn select_victims(candidates: &[&Record], req: &PruningRequest<'_>) -> Vec<String> {
    let eligible: Vec<&&Record> = if req.respect_pinned {
        candidates.iter().filter(|r| !r.pinned()).collect()
    } else {
        candidates.iter().collect()
    };

    if req.count == 0 || eligible.is_empty() {
        return Vec::new();
    }

    match req.strategy {
        PruningStrategyKind::Custom => {
            let refs: Vec<&Record> = eligible.iter().map(|r| **r).collect();
            match req.custom {
                Some(f) => f(&refs, req.count),
                None => Vec::new(),
            }
        }
        PruningStrategyKind::Fifo => {
            let mut ranked: Vec<(&Record, i64)> = eligible
                .iter()
                .map(|r| (**r, fifo_key(r)))
                .collect();
            ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
            take_ids(ranked.into_iter().map(|(r, _)| r), req.count)
        }
        PruningStrategyKind::Lru => {
            let mut ranked: Vec<(&Record, i64)> = eligible
                .iter()
                .map(|r| (**r, *req.access_times.get(&r.id).unwrap_or(&i64::MAX)))
                .collect();
            ranked.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.id.cmp(&b.0.id)));
            take_ids(ranked.into_iter().map(|(r, _)| r), req.count)
        }
        PruningStrategyKind::Priority => {
            let mut ranked: Vec<(&Record, f64)> = eligible
                .iter()
                .map(|r| (**r, r.priority(req.priority_field)))
                .collect();
            ranked.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });
            take_ids(ranked.into_iter().map(|(r, _)| r), req.count)
        }
        PruningStrategyKind::MemoryBased => {
            let mut ranked: Vec<(&Record, usize)> = eligible
                .iter()
                .map(|r| (**r, estimate_record_bytes(r)))
                .collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
            take_ids(ranked.into_iter().map(|(r, _)| r), req.count)
        }
    }
}

fn take_ids<'a>(it: impl Iterator<Item = &'a Record>, count: usize) -> Vec<String> {
    it.take(count).map(|r| r.id.clone()).collect()
}

/// FIFO sort key: `metadata.timestamp` if present, else the creation
/// epoch-ms embedded in the id.
fn fifo_key(r: &Record) -> i64 {
    if let Some(ts) = r.timestamp() {
        return ts as i64;
    }
    r.id_creation_epoch_ms().unwrap_or(i64::MAX)
}

/// A single entry in the append-only Pruning History.
#[derive(Debug, Clone, Serialize)]
pub struct PruningHistoryEntry {
    pub timestamp_ms: i64,
    pub vectors_pruned: usize,
    pub strategy: PruningStrategyKind,
    pub reason: PruneReason,
}

/// Rolling statistics exposed via `getPruningStats`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PruningStats {
    pub total_pruned: u64,
    pub event_count: u64,
    pub ema_duration_ms: f64,
}

const EMA_ALPHA: f64 = 0.2;

/// Owns Pruning Stats and the capped Pruning History log; victim
/// selection itself is the free function `select_victims` above so it
/// can be unit-tested without bookkeeping state.
pub struct PruningEngine {
    stats: PruningStats,
    history: VecDeque<PruningHistoryEntry>,
    history_cap: usize,
}

impl PruningEngine {
    pub fn new(history_cap: usize) -> Self {
        Self {
            stats: PruningStats::default(),
            history: VecDeque::new(),
            history_cap,
        }
    }

    /// Record a completed pruning pass.
    pub fn record_event(
        &mut self,
        now_ms: i64,
        vectors_pruned: usize,
        strategy: PruningStrategyKind,
        reason: PruneReason,
        duration_ms: f64,
    ) {
        self.stats.total_pruned += vectors_pruned as u64;
        self.stats.event_count += 1;
        self.stats.ema_duration_ms = if self.stats.event_count == 1 {
            duration_ms
        } else {
            EMA_ALPHA * duration_ms + (1.0 - EMA_ALPHA) * self.stats.ema_duration_ms
        };

        self.history.push_back(PruningHistoryEntry {
            timestamp_ms: now_ms,
            vectors_pruned,
            strategy,
            reason,
        });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }

    pub fn stats(&self) -> PruningStats {
        self.stats
    }

    pub fn history(&self) -> Vec<PruningHistoryEntry> {
        self.history.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{reserved, Metadata, MetadataValue, Record};

    fn rec(id: &str, ts: Option<f64>, pinned: bool) -> Record {
        let mut meta = Metadata::new();
        if let Some(ts) = ts {
            meta.insert(reserved::TIMESTAMP.to_string(), MetadataValue::from(ts));
        }
        if pinned {
            meta.insert(reserved::PINNED.to_string(), MetadataValue::from(true));
        }
        Record::new(id.to_string(), vec![0.0], meta)
    }

    #[test]
    fn fifo_orders_oldest_first() {
        let a = rec("vec_1_aaaaaaaaa", Some(5.0), false);
        let b = rec("vec_1_bbbbbbbbb", Some(1.0), false);
        let c = rec("vec_1_ccccccccc", Some(3.0), false);
        let candidates = vec![&a, &b, &c];
        let access = HashMap::new();
        let req = PruningRequest {
            strategy: PruningStrategyKind::Fifo,
            count: 2,
            priority_field: "importance",
            respect_pinned: true,
            access_times: &access,
            custom: None,
        };
        let victims = select_victims(&candidates, &req);
        assert_eq!(victims, vec!["vec_1_bbbbbbbbb".to_string(), "vec_1_ccccccccc".to_string()]);
    }

    #[test]
    fn respects_pinned_records() {
        let a = rec("vec_1_aaaaaaaaa", Some(1.0), true);
        let b = rec("vec_1_bbbbbbbbb", Some(2.0), false);
        let candidates = vec![&a, &b];
        let access = HashMap::new();
        let req = PruningRequest {
            strategy: PruningStrategyKind::Fifo,
            count: 2,
            priority_field: "importance",
            respect_pinned: true,
            access_times: &access,
            custom: None,
        };
        let victims = select_victims(&candidates, &req);
        assert_eq!(victims, vec!["vec_1_bbbbbbbbb".to_string()]);
    }

    #[test]
    fn lru_orders_smallest_access_time_first() {
        let a = rec("vec_1_aaaaaaaaa", None, false);
        let b = rec("vec_1_bbbbbbbbb", None, false);
        let mut access = HashMap::new();
        access.insert("vec_1_aaaaaaaaa".to_string(), 100);
        access.insert("vec_1_bbbbbbbbb".to_string(), 50);
        let candidates = vec![&a, &b];
        let req = PruningRequest {
            strategy: PruningStrategyKind::Lru,
            count: 1,
            priority_field: "importance",
            respect_pinned: true,
            access_times: &access,
            custom: None,
        };
        assert_eq!(select_victims(&candidates, &req), vec!["vec_1_bbbbbbbbb".to_string()]);
    }

    #[test]
    fn priority_orders_smallest_importance_first() {
        let mut a = rec("vec_1_aaaaaaaaa", None, false);
        a.metadata.insert("importance".to_string(), MetadataValue::from(10.0));
        let mut b = rec("vec_1_bbbbbbbbb", None, false);
        b.metadata.insert("importance".to_string(), MetadataValue::from(1.0));
        let candidates = vec![&a, &b];
        let access = HashMap::new();
        let req = PruningRequest {
            strategy: PruningStrategyKind::Priority,
            count: 1,
            priority_field: "importance",
            respect_pinned: true,
            access_times: &access,
            custom: None,
        };
        assert_eq!(select_victims(&candidates, &req), vec!["vec_1_bbbbbbbbb".to_string()]);
    }

    #[test]
    fn memory_based_orders_largest_footprint_first() {
        let a = Record::new("vec_1_aaaaaaaaa".into(), vec![0.0; 10], Metadata::new());
        let b = Record::new("vec_1_bbbbbbbbb".into(), vec![0.0; 2000], Metadata::new());
        let candidates = vec![&a, &b];
        let access = HashMap::new();
        let req = PruningRequest {
            strategy: PruningStrategyKind::MemoryBased,
            count: 1,
            priority_field: "importance",
            respect_pinned: true,
            access_times: &access,
            custom: None,
        };
        assert_eq!(select_victims(&candidates, &req), vec!["vec_1_bbbbbbbbb".to_string()]);
    }

    #[test]
    fn stats_and_history_accumulate() {
        let mut engine = PruningEngine::new(2);
        engine.record_event(1, 3, PruningStrategyKind::Fifo, PruneReason::CapacityExceeded, 10.0);
        engine.record_event(2, 2, PruningStrategyKind::Fifo, PruneReason::Manual, 20.0);
        engine.record_event(3, 1, PruningStrategyKind::Fifo, PruneReason::Manual, 30.0);
        let stats = engine.stats();
        assert_eq!(stats.total_pruned, 6);
        assert_eq!(stats.event_count, 3);
        let history = engine.history();
        assert_eq!(history.len(), 2, "history log is capped");
        assert_eq!(history[0].timestamp_ms, 2);
    }
}
