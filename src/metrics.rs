//! Metrics & Health: ring-buffered operation latencies, plus derived
//! health and anomaly reports.
use serde::Serialize;
use std::collections::VecDeque;

/// Which operation a recorded latency sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Store,
    Search,
    Delete,
    Get,
    Batch,
}

struct Ring {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }
}

/// Latency percentile/summary view for one operation kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

fn summarize(mut samples: Vec<f64>) -> LatencySummary {
    if samples.is_empty() {
        return LatencySummary::default();
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = samples.len();
    let pick = |p: f64| samples[((n as f64 - 1.0) * p).round() as usize];
    LatencySummary {
        count: n,
        avg_ms: samples.iter().sum::<f64>() / n as f64,
        p50_ms: pick(0.50),
        p95_ms: pick(0.95),
        p99_ms: pick(0.99),
        max_ms: samples[n - 1],
    }
}

const DEFAULT_RING_CAPACITY: usize = 1000;

/// Owns one ring buffer per operation kind, and exposes summaries plus
/// a coarse anomaly scan (latencies far from the rolling average).
pub struct MetricsRegistry {
    store: Ring,
    search: Ring,
    delete: Ring,
    get: Ring,
    batch: Ring,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl MetricsRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: Ring::new(capacity),
            search: Ring::new(capacity),
            delete: Ring::new(capacity),
            get: Ring::new(capacity),
            batch: Ring::new(capacity),
        }
    }

    pub fn record(&mut self, kind: OperationKind, latency_ms: f64) {
        self.ring_mut(kind).push(latency_ms);
    }

    fn ring_mut(&mut self, kind: OperationKind) -> &mut Ring {
        match kind {
            OperationKind::Store => &mut self.store,
            OperationKind::Search => &mut self.search,
            OperationKind::Delete => &mut self.delete,
            OperationKind::Get => &mut self.get,
            OperationKind::Batch => &mut self.batch,
        }
    }

    fn ring(&self, kind: OperationKind) -> &Ring {
        match kind {
            OperationKind::Store => &self.store,
            OperationKind::Search => &self.search,
            OperationKind::Delete => &self.delete,
            OperationKind::Get => &self.get,
            OperationKind::Batch => &self.batch,
        }
    }

    pub fn summary(&self, kind: OperationKind) -> LatencySummary {
        summarize(self.ring(kind).samples.iter().copied().collect())
    }

    pub fn all_summaries(&self) -> Vec<(OperationKind, LatencySummary)> {
        [
            OperationKind::Store,
            OperationKind::Search,
            OperationKind::Delete,
            OperationKind::Get,
            OperationKind::Batch,
        ]
        .into_iter()
        .map(|k| (k, self.summary(k)))
        .collect()
    }

    /// Samples more than `STDDEV_THRESHOLD` standard deviations above the
    /// mean for their operation kind, reported as anomalies.
    pub fn anomalies(&self) -> Vec<Anomaly> {
        const STDDEV_THRESHOLD: f64 = 3.0;
        let mut out = Vec::new();
        for kind in [
            OperationKind::Store,
            OperationKind::Search,
            OperationKind::Delete,
            OperationKind::Get,
            OperationKind::Batch,
        ] {
            let samples: Vec<f64> = self.ring(kind).samples.iter().copied().collect();
            if samples.len() < 5 {
                continue;
            }
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
            let stddev = variance.sqrt();
            if stddev <= f64::EPSILON {
                continue;
            }
            for &s in &samples {
                if (s - mean) / stddev > STDDEV_THRESHOLD {
                    out.push(Anomaly { kind, latency_ms: s, mean_ms: mean, stddev_ms: stddev });
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub kind: OperationKind,
    pub latency_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
}

/// Overall health status reported by `check_health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub memory_usage_ratio: f64,
    pub record_count: usize,
    pub reasons: Vec<String>,
}

/// Derive a health report from current memory pressure and recent
/// search latency (a crude but cheap composite; hosts with richer
/// signals are expected to layer their own health checks on top).
pub fn check_health(memory_usage_ratio: f64, record_count: usize, search_p99_ms: f64) -> HealthReport {
    let mut reasons = Vec::new();
    let mut status = HealthStatus::Healthy;

    if memory_usage_ratio >= 0.95 {
        status = HealthStatus::Unhealthy;
        reasons.push("memory usage above 95% of cap".to_string());
    } else if memory_usage_ratio >= 0.8 {
        status = HealthStatus::Degraded;
        reasons.push("memory usage above 80% of cap".to_string());
    }

    if search_p99_ms > 1000.0 {
        status = HealthStatus::Unhealthy;
        reasons.push("search p99 latency above 1s".to_string());
    } else if search_p99_ms > 250.0 && status == HealthStatus::Healthy {
        status = HealthStatus::Degraded;
        reasons.push("search p99 latency above 250ms".to_string());
    }

    HealthReport { status, memory_usage_ratio, record_count, reasons }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_when_full() {
        let mut metrics = MetricsRegistry::new(2);
        metrics.record(OperationKind::Search, 1.0);
        metrics.record(OperationKind::Search, 2.0);
        metrics.record(OperationKind::Search, 3.0);
        let summary = metrics.summary(OperationKind::Search);
        assert_eq!(summary.count, 2);
    }

    #[test]
    fn summary_is_empty_for_no_samples() {
        let metrics = MetricsRegistry::default();
        let summary = metrics.summary(OperationKind::Store);
        assert_eq!(summary.count, 0);
    }

    #[test]
    fn health_degrades_under_memory_pressure() {
        let report = check_health(0.85, 100, 10.0);
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn health_is_healthy_under_normal_conditions() {
        let report = check_health(0.1, 10, 5.0);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn anomaly_detection_flags_outlier() {
        let mut metrics = MetricsRegistry::new(100);
        for _ in 0..20 {
            metrics.record(OperationKind::Search, 10.0);
        }
        metrics.record(OperationKind::Search, 500.0);
        let anomalies = metrics.anomalies();
        assert!(anomalies.iter().any(|a| a.kind == OperationKind::Search));
    }
}
