//! Filter Stats Table: usage counters keyed by canonical filter shape,
//! plus derived diagnostic views surfaced through `get_filter_stats`.
use std::collections::HashMap;

#[derive(Debug, Clone, serde::Serialize)]
pub struct FieldFrequency {
    pub field: String,
    pub count: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FilterUsage {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FilterStatsSummary {
    pub most_used: Vec<FilterUsage>,
    pub field_frequency: Vec<FieldFrequency>,
    pub average_complexity: f64,
    pub total_filters_seen: usize,
    pub total_evaluations: u64,
}

/// Rolling usage counters for filter shapes, recorded each time the
/// evaluator runs on a filter (when `trackFilterStats` is enabled).
#[derive(Debug, Default)]
pub struct FilterStatsTable {
    use_counts: HashMap<String, u64>,
    field_counts: HashMap<String, u64>,
    complexity_sum: HashMap<String, usize>,
}

impl FilterStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single evaluation of `key`, touching `fields`, of the
    /// given structural `complexity`.
    pub fn record(&mut self, key: &str, fields: &[String], complexity: usize) {
        *self.use_counts.entry(key.to_string()).or_insert(0) += 1;
        self.complexity_sum.entry(key.to_string()).or_insert(complexity);
        for field in fields {
            *self.field_counts.entry(field.clone()).or_insert(0) += 1;
        }
    }

    pub fn summary(&self) -> FilterStatsSummary {
        let mut most_used: Vec<FilterUsage> = self
            .use_counts
            .iter()
            .map(|(k, v)| FilterUsage { key: k.clone(), count: *v })
            .collect();
        most_used.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
        most_used.truncate(10);

        let mut field_frequency: Vec<FieldFrequency> = self
            .field_counts
            .iter()
            .map(|(f, c)| FieldFrequency { field: f.clone(), count: *c })
            .collect();
        field_frequency.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.field.cmp(&b.field)));

        let total_evaluations: u64 = self.use_counts.values().sum();
        let average_complexity = if self.complexity_sum.is_empty() {
            0.0
        } else {
            self.complexity_sum.values().sum::<usize>() as f64 / self.complexity_sum.len() as f64
        };

        FilterStatsSummary {
            most_used,
            field_frequency,
            average_complexity,
            total_filters_seen: self.use_counts.len(),
            total_evaluations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_used_is_ordered_by_count_desc() {
        let mut stats = FilterStatsTable::new();
        stats.record("a", &["x".into()], 1);
        stats.record("b", &["x".into(), "y".into()], 2);
        stats.record("b", &["x".into(), "y".into()], 2);
        let summary = stats.summary();
        assert_eq!(summary.most_used[0].key, "b");
        assert_eq!(summary.most_used[0].count, 2);
    }

    #[test]
    fn field_frequency_counts_every_occurrence() {
        let mut stats = FilterStatsTable::new();
        stats.record("a", &["x".into()], 1);
        stats.record("b", &["x".into()], 1);
        let summary = stats.summary();
        let x = summary.field_frequency.iter().find(|f| f.field == "x").unwrap();
        assert_eq!(x.count, 2);
    }
}
