//! Primary Store: the canonical id→`Record` map, the Access-Time Table,
//! and the Workspace Count Table.
use crate::record::Record;
use std::collections::HashMap;

/// A `get` bumps the access-time to `now + 100ms` rather than `now`, so
/// it always sorts strictly after the record's creation time under LRU
/// even when `get` and `store` land in the same millisecond.
pub const GET_ACCESS_TIME_OFFSET_MS: i64 = 100;

/// The authoritative id→`Record` map plus its two derived indexes.
#[derive(Default)]
pub struct RecordStore {
    records: HashMap<String, Record>,
    access_times: HashMap<String, i64>,
    workspace_counts: HashMap<String, usize>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Insert a new record, recording its creation access-time. Callers
    /// must not use this to mutate an existing id's vector — only
    /// `upsertBatch` may do that; use `upsert` for that path.
    pub fn insert(&mut self, record: Record, now_ms: i64) {
        let workspace = record.workspace_id().to_string();
        *self.workspace_counts.entry(workspace).or_insert(0) += 1;
        self.access_times.insert(record.id.clone(), now_ms);
        self.records.insert(record.id.clone(), record);
    }

    /// Insert-or-replace, adjusting workspace counts if the workspace
    /// changed. This is `upsertBatch`'s same-id mutation path.
    pub fn upsert(&mut self, record: Record, now_ms: i64) {
        if let Some(old) = self.records.get(&record.id) {
            let old_workspace = old.workspace_id().to_string();
            let new_workspace = record.workspace_id().to_string();
            if old_workspace != new_workspace {
                self.dec_workspace(&old_workspace);
                *self.workspace_counts.entry(new_workspace).or_insert(0) += 1;
            }
        } else {
            *self.workspace_counts.entry(record.workspace_id().to_string()).or_insert(0) += 1;
        }
        self.access_times.entry(record.id.clone()).or_insert(now_ms);
        self.records.insert(record.id.clone(), record);
    }

    /// Read a record, bumping its access-time to `now_ms + `
    /// [`GET_ACCESS_TIME_OFFSET_MS`].
    pub fn get(&mut self, id: &str, now_ms: i64) -> Option<&Record> {
        if self.records.contains_key(id) {
            self.access_times.insert(id.to_string(), now_ms + GET_ACCESS_TIME_OFFSET_MS);
        }
        self.records.get(id)
    }

    /// Read without touching the access-time table (used internally by
    /// search and diagnostics, which must not perturb LRU order).
    pub fn peek(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let removed = self.records.remove(id);
        if let Some(record) = &removed {
            self.access_times.remove(id);
            self.dec_workspace(record.workspace_id());
        }
        removed
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.access_times.clear();
        self.workspace_counts.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn access_time(&self, id: &str) -> Option<i64> {
        self.access_times.get(id).copied()
    }

    pub fn access_times(&self) -> &HashMap<String, i64> {
        &self.access_times
    }

    pub fn workspace_count(&self, workspace_id: &str) -> usize {
        self.workspace_counts.get(workspace_id).copied().unwrap_or(0)
    }

    pub fn workspace_counts(&self) -> &HashMap<String, usize> {
        &self.workspace_counts
    }

    pub fn records_in_workspace(&self, workspace_id: &str) -> Vec<&Record> {
        self.records
            .values()
            .filter(|r| r.workspace_id() == workspace_id)
            .collect()
    }

    /// A full clone of the current map, for persistence snapshots and
    /// `deleteBatch`'s all-or-nothing rollback.
    pub fn snapshot(&self) -> HashMap<String, Record> {
        self.records.clone()
    }

    /// Replace the entire map wholesale (used by persistence load and
    /// backup restore). Rebuilds the derived indexes from scratch, with
    /// every record's access-time set to `now_ms` (the load time).
    pub fn replace_all(&mut self, records: HashMap<String, Record>, now_ms: i64) {
        self.clear();
        for (id, record) in records {
            let workspace = record.workspace_id().to_string();
            *self.workspace_counts.entry(workspace).or_insert(0) += 1;
            self.access_times.insert(id.clone(), now_ms);
            self.records.insert(id, record);
        }
    }

    fn dec_workspace(&mut self, workspace_id: &str) {
        if let Some(count) = self.workspace_counts.get_mut(workspace_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.workspace_counts.remove(workspace_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{reserved, Metadata, MetadataValue};

    fn rec(id: &str, workspace: Option<&str>) -> Record {
        let mut meta = Metadata::new();
        if let Some(w) = workspace {
            meta.insert(reserved::WORKSPACE_ID.to_string(), MetadataValue::from(w));
        }
        Record::new(id.to_string(), vec![1.0], meta)
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let mut store = RecordStore::new();
        store.insert(rec("vec_1_aaaaaaaaa", None), 1000);
        assert_eq!(store.len(), 1);
        assert!(store.get("vec_1_aaaaaaaaa", 2000).is_some());
    }

    #[test]
    fn get_bumps_access_time_past_creation() {
        let mut store = RecordStore::new();
        store.insert(rec("vec_1_aaaaaaaaa", None), 1000);
        store.get("vec_1_aaaaaaaaa", 1000);
        let at = store.access_time("vec_1_aaaaaaaaa").unwrap();
        assert!(at > 1000);
    }

    #[test]
    fn workspace_counts_track_inserts_and_removes() {
        let mut store = RecordStore::new();
        store.insert(rec("vec_1_aaaaaaaaa", Some("ws1")), 0);
        store.insert(rec("vec_1_bbbbbbbbb", Some("ws1")), 0);
        assert_eq!(store.workspace_count("ws1"), 2);
        store.remove("vec_1_aaaaaaaaa");
        assert_eq!(store.workspace_count("ws1"), 1);
    }

    #[test]
    fn sum_of_workspace_counts_equals_store_len() {
        let mut store = RecordStore::new();
        store.insert(rec("vec_1_aaaaaaaaa", Some("ws1")), 0);
        store.insert(rec("vec_1_bbbbbbbbb", Some("ws2")), 0);
        store.insert(rec("vec_1_ccccccccc", None), 0);
        let sum: usize = store.workspace_counts().values().sum();
        assert_eq!(sum, store.len());
    }

    #[test]
    fn clear_resets_everything() {
        let mut store = RecordStore::new();
        store.insert(rec("vec_1_aaaaaaaaa", Some("ws1")), 0);
        store.clear();
        assert_eq!(store.len(), 0);
        assert_eq!(store.workspace_count("ws1"), 0);
    }
}
