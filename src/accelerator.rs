//! Accelerator Shim: the optional ANN index that shadows the Primary
//! Store. The crate ships only the seam — no concrete ANN
//! implementation; hosts bring their own.
use crate::record::{Metadata, Record};
use async_trait::async_trait;

/// A document mirrored into the accelerator on insert.
#[derive(Debug, Clone)]
pub struct AcceleratorDocument {
    pub id: String,
    pub vector: Vec<f64>,
    pub metadata: Metadata,
}

impl From<&Record> for AcceleratorDocument {
    fn from(r: &Record) -> Self {
        Self {
            id: r.id.clone(),
            vector: r.vector.clone(),
            metadata: r.metadata.clone(),
        }
    }
}

/// A single accelerator search hit.
#[derive(Debug, Clone)]
pub struct AcceleratorHit {
    pub document: AcceleratorDocument,
    pub score: f64,
}

/// Options passed to the accelerator's own `search`.
#[derive(Debug, Clone, Default)]
pub struct AcceleratorSearchOptions {
    pub limit: usize,
    pub threshold: Option<f64>,
    /// Pre-serialized filter, in whatever shape the accelerator expects.
    /// The core does not interpret this — the accelerator's own filter
    /// semantics must remain equivalent to the Filter Evaluator's.
    pub filter: Option<serde_json::Value>,
}

/// Capability trait for an optional ANN accelerator.
#[async_trait]
pub trait ScalableIndex: Send + Sync {
    async fn add(&self, doc: AcceleratorDocument) -> Result<(), String>;
    async fn add_batch(&self, docs: Vec<AcceleratorDocument>) -> Result<(), String> {
        for doc in docs {
            self.add(doc).await?;
        }
        Ok(())
    }
    async fn remove(&self, id: &str) -> Result<(), String>;
    async fn clear(&self) -> Result<(), String>;
    async fn search(&self, query: &[f64], opts: AcceleratorSearchOptions) -> Result<Vec<AcceleratorHit>, String>;
}

/// Thin wrapper owning the optional accelerator and keeping it mirrored
/// on every Primary Store mutation.
pub struct AcceleratorShim {
    index: Option<std::sync::Arc<dyn ScalableIndex>>,
}

impl AcceleratorShim {
    pub fn new(index: Option<std::sync::Arc<dyn ScalableIndex>>) -> Self {
        Self { index }
    }

    pub fn is_present(&self) -> bool {
        self.index.is_some()
    }

    pub fn handle(&self) -> Option<&std::sync::Arc<dyn ScalableIndex>> {
        self.index.as_ref()
    }

    pub async fn on_insert(&self, record: &Record) {
        if let Some(index) = &self.index {
            if let Err(e) = index.add(AcceleratorDocument::from(record)).await {
                tracing::warn!(id = %record.id, error = %e, "accelerator add failed");
            }
        }
    }

    pub async fn on_insert_batch(&self, records: &[Record]) {
        if let Some(index) = &self.index {
            let docs: Vec<_> = records.iter().map(AcceleratorDocument::from).collect();
            if let Err(e) = index.add_batch(docs).await {
                tracing::warn!(error = %e, "accelerator batch add failed");
            }
        }
    }

    pub async fn on_delete(&self, id: &str) {
        if let Some(index) = &self.index {
            if let Err(e) = index.remove(id).await {
                tracing::warn!(%id, error = %e, "accelerator remove failed");
            }
        }
    }

    pub async fn on_clear(&self) {
        if let Some(index) = &self.index {
            if let Err(e) = index.clear().await {
                tracing::warn!(error = %e, "accelerator clear failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingIndex {
        adds: AtomicUsize,
        removes: AtomicUsize,
    }

    #[async_trait]
    impl ScalableIndex for CountingIndex {
        async fn add(&self, _doc: AcceleratorDocument) -> Result<(), String> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove(&self, _id: &str) -> Result<(), String> {
            self.removes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn clear(&self) -> Result<(), String> {
            Ok(())
        }
        async fn search(&self, _query: &[f64], _opts: AcceleratorSearchOptions) -> Result<Vec<AcceleratorHit>, String> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn mirrors_insert_and_delete() {
        let index = Arc::new(CountingIndex { adds: AtomicUsize::new(0), removes: AtomicUsize::new(0) });
        let shim = AcceleratorShim::new(Some(index.clone()));
        let record = Record::new("vec_1_aaaaaaaaa".to_string(), vec![1.0], Metadata::new());
        shim.on_insert(&record).await;
        shim.on_delete(&record.id).await;
        assert_eq!(index.adds.load(Ordering::SeqCst), 1);
        assert_eq!(index.removes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_accelerator_is_a_no_op() {
        let shim = AcceleratorShim::new(None);
        assert!(!shim.is_present());
        let record = Record::new("vec_1_aaaaaaaaa".to_string(), vec![1.0], Metadata::new());
        shim.on_insert(&record).await; // must not panic
    }
}
