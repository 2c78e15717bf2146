//! Error types for vectorstore operations.
//!
//! All fallible operations return [`VectorStoreError`], a single flat
//! enum covering validation, capacity, memory, persistence, and
//! collaborator-missing failures. There is no panic path outside tests.
use thiserror::Error;

/// A single indexed failure inside a partially-validated batch.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BatchItemError {
    /// Position of the failing item in the input batch.
    pub index: usize,
    /// Human-readable description, e.g. `"Wrong dimension: expected 3, got 4"`.
    pub message: String,
}

impl BatchItemError {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}

/// The unified error type for `vectorstore` operations.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// An API other than `initialize` was called before initialization completed.
    #[error("store has not been initialized; call initialize() first")]
    NotInitialized,

    /// An API was called after `close()`.
    #[error("store is closed")]
    AlreadyClosed,

    /// A vector failed length, NaN, or infinity validation.
    #[error("invalid vector: {reason}")]
    InvalidVector { reason: String },

    /// A query vector's dimension does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The constraint configuration supplied at open time was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The global or per-workspace record count limit was reached without auto-pruning.
    #[error("capacity exceeded: {reason}")]
    CapacityExceeded { reason: String },

    /// The memory cap was (or would be) exceeded and could not be resolved by pruning.
    #[error("memory exceeded: {reason}")]
    MemoryExceeded { reason: String },

    /// `storeText`/`searchText`/`hybridSearch` called with no `EmbeddingProvider` configured.
    #[error("no embedding provider configured")]
    EmbeddingProviderMissing,

    /// The embedding provider returned a vector of the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider failed to generate an embedding.
    #[error("embedding generation failed: {0}")]
    EmbeddingGenerationFailed(String),

    /// `searchWithReranking` called with no `CrossEncoder` configured.
    #[error("no cross encoder configured")]
    CrossEncoderMissing,

    /// The accelerator-delegated search path was invoked with no `ScalableIndex` configured.
    #[error("no accelerator configured")]
    AcceleratorMissing,

    /// The accelerator rejected an operation (add/remove/search).
    #[error("accelerator error: {0}")]
    AcceleratorError(String),

    /// The cross encoder failed to rank the candidate set.
    #[error("reranking failed: {0}")]
    RerankingFailed(String),

    /// Strict batch validation found one or more invalid items; nothing was written.
    #[error("batch validation failed: {} item(s) rejected", .errors.len())]
    BatchValidationFailure { errors: Vec<BatchItemError> },

    /// A persistence read/write failed.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// `createBackup`/`restoreFromBackup` called with no path configured.
    #[error("persistence path required for this operation")]
    PersistenceRequired,

    /// `restoreFromBackup` referenced a backup file that does not exist.
    #[error("backup not found: {0}")]
    BackupNotFound(String),

    /// A loaded snapshot or backup failed structural validation.
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
}

impl From<serde_json::Error> for VectorStoreError {
    fn from(e: serde_json::Error) -> Self {
        VectorStoreError::PersistenceError(format!("serialization error: {e}"))
    }
}

impl From<std::io::Error> for VectorStoreError {
    fn from(e: std::io::Error) -> Self {
        VectorStoreError::PersistenceError(format!("io error: {e}"))
    }
}

/// Result type alias used throughout the crate.
pub type VectorStoreResult<T> = Result<T, VectorStoreError>;
