//! The `Record` type: the unit of storage, plus the metadata scalar model
//! and id generation.
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved metadata field names with first-class meaning to the store.
pub mod reserved {
    pub const WORKSPACE_ID: &str = "workspaceId";
    pub const TIMESTAMP: &str = "timestamp";
    pub const IMPORTANCE: &str = "importance";
    pub const PINNED: &str = "pinned";
    pub const TEXT: &str = "text";
    pub const EMBEDDING_MODEL: &str = "embeddingModel";
}

/// A metadata scalar: string, number, boolean, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{s}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}
impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}
impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}
impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

/// A metadata value: a single scalar or an ordered list of scalars.
///
/// Lists participate in equality/membership predicates as "any element
/// matches".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl MetadataValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            MetadataValue::Scalar(s) => Some(s),
            MetadataValue::List(_) => None,
        }
    }

    /// Numeric coercion: scalar numbers only; non-numeric fails numeric predicates.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Scalar(s) => s.as_f64(),
            MetadataValue::List(_) => None,
        }
    }

    /// Whether this value equals `other` under the list-is-any-element rule.
    pub fn matches_scalar(&self, other: &Scalar) -> bool {
        match self {
            MetadataValue::Scalar(s) => s == other,
            MetadataValue::List(items) => items.iter().any(|i| i == other),
        }
    }

    /// Whether this value intersects a set of candidate scalars ($in/$nin).
    pub fn intersects(&self, candidates: &[Scalar]) -> bool {
        match self {
            MetadataValue::Scalar(s) => candidates.contains(s),
            MetadataValue::List(items) => items.iter().any(|i| candidates.contains(i)),
        }
    }
}

impl From<Scalar> for MetadataValue {
    fn from(s: Scalar) -> Self {
        MetadataValue::Scalar(s)
    }
}
impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Scalar(Scalar::from(s))
    }
}
impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Scalar(Scalar::from(n))
    }
}
impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Scalar(Scalar::from(b))
    }
}

/// Metadata attached to a record: an ordered map from field name to value.
///
/// `BTreeMap` gives a stable iteration order, which the filter cache relies
/// on when canonicalizing filter/record shapes for diagnostics.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// The unit of storage: an id, a fixed-length vector, and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub vector: Vec<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    pub fn new(id: String, vector: Vec<f64>, metadata: Metadata) -> Self {
        Self {
            id,
            vector,
            metadata,
        }
    }

    /// The record's workspace, defaulting to `"default"`.
    pub fn workspace_id(&self) -> &str {
        match self.metadata.get(reserved::WORKSPACE_ID).and_then(|v| v.as_scalar()) {
            Some(Scalar::String(s)) => s.as_str(),
            _ => "default",
        }
    }

    /// `metadata.timestamp`, if present and numeric.
    pub fn timestamp(&self) -> Option<f64> {
        self.metadata.get(reserved::TIMESTAMP).and_then(|v| v.as_f64())
    }

    /// `metadata.pinned`, defaulting to `false`.
    pub fn pinned(&self) -> bool {
        matches!(
            self.metadata.get(reserved::PINNED).and_then(|v| v.as_scalar()),
            Some(Scalar::Bool(true))
        )
    }

    /// A priority field value coerced to a number, defaulting to `0.0` when
    /// missing or non-numeric. Used by the priority pruning strategy.
    pub fn priority(&self, field: &str) -> f64 {
        self.metadata.get(field).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    /// Creation epoch-ms embedded in the id (`vec_<epoch-ms>_<entropy>`),
    /// used by FIFO pruning when `metadata.timestamp` is absent.
    pub fn id_creation_epoch_ms(&self) -> Option<i64> {
        id_creation_epoch_ms(&self.id)
    }
}

/// Extract the creation epoch-ms embedded in a `vec_<epoch-ms>_<entropy>` id.
pub fn id_creation_epoch_ms(id: &str) -> Option<i64> {
    let mut parts = id.splitn(3, '_');
    let prefix = parts.next()?;
    if prefix != "vec" {
        return None;
    }
    parts.next()?.parse::<i64>().ok()
}

const ENTROPY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate an id in the format `vec_<creation-epoch-ms>_<9-char base36 entropy>`.
/// `now_ms` is supplied by the caller so the generator stays pure and
/// testable.
pub fn generate_id(now_ms: i64) -> String {
    let mut rng = rand::thread_rng();
    let entropy: String = (0..9)
        .map(|_| {
            let idx = rng.gen_range(0..ENTROPY_ALPHABET.len());
            ENTROPY_ALPHABET[idx] as char
        })
        .collect();
    format!("vec_{now_ms}_{entropy}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_format_matches_pattern() {
        let id = generate_id(1_700_000_000_000);
        let re = regex::Regex::new(r"^vec_\d+_[a-z0-9]{9}$").unwrap();
        assert!(re.is_match(&id), "id {id} does not match expected pattern");
    }

    #[test]
    fn id_creation_epoch_roundtrips() {
        let id = generate_id(42);
        assert_eq!(id_creation_epoch_ms(&id), Some(42));
    }

    #[test]
    fn ids_are_unique_across_many_generations() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            let id = generate_id(1);
            assert!(seen.insert(id), "id collision detected");
        }
    }

    #[test]
    fn metadata_list_equality_is_any_element() {
        let v = MetadataValue::List(vec![Scalar::from("a"), Scalar::from("b")]);
        assert!(v.matches_scalar(&Scalar::from("b")));
        assert!(!v.matches_scalar(&Scalar::from("c")));
    }

    #[test]
    fn workspace_defaults_to_default() {
        let r = Record::new("vec_1_abcdefghi".into(), vec![1.0], Metadata::new());
        assert_eq!(r.workspace_id(), "default");
    }
}
