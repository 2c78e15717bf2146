//! The filter tree: parsing from a JSON-ish DSL, and pure evaluation
//! against record metadata.
use crate::record::{Metadata, MetadataValue, Scalar};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Mutex;

/// The only `$computed` formula this evaluator recognizes. Unrecognized
/// formulas silently pass their predicate rather than erroring.
const RECOGNIZED_FORMULA: &str = "(NOW - created) / 60000";

/// A bag of comparison operators applied (AND'd) to a single field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpBag {
    pub eq: Option<Scalar>,
    pub ne: Option<Scalar>,
    pub not: Option<Scalar>,
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
    pub in_: Option<Vec<Scalar>>,
    pub nin: Option<Vec<Scalar>>,
    pub regex: Option<String>,
    pub exists: Option<bool>,
}

/// A node in the filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    /// `field: scalar` shorthand for equality.
    Leaf { field: String, value: Scalar },
    /// `field: { $op: ..., ... }`.
    OpBagNode { field: String, ops: OpBag },
    /// `$and: [filter, ...]`.
    And(Vec<FilterNode>),
    /// `$or: [filter, ...]`.
    Or(Vec<FilterNode>),
    /// `$computed: { field: { $formula, $op... }, ... }`, AND'd across fields.
    Computed(Vec<(String, String, OpBag)>),
    /// An always-matching node (empty filter).
    MatchAll,
    /// Invalid structure: the subtree matches nothing.
    Never,
}

/// A parsed filter plus its canonical cache key.
#[derive(Debug, Clone)]
pub struct Filter {
    pub node: FilterNode,
    key: String,
    raw: JsonValue,
}

impl Filter {
    /// Parse a filter from its JSON representation. Never fails: invalid
    /// shapes become `FilterNode::Never` at the offending subtree.
    pub fn parse(value: &JsonValue) -> Self {
        let node = parse_node(value);
        let key = canonical_key(value);
        Self { node, key, raw: value.clone() }
    }

    /// A filter that matches every record.
    pub fn match_all() -> Self {
        Self {
            node: FilterNode::MatchAll,
            key: "{}".to_string(),
            raw: JsonValue::Object(Default::default()),
        }
    }

    /// The original JSON this filter was parsed from, handed to
    /// collaborators (the Accelerator) that interpret filters themselves
    /// rather than through this evaluator.
    pub fn raw_json(&self) -> &JsonValue {
        &self.raw
    }

    /// The canonical cache key for this filter's shape.
    pub fn cache_key(&self) -> &str {
        &self.key
    }

    /// The approximate structural complexity of the tree (node count),
    /// used by the Filter Stats Table's "average filter complexity" view.
    pub fn complexity(&self) -> usize {
        complexity(&self.node)
    }

    /// Fields referenced anywhere in the tree, for field-frequency stats.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_fields(&self.node, &mut out);
        out
    }
}

fn complexity(node: &FilterNode) -> usize {
    match node {
        FilterNode::Leaf { .. } | FilterNode::OpBagNode { .. } | FilterNode::MatchAll | FilterNode::Never => 1,
        FilterNode::And(children) | FilterNode::Or(children) => {
            1 + children.iter().map(complexity).sum::<usize>()
        }
        FilterNode::Computed(fields) => 1 + fields.len(),
    }
}

fn collect_fields(node: &FilterNode, out: &mut Vec<String>) {
    match node {
        FilterNode::Leaf { field, .. } | FilterNode::OpBagNode { field, .. } => out.push(field.clone()),
        FilterNode::And(children) | FilterNode::Or(children) => {
            for c in children {
                collect_fields(c, out);
            }
        }
        FilterNode::Computed(fields) => {
            for (f, _, _) in fields {
                out.push(f.clone());
            }
        }
        FilterNode::MatchAll | FilterNode::Never => {}
    }
}

fn json_to_scalar(v: &JsonValue) -> Option<Scalar> {
    match v {
        JsonValue::String(s) => Some(Scalar::String(s.clone())),
        JsonValue::Number(n) => n.as_f64().map(Scalar::Number),
        JsonValue::Bool(b) => Some(Scalar::Bool(*b)),
        JsonValue::Null => Some(Scalar::Null),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn json_to_scalar_list(v: &JsonValue) -> Option<Vec<Scalar>> {
    match v {
        JsonValue::Array(items) => items.iter().map(json_to_scalar).collect(),
        _ => None,
    }
}

/// Does an object key look like an operator (`$eq`, `$gt`, ...)?
fn is_operator_bag(obj: &serde_json::Map<String, JsonValue>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$'))
}

fn parse_op_bag(obj: &serde_json::Map<String, JsonValue>) -> OpBag {
    let mut bag = OpBag::default();
    for (k, v) in obj {
        match k.as_str() {
            "$eq" => bag.eq = json_to_scalar(v),
            "$ne" => bag.ne = json_to_scalar(v),
            "$not" => bag.not = json_to_scalar(v),
            "$gt" => bag.gt = v.as_f64(),
            "$gte" => bag.gte = v.as_f64(),
            "$lt" => bag.lt = v.as_f64(),
            "$lte" => bag.lte = v.as_f64(),
            "$in" => bag.in_ = json_to_scalar_list(v),
            "$nin" => bag.nin = json_to_scalar_list(v),
            "$regex" => bag.regex = v.as_str().map(|s| s.to_string()),
            "$exists" => bag.exists = v.as_bool(),
            _ => {} // unknown operator: ignored, not an error
        }
    }
    bag
}

fn parse_node(value: &JsonValue) -> FilterNode {
    let obj = match value {
        JsonValue::Object(obj) => obj,
        _ => return FilterNode::Never,
    };
    if obj.is_empty() {
        return FilterNode::MatchAll;
    }

    if let Some(and_val) = obj.get("$and") {
        return match and_val {
            JsonValue::Array(items) if items.is_empty() => FilterNode::MatchAll,
            JsonValue::Array(items) => FilterNode::And(items.iter().map(parse_node).collect()),
            _ => FilterNode::Never,
        };
    }
    if let Some(or_val) = obj.get("$or") {
        return match or_val {
            JsonValue::Array(items) if items.is_empty() => FilterNode::Never, // empty $or matches none
            JsonValue::Array(items) => FilterNode::Or(items.iter().map(parse_node).collect()),
            _ => FilterNode::Never,
        };
    }
    if let Some(computed_val) = obj.get("$computed") {
        return match computed_val {
            JsonValue::Object(fields) => {
                let mut out = Vec::new();
                for (field, spec) in fields {
                    let JsonValue::Object(spec_obj) = spec else {
                        return FilterNode::Never;
                    };
                    let formula = spec_obj.get("$formula").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    let ops = parse_op_bag(spec_obj);
                    out.push((field.clone(), formula, ops));
                }
                FilterNode::Computed(out)
            }
            _ => FilterNode::Never,
        };
    }

    // Otherwise: implicit AND across all field predicates in this object.
    let mut children = Vec::with_capacity(obj.len());
    for (field, field_value) in obj {
        match field_value {
            JsonValue::Object(inner) if is_operator_bag(inner) => {
                children.push(FilterNode::OpBagNode {
                    field: field.clone(),
                    ops: parse_op_bag(inner),
                });
            }
            JsonValue::Object(_) => {
                // An object without all-$-prefixed keys is not valid leaf shorthand.
                children.push(FilterNode::Never);
            }
            other => match json_to_scalar(other) {
                Some(scalar) => children.push(FilterNode::Leaf {
                    field: field.clone(),
                    value: scalar,
                }),
                None => children.push(FilterNode::Never),
            },
        }
    }
    if children.len() == 1 {
        children.into_iter().next().unwrap()
    } else {
        FilterNode::And(children)
    }
}

/// Canonicalize a JSON value for use as a cache key: object keys sorted,
/// array order preserved. Different key orderings therefore collapse to
/// the same cache key; structurally different filters never collide.
fn canonical_key(value: &JsonValue) -> String {
    fn canonicalize(value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::Object(obj) => {
                let mut sorted: std::collections::BTreeMap<String, JsonValue> = std::collections::BTreeMap::new();
                for (k, v) in obj {
                    sorted.insert(k.clone(), canonicalize(v));
                }
                serde_json::to_value(sorted).unwrap_or(JsonValue::Null)
            }
            JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    canonicalize(value).to_string()
}

/// Context passed into evaluation for `$computed` formulas.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now_ms: i64,
    pub created_ms: Option<i64>,
}

fn eval_op_bag(ops: &OpBag, value: Option<&MetadataValue>) -> bool {
    if let Some(want_exists) = ops.exists {
        if value.is_some() != want_exists {
            return false;
        }
    }
    let Some(value) = value else {
        // Every remaining operator requires the field to be present, except
        // the negations, which are vacuously true against absence.
        return ops.eq.is_none()
            && ops.gt.is_none()
            && ops.gte.is_none()
            && ops.lt.is_none()
            && ops.lte.is_none()
            && ops.in_.is_none()
            && ops.regex.is_none();
    };

    if let Some(eq) = &ops.eq {
        if !value.matches_scalar(eq) {
            return false;
        }
    }
    if let Some(ne) = &ops.ne {
        if value.matches_scalar(ne) {
            return false;
        }
    }
    if let Some(not) = &ops.not {
        if value.matches_scalar(not) {
            return false;
        }
    }
    if let Some(gt) = ops.gt {
        match value.as_f64() {
            Some(n) if n > gt => {}
            _ => return false,
        }
    }
    if let Some(gte) = ops.gte {
        match value.as_f64() {
            Some(n) if n >= gte => {}
            _ => return false,
        }
    }
    if let Some(lt) = ops.lt {
        match value.as_f64() {
            Some(n) if n < lt => {}
            _ => return false,
        }
    }
    if let Some(lte) = ops.lte {
        match value.as_f64() {
            Some(n) if n <= lte => {}
            _ => return false,
        }
    }
    if let Some(candidates) = &ops.in_ {
        if !value.intersects(candidates) {
            return false;
        }
    }
    if let Some(candidates) = &ops.nin {
        if value.intersects(candidates) {
            return false;
        }
    }
    if let Some(pattern) = &ops.regex {
        let is_match = match value.as_scalar() {
            Some(Scalar::String(s)) => regex_cache().is_match(pattern, s),
            _ => false,
        };
        if !is_match {
            return false;
        }
    }
    true
}

fn eval_computed(field: &str, formula: &str, ops: &OpBag, metadata: &Metadata, ctx: EvalContext) -> bool {
    let _ = metadata; // the only recognized formula does not reference stored metadata
    if formula != RECOGNIZED_FORMULA {
        // Unrecognized formula: silently passes.
        return true;
    }
    let Some(created_ms) = ctx.created_ms else {
        return true;
    };
    let minutes_old = (ctx.now_ms - created_ms) as f64 / 60_000.0;
    let synthetic = MetadataValue::Scalar(Scalar::Number(minutes_old));
    let _ = field;
    eval_op_bag(ops, Some(&synthetic))
}

/// Evaluate a parsed filter tree against a record's metadata.
pub fn evaluate(node: &FilterNode, metadata: &Metadata, ctx: EvalContext) -> bool {
    match node {
        FilterNode::MatchAll => true,
        FilterNode::Never => false,
        FilterNode::Leaf { field, value } => metadata
            .get(field)
            .map(|v| v.matches_scalar(value))
            .unwrap_or(false),
        FilterNode::OpBagNode { field, ops } => eval_op_bag(ops, metadata.get(field)),
        FilterNode::And(children) => children.iter().all(|c| evaluate(c, metadata, ctx)),
        FilterNode::Or(children) => children.iter().any(|c| evaluate(c, metadata, ctx)),
        FilterNode::Computed(fields) => fields
            .iter()
            .all(|(field, formula, ops)| eval_computed(field, formula, ops, metadata, ctx)),
    }
}

/// A small bounded cache of compiled regexes, shared process-wide per
/// store instance, evicted LRU-style once it reaches capacity.
struct RegexCache {
    entries: Mutex<(VecDeque<String>, std::collections::HashMap<String, Regex>)>,
    capacity: usize,
}

impl RegexCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new((VecDeque::new(), std::collections::HashMap::new())),
            capacity,
        }
    }

    fn is_match(&self, pattern: &str, text: &str) -> bool {
        let mut guard = self.entries.lock().unwrap();
        if let Some(re) = guard.1.get(pattern) {
            return re.is_match(text);
        }
        let Ok(re) = Regex::new(pattern) else {
            return false;
        };
        let is_match = re.is_match(text);
        let (order, map) = &mut *guard;
        if map.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                map.remove(&oldest);
            }
        }
        order.push_back(pattern.to_string());
        map.insert(pattern.to_string(), re);
        is_match
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: std::sync::OnceLock<RegexCache> = std::sync::OnceLock::new();
    CACHE.get_or_init(|| RegexCache::new(256))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Metadata;

    fn meta(pairs: &[(&str, MetadataValue)]) -> Metadata {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn ctx() -> EvalContext {
        EvalContext { now_ms: 1000, created_ms: Some(0) }
    }

    #[test]
    fn empty_and_matches_all() {
        let f = Filter::parse(&serde_json::json!({"$and": []}));
        assert!(evaluate(&f.node, &Metadata::new(), ctx()));
    }

    #[test]
    fn empty_or_matches_none() {
        let f = Filter::parse(&serde_json::json!({"$or": []}));
        assert!(!evaluate(&f.node, &Metadata::new(), ctx()));
    }

    #[test]
    fn leaf_equality() {
        let f = Filter::parse(&serde_json::json!({"sessionId": "s1"}));
        let m = meta(&[("sessionId", MetadataValue::from("s1"))]);
        assert!(evaluate(&f.node, &m, ctx()));
        let m2 = meta(&[("sessionId", MetadataValue::from("s2"))]);
        assert!(!evaluate(&f.node, &m2, ctx()));
    }

    #[test]
    fn gte_numeric() {
        let f = Filter::parse(&serde_json::json!({"score": {"$gte": 5.0}}));
        let m = meta(&[("score", MetadataValue::from(5.0))]);
        assert!(evaluate(&f.node, &m, ctx()));
        let m2 = meta(&[("score", MetadataValue::from(4.9))]);
        assert!(!evaluate(&f.node, &m2, ctx()));
    }

    #[test]
    fn in_on_list_valued_metadata_is_intersection() {
        let f = Filter::parse(&serde_json::json!({"tags": {"$in": ["a", "b"]}}));
        let m = meta(&[(
            "tags",
            MetadataValue::List(vec![Scalar::from("b"), Scalar::from("c")]),
        )]);
        assert!(evaluate(&f.node, &m, ctx()));
        let m2 = meta(&[(
            "tags",
            MetadataValue::List(vec![Scalar::from("x")]),
        )]);
        assert!(!evaluate(&f.node, &m2, ctx()));
    }

    #[test]
    fn regex_matches_strings_only() {
        let f = Filter::parse(&serde_json::json!({"name": {"$regex": "^a.*"}}));
        let m = meta(&[("name", MetadataValue::from("apple"))]);
        assert!(evaluate(&f.node, &m, ctx()));
        let m2 = meta(&[("name", MetadataValue::from(3.0))]);
        assert!(!evaluate(&f.node, &m2, ctx()));
    }

    #[test]
    fn exists_true_and_false() {
        let f = Filter::parse(&serde_json::json!({"x": {"$exists": true}}));
        let present = meta(&[("x", MetadataValue::from(1.0))]);
        assert!(evaluate(&f.node, &present, ctx()));
        assert!(!evaluate(&f.node, &Metadata::new(), ctx()));

        let f2 = Filter::parse(&serde_json::json!({"x": {"$exists": false}}));
        assert!(evaluate(&f2.node, &Metadata::new(), ctx()));
        assert!(!evaluate(&f2.node, &present, ctx()));
    }

    #[test]
    fn invalid_and_shape_matches_nothing_without_panicking() {
        let f = Filter::parse(&serde_json::json!({"$and": "not-an-array"}));
        assert!(!evaluate(&f.node, &Metadata::new(), ctx()));
    }

    #[test]
    fn unrecognized_computed_formula_passes() {
        let f = Filter::parse(&serde_json::json!({
            "$computed": { "age": { "$formula": "bogus", "$gt": 5 } }
        }));
        assert!(evaluate(&f.node, &Metadata::new(), ctx()));
    }

    #[test]
    fn recognized_computed_formula_computes_age_minutes() {
        let f = Filter::parse(&serde_json::json!({
            "$computed": { "age": { "$formula": "(NOW - created) / 60000", "$gte": 1.0 } }
        }));
        let ctx = EvalContext { now_ms: 120_000, created_ms: Some(0) };
        assert!(evaluate(&f.node, &Metadata::new(), ctx));
    }

    #[test]
    fn cache_key_stable_under_key_reordering() {
        let a = Filter::parse(&serde_json::json!({"a": 1, "b": 2}));
        let b = Filter::parse(&serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn not_shorthand_is_ne() {
        let f = Filter::parse(&serde_json::json!({"x": {"$not": "a"}}));
        let m = meta(&[("x", MetadataValue::from("a"))]);
        assert!(!evaluate(&f.node, &m, ctx()));
        let m2 = meta(&[("x", MetadataValue::from("b"))]);
        assert!(evaluate(&f.node, &m2, ctx()));
    }
}
