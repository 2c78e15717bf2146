//! Search pipeline: candidate gathering, scoring, thresholding,
//! ordering, and truncation, plus the text/hybrid/rerank variants
//! layered on top of the base vector search.
use crate::accelerator::{AcceleratorSearchOptions, AcceleratorShim};
use crate::capability::{CrossEncoder, EmbeddingProvider, RerankCandidate};
use crate::error::{VectorStoreError, VectorStoreResult};
use crate::filter::{evaluate, EvalContext, Filter, FilterResultCache, FilterStatsTable};
use crate::kernel::SimilarityMetric;
use crate::record::{Metadata, Record};
use crate::record_store::RecordStore;
use std::sync::Arc;

/// A post-hoc predicate supplied by the caller, applied after the
/// declarative `Filter` and before scoring.
pub type FilterFn = Arc<dyn Fn(&Metadata) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct SearchOptions {
    pub k: usize,
    pub filter: Option<Filter>,
    pub filter_fn: Option<FilterFn>,
    pub threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub vector: Vec<f64>,
    pub metadata: Metadata,
}

/// Gather the candidate record set for a search: a cache hit restricts
/// to the cached id list; otherwise the Filter Evaluator scans the
/// whole store (or the whole store unfiltered, with no filter at all).
pub fn gather_candidates<'a>(
    store: &'a RecordStore,
    filter: Option<&Filter>,
    cached_ids: Option<&[String]>,
    now_ms: i64,
) -> Vec<&'a Record> {
    if let Some(ids) = cached_ids {
        return ids.iter().filter_map(|id| store.peek(id)).collect();
    }
    match filter {
        Some(filter) => store
            .iter()
            .filter(|r| {
                let ctx = EvalContext { now_ms, created_ms: r.id_creation_epoch_ms() };
                evaluate(&filter.node, &r.metadata, ctx)
            })
            .collect(),
        None => store.iter().collect(),
    }
}

/// Score, threshold, sort, and truncate a candidate set. Shared by both
/// the accelerator-backed and in-process search paths.
pub fn score_and_finalize(
    candidates: Vec<&Record>,
    metric: SimilarityMetric,
    query: &[f64],
    opts: &SearchOptions,
) -> VectorStoreResult<Vec<SearchHit>> {
    let mut hits = Vec::with_capacity(candidates.len());
    for record in candidates {
        if let Some(filter_fn) = &opts.filter_fn {
            if !filter_fn(&record.metadata) {
                continue;
            }
        }
        let score = metric.calculate(query, &record.vector)?;
        if let Some(threshold) = opts.threshold {
            let passes = if metric.is_distance() { score <= threshold } else { score >= threshold };
            if !passes {
                continue;
            }
        }
        hits.push(SearchHit {
            id: record.id.clone(),
            score,
            vector: record.vector.clone(),
            metadata: record.metadata.clone(),
        });
    }

    if metric.is_distance() {
        hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap().then_with(|| a.id.cmp(&b.id)));
    } else {
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.id.cmp(&b.id)));
    }
    hits.truncate(opts.k);
    Ok(hits)
}

/// The full in-process search path: gather, score, optionally cache the
/// filter's matching id set.
pub struct InProcessSearch<'a> {
    pub store: &'a RecordStore,
    pub metric: SimilarityMetric,
    pub cache: &'a mut FilterResultCache,
    pub stats: Option<&'a mut FilterStatsTable>,
    pub enable_cache: bool,
    pub track_stats: bool,
    pub now_ms: i64,
}

pub fn search_in_process(
    mut ctx: InProcessSearch<'_>,
    query: &[f64],
    opts: &SearchOptions,
) -> VectorStoreResult<Vec<SearchHit>> {
    let mut used_cache_hit = false;
    let cached_ids: Option<Vec<String>> = match &opts.filter {
        Some(filter) if ctx.enable_cache => {
            if let Some(stats) = ctx.stats.as_deref_mut() {
                if ctx.track_stats {
                    stats.record(filter.cache_key(), &filter.fields(), filter.complexity());
                }
            }
            match ctx.cache.get(filter.cache_key()) {
                Some(ids) => {
                    used_cache_hit = true;
                    Some(ids)
                }
                None => None,
            }
        }
        Some(filter) => {
            if let Some(stats) = ctx.stats.as_deref_mut() {
                if ctx.track_stats {
                    stats.record(filter.cache_key(), &filter.fields(), filter.complexity());
                }
            }
            None
        }
        None => None,
    };

    let candidates = gather_candidates(ctx.store, opts.filter.as_ref(), cached_ids.as_deref(), ctx.now_ms);

    if let Some(filter) = &opts.filter {
        if ctx.enable_cache && !used_cache_hit {
            let ids: Vec<String> = candidates.iter().map(|r| r.id.clone()).collect();
            ctx.cache.set(filter.cache_key().to_string(), ids);
        }
    }

    score_and_finalize(candidates, ctx.metric, query, opts)
}

/// The accelerator-present search path: delegate to the accelerator,
/// apply the caller's `filterFn` post-hoc, truncate.
pub async fn search_via_accelerator(
    shim: &AcceleratorShim,
    query: &[f64],
    opts: &SearchOptions,
) -> VectorStoreResult<Vec<SearchHit>> {
    let Some(index) = shim.handle() else {
        return Err(VectorStoreError::AcceleratorMissing);
    };
    let filter_json = opts.filter.as_ref().map(|f| f.raw_json().clone());
    let accel_opts = AcceleratorSearchOptions {
        limit: opts.k,
        threshold: opts.threshold,
        filter: filter_json,
    };
    let hits = index
        .search(query, accel_opts)
        .await
        .map_err(VectorStoreError::AcceleratorError)?;

    let mut out: Vec<SearchHit> = hits
        .into_iter()
        .filter(|h| opts.filter_fn.as_ref().map(|f| f(&h.document.metadata)).unwrap_or(true))
        .map(|h| SearchHit {
            id: h.document.id,
            score: h.score,
            vector: h.document.vector,
            metadata: h.document.metadata,
        })
        .collect();
    out.truncate(opts.k);
    Ok(out)
}

/// `searchText`: resolve text to a vector via an `EmbeddingProvider`,
/// then delegate to the base in-process/accelerator search.
pub async fn embed_query(
    provider: &dyn EmbeddingProvider,
    text: &str,
    expected_dim: usize,
) -> VectorStoreResult<Vec<f64>> {
    let vector = provider
        .generate(text)
        .await
        .map_err(VectorStoreError::EmbeddingGenerationFailed)?;
    if vector.len() != expected_dim {
        return Err(VectorStoreError::EmbeddingDimensionMismatch {
            expected: expected_dim,
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Hybrid score combining vector similarity and filter-match weight.
pub fn hybrid_score(base_score: f64, matched_filter: bool, weight_vector: f64, weight_metadata: f64) -> f64 {
    base_score * weight_vector + if matched_filter { 1.0 } else { 0.0 } * weight_metadata
}

/// Re-sort a base result set by hybrid score, descending, then truncate.
pub fn apply_hybrid_ranking(
    mut hits: Vec<SearchHit>,
    has_filter: bool,
    weight_vector: f64,
    weight_metadata: f64,
    k: usize,
) -> Vec<(SearchHit, f64)> {
    let mut scored: Vec<(SearchHit, f64)> = hits
        .drain(..)
        .map(|h| {
            let hs = hybrid_score(h.score, has_filter, weight_vector, weight_metadata);
            (h, hs)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.id.cmp(&b.0.id)));
    scored.truncate(k);
    scored
}

/// Rerank a base result set with a `CrossEncoder`, reordering by the
/// encoder's returned ranks.
pub async fn apply_reranking(
    encoder: &dyn CrossEncoder,
    query: &str,
    hits: Vec<SearchHit>,
    k: usize,
) -> VectorStoreResult<Vec<SearchHit>> {
    let candidates: Vec<RerankCandidate> = hits
        .iter()
        .enumerate()
        .map(|(i, h)| RerankCandidate {
            text: h
                .metadata
                .get(crate::record::reserved::TEXT)
                .and_then(|v| v.as_scalar())
                .map(|s| s.to_string())
                .unwrap_or_default(),
            index: i,
        })
        .collect();

    let mut scores = encoder
        .rank(query, &candidates)
        .await
        .map_err(VectorStoreError::RerankingFailed)?;
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.index.cmp(&b.index)));

    let mut out = Vec::with_capacity(k.min(scores.len()));
    for s in scores.into_iter().take(k) {
        if let Some(hit) = hits.get(s.index) {
            out.push(hit.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterResultCache;
    use crate::record::Metadata;

    fn store_with(records: Vec<Record>) -> RecordStore {
        let mut store = RecordStore::new();
        for r in records {
            store.insert(r, 0);
        }
        store
    }

    #[test]
    fn scores_sorted_descending_for_cosine() {
        let store = store_with(vec![
            Record::new("vec_1_aaaaaaaaa".into(), vec![1.0, 0.0, 0.0], Metadata::new()),
            Record::new("vec_1_bbbbbbbbb".into(), vec![0.0, 1.0, 0.0], Metadata::new()),
            Record::new("vec_1_ccccccccc".into(), vec![0.9, 0.1, 0.0], Metadata::new()),
        ]);
        let candidates: Vec<&Record> = store.iter().collect();
        let opts = SearchOptions { k: 2, ..Default::default() };
        let hits = score_and_finalize(candidates, SimilarityMetric::Cosine, &[1.0, 0.0, 0.0], &opts).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "vec_1_aaaaaaaaa");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn threshold_filters_similarity_below_cutoff() {
        let store = store_with(vec![
            Record::new("vec_1_aaaaaaaaa".into(), vec![1.0, 0.0], Metadata::new()),
            Record::new("vec_1_bbbbbbbbb".into(), vec![0.0, 1.0], Metadata::new()),
        ]);
        let candidates: Vec<&Record> = store.iter().collect();
        let opts = SearchOptions { k: 10, threshold: Some(0.5), ..Default::default() };
        let hits = score_and_finalize(candidates, SimilarityMetric::Cosine, &[1.0, 0.0], &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "vec_1_aaaaaaaaa");
    }

    #[test]
    fn cache_populated_on_miss_and_used_on_hit() {
        let store = store_with(vec![Record::new(
            "vec_1_aaaaaaaaa".into(),
            vec![1.0],
            {
                let mut m = Metadata::new();
                m.insert("sessionId".to_string(), "s1".into());
                m
            },
        )]);
        let mut cache = FilterResultCache::new(10);
        let filter = Filter::parse(&serde_json::json!({"sessionId": "s1"}));
        let opts = SearchOptions { k: 10, filter: Some(filter), ..Default::default() };

        let ctx = InProcessSearch {
            store: &store,
            metric: SimilarityMetric::Cosine,
            cache: &mut cache,
            stats: None,
            enable_cache: true,
            track_stats: false,
            now_ms: 0,
        };
        let hits = search_in_process(ctx, &[1.0], &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(cache.stats().misses, 1);

        let ctx2 = InProcessSearch {
            store: &store,
            metric: SimilarityMetric::Cosine,
            cache: &mut cache,
            stats: None,
            enable_cache: true,
            track_stats: false,
            now_ms: 0,
        };
        let hits2 = search_in_process(ctx2, &[1.0], &opts).unwrap();
        assert_eq!(hits2.len(), 1);
        assert_eq!(cache.stats().hits, 1);
    }
}
