//! Filter Result Cache: a bounded LRU mapping canonical-filter-key →
//! matching id list, invalidated in full on every store mutation.
use lru::LruCache;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 1000;

/// Hit/miss counters exposed via `getFilterCacheStats`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct FilterCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

impl FilterCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded LRU of filter-shape → matching id list.
pub struct FilterResultCache {
    cache: LruCache<String, Vec<String>>,
    hits: u64,
    misses: u64,
}

impl FilterResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Look up cached ids for a filter key. Counts a hit or miss.
    pub fn get(&mut self, key: &str) -> Option<Vec<String>> {
        let found = self.cache.get(key).cloned();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    /// Cache the id list matching `key`, evicting the least-recently-used
    /// entry if the cache is full.
    pub fn set(&mut self, key: String, ids: Vec<String>) {
        self.cache.put(key, ids);
    }

    /// Clear the cache in full. Called on every mutating store operation.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> FilterCacheStats {
        FilterCacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.cache.len(),
            capacity: self.cache.cap().get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let mut cache = FilterResultCache::new(2);
        assert!(cache.get("k1").is_none());
        cache.set("k1".to_string(), vec!["a".to_string()]);
        assert_eq!(cache.get("k1"), Some(vec!["a".to_string()]));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let mut cache = FilterResultCache::new(1);
        cache.set("k1".to_string(), vec!["a".to_string()]);
        cache.set("k2".to_string(), vec!["b".to_string()]);
        assert!(cache.get("k1").is_none());
        assert_eq!(cache.get("k2"), Some(vec!["b".to_string()]));
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = FilterResultCache::new(4);
        cache.set("k1".to_string(), vec!["a".to_string()]);
        cache.clear();
        assert!(cache.is_empty());
    }
}
