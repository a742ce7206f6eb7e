//! Compiled expression cache

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::env::Env;
use crate::error::Result;
use crate::program::Expr;

/// Statistics about cache performance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,
    /// Number of cache misses
    pub misses: usize,
    /// Total number of entries in cache
    pub entries: usize,
}

impl CacheStats {
    /// Calculates the cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe cache of expressions compiled against one environment
///
/// Entries are keyed by source text. Failed compilations are not cached,
/// so a bad expression is re-checked (and re-reported) on every request.
pub struct ExprCache {
    env: Env,
    /// Compiled expressions (thread-safe)
    entries: DashMap<String, Arc<Expr>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ExprCache {
    pub fn new(env: Env) -> Self {
        Self {
            env,
            entries: DashMap::new(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Return the cached expression for `source`, compiling it on a miss
    ///
    /// # Errors
    /// Returns the compilation error when `source` does not compile
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<Expr>> {
        if let Some(expr) = self.entries.get(source) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(expr.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Expression cache miss: '{}'", source);

        let expr = Arc::new(self.env.compile(source)?);
        let entry = self
            .entries
            .entry(source.to_string())
            .or_insert_with(|| expr.clone());
        Ok(entry.clone())
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Drop every cached expression and reset statistics
    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::decls::variable;
    use crate::types::Type;
    use serde_json::json;
    use std::thread;

    fn cache() -> ExprCache {
        ExprCache::new(Env::new([variable("v", Type::Int)]).unwrap())
    }

    #[test]
    fn test_cache_creation() {
        let cache = cache();
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.stats().hit_rate(), 0.0);
    }

    #[test]
    fn test_hits_and_misses() {
        let cache = cache();
        let first = cache.get_or_compile("v + 1").unwrap();
        let second = cache.get_or_compile("v + 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.get_or_compile("v * 2").unwrap();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 2);
        assert!((stats.hit_rate() - 1.0 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = cache();
        assert!(cache.get_or_compile("w + 1").is_err());
        assert!(cache.get_or_compile("w + 1").is_err());
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_clear() {
        let cache = cache();
        cache.get_or_compile("v").unwrap();
        cache.clear();
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(cache());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let expr = cache.get_or_compile("v + 1").unwrap();
                    let input = Activation::new().bind("v", &i).unwrap();
                    expr.eval(&input).unwrap()
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), json!(i as i64 + 1));
        }
        assert_eq!(cache.stats().entries, 1);
    }
}
