//! In-process link cache

use super::traits::{CacheResult, LinkCache, LinkCacheEntry};
use dashmap::DashMap;

/// Concurrent in-memory link cache. Nothing survives the process.
#[derive(Debug, Default)]
pub struct InMemoryLinkCache {
    entries: DashMap<String, LinkCacheEntry>,
}

impl InMemoryLinkCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LinkCache for InMemoryLinkCache {
    fn get(&self, term: &str) -> CacheResult<Option<LinkCacheEntry>> {
        Ok(self.entries.get(term).map(|e| e.value().clone()))
    }

    fn put(&self, entry: &LinkCacheEntry) -> CacheResult<()> {
        self.entries.insert(entry.term.clone(), entry.clone());
        Ok(())
    }

    fn invalidate(&self, term: &str) -> CacheResult<bool> {
        Ok(self.entries.remove(term).is_some())
    }

    fn clear(&self) -> CacheResult<usize> {
        let n = self.entries.len();
        self.entries.clear();
        Ok(n)
    }

    fn terms(&self) -> CacheResult<Vec<String>> {
        let mut terms: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        terms.sort();
        Ok(terms)
    }

    fn len(&self) -> CacheResult<usize> {
        Ok(self.entries.len())
    }

    fn contains(&self, term: &str) -> CacheResult<bool> {
        Ok(self.entries.contains_key(term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Link;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_roundtrip_and_invalidate() {
        let cache = InMemoryLinkCache::new();
        let entry = LinkCacheEntry::new("web", vec![Link::new("web", 1.0)]);
        cache.put(&entry).unwrap();
        assert_eq!(cache.get("web").unwrap(), Some(entry));
        assert!(cache.invalidate("web").unwrap());
        assert_eq!(cache.get("web").unwrap(), None);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_terms() {
        let cache = Arc::new(InMemoryLinkCache::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..50 {
                        cache
                            .put(&LinkCacheEntry::empty(format!("term_{}_{}", t, i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len().unwrap(), 200);
        let terms = cache.terms().unwrap();
        assert!(terms.windows(2).all(|w| w[0] < w[1]));
    }
}
