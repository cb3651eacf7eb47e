use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use tantivy::query::{Query, QueryClone};

/// Built queries keyed by request fingerprint, evicting the least recently
/// used entry once `capacity` is reached. A capacity of 0 disables caching.
pub struct QueryCache {
    memory: Option<Mutex<LruCache<String, Box<dyn Query>>>>,
}

impl QueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            memory: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<Box<dyn Query>> {
        let memory = self.memory.as_ref()?;
        lock(memory).get(fingerprint).map(|query| query.box_clone())
    }

    pub fn insert(&self, fingerprint: String, query: &dyn Query) {
        if let Some(memory) = &self.memory {
            lock(memory).put(fingerprint, query.box_clone());
        }
    }

    pub fn len(&self) -> usize {
        self.memory.as_ref().map_or(0, |memory| lock(memory).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::query::AllQuery;

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = QueryCache::new(2);
        cache.insert("a".to_string(), &AllQuery);
        cache.insert("b".to_string(), &AllQuery);
        assert!(cache.get("a").is_some());
        cache.insert("c".to_string(), &AllQuery);

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = QueryCache::new(0);
        cache.insert("a".to_string(), &AllQuery);
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }
}
