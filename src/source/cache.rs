//! In-memory store for rendered documents
//!
//! Every tool output lands here under a fresh key so later calls can chain
//! on it (`{"cache_key": "..."}`) without re-sending the bytes.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

struct CacheInner {
    lru: LruCache<String, Arc<[u8]>>,
    total_bytes: usize,
}

/// LRU document store bounded by entry count and total bytes
pub struct OutputCache {
    inner: Mutex<CacheInner>,
    max_bytes: usize,
}

impl OutputCache {
    /// Create a cache holding at most `capacity` entries and `max_bytes` bytes
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store a document under `key`.
    ///
    /// Returns false if the document alone exceeds the byte budget; it is not
    /// stored in that case. Least recently used entries are evicted to make
    /// room.
    pub fn put(&self, key: String, data: impl Into<Arc<[u8]>>) -> bool {
        let data = data.into();
        let new_size = data.len();
        if new_size > self.max_bytes {
            tracing::debug!(size = new_size, max = self.max_bytes, "document too large to cache");
            return false;
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.len());
        }

        while inner.total_bytes + new_size > self.max_bytes {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len());
                }
                None => break,
            }
        }

        // Entry-count eviction is reported by push
        if let Some((evicted_key, evicted)) = inner.lru.push(key.clone(), data) {
            if evicted_key != key {
                inner.total_bytes = inner.total_bytes.saturating_sub(evicted.len());
            }
        }
        inner.total_bytes += new_size;
        true
    }

    /// Store a document under a new unique key and return the key
    pub fn insert(&self, data: impl Into<Arc<[u8]>>) -> Option<String> {
        let key = self.generate_unique_key();
        self.put(key.clone(), data).then_some(key)
    }

    /// Get a document; shares the stored bytes
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        self.inner.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<[u8]>> {
        let mut inner = self.inner.lock();
        let val = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(val.len());
        Some(val)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Total bytes currently stored
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Generate a key that does not collide with any stored key
    pub fn generate_unique_key(&self) -> String {
        let inner = self.inner.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !inner.lru.contains(&key) {
                return key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_basic_operations() {
        let cache = OutputCache::new(10, 1024 * 1024);
        assert!(cache.is_empty());

        assert!(cache.put("key1".to_string(), vec![1, 2, 3]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 3);
        assert_eq!(&*cache.get("key1").unwrap(), &[1, 2, 3]);
        assert!(cache.contains("key1"));
        assert!(!cache.contains("key2"));
    }

    #[test]
    fn test_insert_generates_key() {
        let cache = OutputCache::new(10, 1024);
        let key = cache.insert(vec![7u8; 10]).unwrap();
        assert_eq!(key.len(), 36);
        assert_eq!(cache.get(&key).unwrap().len(), 10);
    }

    #[test]
    fn test_entry_count_eviction_tracks_bytes() {
        let cache = OutputCache::new(2, 1024 * 1024);
        cache.put("key1".to_string(), vec![1; 5]);
        cache.put("key2".to_string(), vec![2; 5]);
        cache.put("key3".to_string(), vec![3; 5]);

        assert!(!cache.contains("key1"));
        assert!(cache.contains("key2"));
        assert!(cache.contains("key3"));
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn test_byte_budget_eviction() {
        let cache = OutputCache::new(10, 100);
        cache.put("key1".to_string(), vec![0u8; 30]);
        cache.put("key2".to_string(), vec![0u8; 30]);
        cache.put("key3".to_string(), vec![0u8; 30]);
        assert_eq!(cache.total_bytes(), 90);

        cache.put("key4".to_string(), vec![0u8; 30]);
        assert!(!cache.contains("key1"));
        assert!(cache.contains("key4"));
        assert_eq!(cache.total_bytes(), 90);
    }

    #[test]
    fn test_oversized_entry_rejected() {
        let cache = OutputCache::new(10, 50);
        assert!(!cache.put("huge".to_string(), vec![0u8; 100]));
        assert!(cache.insert(vec![0u8; 100]).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_update_adjusts_bytes() {
        let cache = OutputCache::new(10, 1024);
        cache.put("key1".to_string(), vec![0u8; 50]);
        cache.put("key1".to_string(), vec![0u8; 30]);
        assert_eq!(cache.total_bytes(), 30);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = OutputCache::new(10, 1024);
        cache.put("a".to_string(), vec![1, 2, 3]);
        cache.put("b".to_string(), vec![4]);

        assert_eq!(cache.remove("a").unwrap().len(), 3);
        assert_eq!(cache.total_bytes(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
