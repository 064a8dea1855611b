use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use lru::LruCache;
use parking_lot::Mutex;
use crate::core::error::{Error, Result};
use crate::core::types::ObjectId;
use crate::index::document::Entity;

/// Primary store the index is derived from
pub trait EntitySource<V: Entity>: Send + Sync {
    /// `None` once the entity no longer exists
    fn get(&self, key: &V::Key) -> Result<Option<V>>;

    /// Every key currently in the store
    fn keys(&self) -> Result<Vec<V::Key>>;
}

/// Live ref heads of the repositories entities are stored in
pub trait RefDatabase: Send + Sync {
    fn head(&self, project: &str, ref_name: &str) -> Result<Option<ObjectId>>;

    fn refs_by_prefix(&self, project: &str, prefix: &str) -> Result<Vec<(String, ObjectId)>>;
}

/// Cache in front of the entity source, evicted before every reindex
pub trait EntityCache<K>: Send + Sync {
    fn evict(&self, key: &K);
}

pub struct NoCache;

impl<K> EntityCache<K> for NoCache {
    fn evict(&self, _key: &K) {}
}

/// Read-through LRU over an entity source
pub struct LruEntityCache<V: Entity> {
    pub source: Arc<dyn EntitySource<V>>,
    pub cache: Mutex<LruCache<V::Key, V>>,
    pub capacity: usize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

impl<V: Entity> LruEntityCache<V> {
    pub fn new(source: Arc<dyn EntitySource<V>>, capacity: usize) -> Result<Self> {
        let cap = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::configuration("entity cache capacity must be positive"))?;
        Ok(LruEntityCache {
            source,
            cache: Mutex::new(LruCache::new(cap)),
            capacity,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
            capacity: self.capacity,
        }
    }
}

impl<V: Entity> EntitySource<V> for LruEntityCache<V> {
    fn get(&self, key: &V::Key) -> Result<Option<V>> {
        if let Some(entity) = self.cache.lock().get(key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(entity.clone()));
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        // Loaded outside the lock; a racing load of the same key is harmless.
        let loaded = self.source.get(key)?;
        if let Some(entity) = &loaded {
            self.cache.lock().put(key.clone(), entity.clone());
        }
        Ok(loaded)
    }

    fn keys(&self) -> Result<Vec<V::Key>> {
        self.source.keys()
    }
}

impl<V: Entity> EntityCache<V::Key> for LruEntityCache<V> {
    fn evict(&self, key: &V::Key) {
        self.cache.lock().pop(key);
    }
}
