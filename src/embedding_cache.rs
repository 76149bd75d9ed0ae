//! Embedding Cache (C1).
//!
//! Deduplicates calls to the embedding provider. Capacity-bounded, TTL-expiring,
//! insertion-order FIFO on eviction (not LRU-on-read). Process-local shared
//! state: a single instance is constructed once at startup and held behind an
//! `Arc` in the application context.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    vector: Vec<f32>,
    inserted_at: Instant,
}

pub struct EmbeddingCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
    order: Mutex<VecDeque<String>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
}

fn normalize_key(text: &str) -> String {
    text.trim().to_string()
}

impl EmbeddingCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns a cached vector for `text` if present and not expired (lazy expiry).
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = normalize_key(text);
        let entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.vector.clone()),
            _ => None,
        }
    }

    /// Inserts `vector` for `text`, evicting the oldest-inserted entry if at capacity.
    pub fn put(&self, text: &str, vector: Vec<f32>) {
        let key = normalize_key(text);
        let mut entries = self.entries.lock().unwrap();
        let mut order = self.order.lock().unwrap();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            if let Some(oldest) = order.pop_front() {
                entries.remove(&oldest);
            }
        }

        if entries.insert(
            key.clone(),
            Entry {
                vector,
                inserted_at: Instant::now(),
            },
        ).is_none()
        {
            order.push_back(key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().unwrap().len(),
            max_size: self.capacity,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
        self.order.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_put_roundtrip() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));
        cache.put("hello", vec![1.0, 2.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn whitespace_normalized_keys_share_entry() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));
        cache.put("  hello  ", vec![1.0]);
        assert_eq!(cache.get("hello"), Some(vec![1.0]));
    }

    #[test]
    fn miss_returns_none() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));
        assert_eq!(cache.get("nope"), None);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = EmbeddingCache::new(10, Duration::from_millis(1));
        cache.put("hello", vec![1.0]);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("hello"), None);
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = EmbeddingCache::new(3, Duration::from_secs(60));
        for i in 0..10 {
            cache.put(&format!("k{i}"), vec![i as f32]);
            assert!(cache.stats().size <= 3);
        }
    }

    #[test]
    fn eviction_is_insertion_order_fifo() {
        let cache = EmbeddingCache::new(2, Duration::from_secs(60));
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        cache.put("c", vec![3.0]);
        assert_eq!(cache.get("a"), None, "first-inserted key must be evicted");
        assert_eq!(cache.get("b"), Some(vec![2.0]));
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = EmbeddingCache::new(10, Duration::from_secs(60));
        cache.put("a", vec![1.0]);
        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.get("a"), None);
    }
}
