use log::debug;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::PlaceCacheConfig;

/// Reverse-geocode results cached with LRU eviction and a time-to-live
pub struct PlaceCache {
    entries: HashMap<String, CachedPlace>,
    max_entries: usize,
    ttl: Duration,
    /// Ordered queue for quick access to LRU keys
    lru_queue: VecDeque<String>,
}

struct CachedPlace {
    details: Value,
    stored_at: Instant,
}

impl PlaceCache {
    pub fn new(config: PlaceCacheConfig) -> Self {
        let max_entries = config.max_entries.max(1);
        Self {
            entries: HashMap::with_capacity(max_entries),
            max_entries,
            ttl: config.ttl,
            lru_queue: VecDeque::with_capacity(max_entries),
        }
    }

    /// Cache key for a coordinate, rounded to roughly 11 m
    pub fn key_for(lat: f64, lng: f64) -> String {
        format!("{:.4},{:.4}", lat, lng)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&mut self, key: String, details: Value) {
        self.insert_at(key, details, Instant::now())
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_duration_since(entry.stored_at) >= self.ttl,
            None => return None,
        };

        if expired {
            debug!("Place cache entry {} expired", key);
            self.entries.remove(key);
            self.lru_queue.retain(|k| k != key);
            return None;
        }

        self.touch(key);
        self.entries.get(key).map(|entry| entry.details.clone())
    }

    fn insert_at(&mut self, key: String, details: Value, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_least_recently_used();
        }

        self.entries.insert(
            key.clone(),
            CachedPlace {
                details,
                stored_at: now,
            },
        );
        self.touch(&key);
    }

    /// Move a key to the most recently used end of the queue
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|k| k == key) {
            self.lru_queue.remove(pos);
        }
        self.lru_queue.push_back(key.to_string());
    }

    fn evict_least_recently_used(&mut self) {
        if let Some(lru_key) = self.lru_queue.pop_front() {
            debug!("Evicting place cache entry {}", lru_key);
            self.entries.remove(&lru_key);
        }
    }
}
