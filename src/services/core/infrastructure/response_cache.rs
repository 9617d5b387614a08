// In-memory TTL cache for upstream responses.
// Process-wide per instance; entries are not shared across isolates.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use crate::utils::time::current_timestamp_ms;

/// Upper bound on live entries per cache
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at_ms: i64,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    ttl_ms: u64,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl_ms: u64) -> Self {
        Self::with_max_entries(ttl_ms, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl_ms: u64, max_entries: usize) -> Self {
        Self {
            ttl_ms,
            max_entries: max_entries.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Live entry for `key`. Reads never extend the expiry.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = current_timestamp_ms();
        match entries.get(key) {
            Some(entry) if entry.expires_at_ms > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Drops expired entries first. When still full, the entry closest to
    /// expiry makes room.
    pub fn insert(&self, key: String, value: V) {
        let now = current_timestamp_ms();
        let expires_at_ms = now.saturating_add(i64::try_from(self.ttl_ms).unwrap_or(i64::MAX));
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.expires_at_ms > now);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at_ms)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at_ms,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable key for a request: method, absolute url and params in sorted order.
pub fn request_cache_key(method: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    for (key, value) in params {
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_order_independent_and_method_sensitive() {
        let mut a = BTreeMap::new();
        a.insert("limit".to_string(), "10".to_string());
        a.insert("offset".to_string(), "0".to_string());
        let mut b = BTreeMap::new();
        b.insert("offset".to_string(), "0".to_string());
        b.insert("limit".to_string(), "10".to_string());

        let url = "https://data.vinnova.se/api/utlysningar";
        assert_eq!(request_cache_key("GET", url, &a), request_cache_key("get", url, &b));
        assert_ne!(request_cache_key("GET", url, &a), request_cache_key("POST", url, &a));
        assert_ne!(
            request_cache_key("GET", url, &a),
            request_cache_key("GET", url, &BTreeMap::new())
        );
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache = TtlCache::new(30);
        cache.insert("k".to_string(), 1);
        assert_eq!(cache.get("k"), Some(1));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_insert_evicts_expired_entries() {
        let cache = TtlCache::new(1);
        for i in 0..1_000 {
            cache.insert(format!("old-{}", i), i);
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        for i in 0..10 {
            cache.insert(format!("new-{}", i), i);
        }
        assert!(cache.len() <= 10);
        assert_eq!(cache.get("old-0"), None);
    }

    #[test]
    fn test_full_cache_drops_entry_closest_to_expiry() {
        let cache = TtlCache::with_max_entries(60_000, 3);
        for key in ["a", "b", "c"] {
            cache.insert(key.to_string(), key.to_string());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        cache.insert("d".to_string(), "d".to_string());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("d"), Some("d".to_string()));

        // Overwriting a present key never evicts another
        cache.insert("b".to_string(), "b2".to_string());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("c"), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_hits_do_not_extend_ttl() {
        let cache = TtlCache::new(60);
        cache.insert("k".to_string(), "v".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(35)).await;
        assert!(cache.get("k").is_some());
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;
        assert!(cache.get("k").is_none());
    }
}
