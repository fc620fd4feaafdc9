//! In-process circuit store.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::{CircuitStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Instant,
}

impl Entry {
    fn new(value: u64, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A [`CircuitStore`] backed by a sharded concurrent map.
///
/// Expiry is checked when a key is accessed; there is no sweeper task.
/// Uses the Tokio clock so paused-time tests can advance windows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, including expired keys not yet accessed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CircuitStore for MemoryStore {
    fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(0, ttl));
        if entry.is_expired(now) {
            *entry = Entry::new(0, ttl);
        }
        entry.value += 1;
        Ok(entry.value)
    }

    fn get(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value)),
            Some(_) => {}
            None => return Ok(None),
        }
        // The read guard is released above; evicting under it would deadlock.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_increment_starts_window_and_expires() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert_eq!(store.increment("c:failure", ttl).unwrap(), 1);
        assert_eq!(store.increment("c:failure", ttl).unwrap(), 2);

        tokio::time::advance(Duration::from_secs(9)).await;
        // Later increments do not extend the window.
        assert_eq!(store.increment("c:failure", ttl).unwrap(), 3);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("c:failure").unwrap(), None);
        assert_eq!(store.increment("c:failure", ttl).unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_and_expire() {
        let store = MemoryStore::new();
        store.set("c:open", 42, Duration::from_secs(5)).unwrap();
        assert_eq!(store.get("c:open").unwrap(), Some(42));

        store.expire("c:open", Duration::from_secs(1)).unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(store.get("c:open").unwrap(), None);
        // Expired keys are evicted on access.
        assert!(store.is_empty());

        store.expire("missing", Duration::from_secs(1)).unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.set("k", 1, Duration::from_secs(60)).unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        store.increment("hits", Duration::from_secs(60)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get("hits").unwrap(), Some(2000));
    }
}
