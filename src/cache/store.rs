//! In-process count cache.
//!
//! Bounded by an LRU and aged out by a per-entry deadline so a missed
//! invalidation cannot outlive the configured TTL.
//!
//! Deletes leave a tombstone carrying the key's new epoch. When a tombstone or
//! value leaves the LRU its epoch is folded into `floor`, which is the epoch
//! reported for every absent key, so an epoch observed before a delete never
//! matches again.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::config::CacheConfig;
use super::keys::CountKey;
use super::lock::{rw_read, rw_write};
use super::{CacheError, CountCache, Epoch};

const SOURCE: &str = "cache::store";

#[derive(Clone, Copy)]
struct Entry {
    /// `None` marks a tombstone left by a delete.
    value: Option<u64>,
    epoch: Epoch,
    expires_at: Instant,
}

struct Slots {
    entries: LruCache<String, Entry>,
    /// Last epoch handed out by a delete.
    latest: Epoch,
    /// Highest epoch of any entry that left the LRU.
    floor: Epoch,
}

impl Slots {
    fn live(&mut self, key: &str, now: Instant) -> Option<Entry> {
        match self.entries.peek(key).copied() {
            Some(entry) if entry.expires_at > now => Some(entry),
            Some(entry) => {
                self.entries.pop(key);
                self.floor = self.floor.max(entry.epoch);
                None
            }
            None => None,
        }
    }

    fn epoch_of(&mut self, key: &str, now: Instant) -> Epoch {
        self.live(key, now).map_or(self.floor, |entry| entry.epoch)
    }

    fn store(&mut self, key: &str, entry: Entry) {
        if let Some((evicted_key, evicted)) = self.entries.push(key.to_string(), entry) {
            if evicted_key != key {
                self.floor = self.floor.max(evicted.epoch);
            }
        }
    }
}

pub struct MemoryCountCache {
    slots: RwLock<Slots>,
    ttl: Duration,
}

impl MemoryCountCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            slots: RwLock::new(Slots {
                entries: LruCache::new(config.capacity_non_zero()),
                latest: 0,
                floor: 0,
            }),
            ttl: config.ttl,
        }
    }

    /// Number of entries currently held, expired ones and tombstones included.
    pub fn len(&self) -> usize {
        rw_read(&self.slots, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Epochs observed before the clear stay invalid.
    pub fn clear(&self) {
        let mut slots = rw_write(&self.slots, SOURCE, "clear");
        slots.floor = slots.latest.max(slots.floor);
        slots.entries.clear();
    }

    fn lookup(&self, key: &CountKey, now: Instant) -> Option<u64> {
        let mut slots = rw_write(&self.slots, SOURCE, "get");
        let value = slots.live(key.as_str(), now).and_then(|entry| entry.value);
        if value.is_some() {
            slots.entries.promote(key.as_str());
        }
        value
    }

    fn entry(&self, value: u64, epoch: Epoch) -> Entry {
        Entry {
            value: Some(value),
            epoch,
            expires_at: Instant::now() + self.ttl,
        }
    }
}

#[async_trait]
impl CountCache for MemoryCountCache {
    async fn get(&self, key: &CountKey) -> Result<Option<u64>, CacheError> {
        Ok(self.lookup(key, Instant::now()))
    }

    async fn set(&self, key: &CountKey, value: u64) -> Result<(), CacheError> {
        let mut slots = rw_write(&self.slots, SOURCE, "set");
        let epoch = slots.epoch_of(key.as_str(), Instant::now());
        slots.store(key.as_str(), self.entry(value, epoch));
        Ok(())
    }

    async fn delete(&self, key: &CountKey) -> Result<(), CacheError> {
        let mut slots = rw_write(&self.slots, SOURCE, "delete");
        slots.latest += 1;
        let tombstone = Entry {
            value: None,
            epoch: slots.latest,
            expires_at: Instant::now() + self.ttl,
        };
        slots.store(key.as_str(), tombstone);
        Ok(())
    }

    async fn epoch(&self, key: &CountKey) -> Result<Epoch, CacheError> {
        let mut slots = rw_write(&self.slots, SOURCE, "epoch");
        Ok(slots.epoch_of(key.as_str(), Instant::now()))
    }

    async fn set_if_unchanged(
        &self,
        key: &CountKey,
        value: u64,
        seen: Epoch,
    ) -> Result<bool, CacheError> {
        let mut slots = rw_write(&self.slots, SOURCE, "set_if_unchanged");
        if slots.epoch_of(key.as_str(), Instant::now()) != seen {
            return Ok(false);
        }
        slots.store(key.as_str(), self.entry(value, seen));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::domain::types::EntityId;

    fn key(id: &str) -> CountKey {
        CountKey::for_entity("likes", &EntityId::parse(id).expect("valid id"))
    }

    #[tokio::test]
    async fn zero_is_a_hit_not_a_miss() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        cache.set(&key("album-1"), 0).await.expect("set");
        assert_eq!(cache.get(&key("album-1")).await.expect("get"), Some(0));
        assert_eq!(cache.get(&key("album-2")).await.expect("get"), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        cache.set(&key("album-1"), 3).await.expect("set");
        cache.delete(&key("album-1")).await.expect("first delete");
        cache.delete(&key("album-1")).await.expect("second delete");
        assert_eq!(cache.get(&key("album-1")).await.expect("get"), None);
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        cache.set(&key("album-1"), 3).await.expect("set");
        cache.set(&key("album-1"), 4).await.expect("set");
        assert_eq!(cache.get(&key("album-1")).await.expect("get"), Some(4));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss_and_are_dropped() {
        let cache = MemoryCountCache::new(&CacheConfig {
            ttl: Duration::from_secs(60),
            ..Default::default()
        });
        cache.set(&key("album-1"), 7).await.expect("set");

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(cache.lookup(&key("album-1"), later), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = MemoryCountCache::new(&CacheConfig {
            capacity: 1,
            ..Default::default()
        });
        cache.set(&key("album-1"), 1).await.expect("set");
        cache.set(&key("album-2"), 2).await.expect("set");

        assert_eq!(cache.get(&key("album-1")).await.expect("get"), None);
        assert_eq!(cache.get(&key("album-2")).await.expect("get"), Some(2));
    }

    #[tokio::test]
    async fn poisoned_lock_is_recovered() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        cache.set(&key("album-1"), 5).await.expect("set");

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache.slots.write().expect("lock");
            panic!("poison the cache lock");
        }));

        assert_eq!(cache.get(&key("album-1")).await.expect("get"), Some(5));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn delete_advances_epoch_and_refuses_stale_write() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        let seen = cache.epoch(&key("album-1")).await.expect("epoch");

        cache.delete(&key("album-1")).await.expect("delete");
        assert!(cache.epoch(&key("album-1")).await.expect("epoch") > seen);

        let written = cache
            .set_if_unchanged(&key("album-1"), 0, seen)
            .await
            .expect("conditional set");
        assert!(!written);
        assert_eq!(cache.get(&key("album-1")).await.expect("get"), None);
    }

    #[tokio::test]
    async fn conditional_write_succeeds_without_intervening_delete() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        let seen = cache.epoch(&key("album-1")).await.expect("epoch");
        cache.delete(&key("album-2")).await.expect("delete other key");

        let written = cache
            .set_if_unchanged(&key("album-1"), 4, seen)
            .await
            .expect("conditional set");
        assert!(written);
        assert_eq!(cache.get(&key("album-1")).await.expect("get"), Some(4));
    }

    #[tokio::test]
    async fn evicted_tombstone_still_refuses_stale_write() {
        let cache = MemoryCountCache::new(&CacheConfig {
            capacity: 1,
            ..Default::default()
        });
        let seen = cache.epoch(&key("album-1")).await.expect("epoch");
        cache.delete(&key("album-1")).await.expect("delete");
        cache.set(&key("album-2"), 9).await.expect("evicting set");

        let written = cache
            .set_if_unchanged(&key("album-1"), 0, seen)
            .await
            .expect("conditional set");
        assert!(!written);
    }

    #[tokio::test]
    async fn clear_invalidates_observed_epochs() {
        let cache = MemoryCountCache::new(&CacheConfig::default());
        cache.delete(&key("album-1")).await.expect("delete");
        let seen = cache.epoch(&key("album-2")).await.expect("epoch");
        cache.delete(&key("album-2")).await.expect("delete");
        cache.clear();

        let written = cache
            .set_if_unchanged(&key("album-2"), 1, seen)
            .await
            .expect("conditional set");
        assert!(!written);
    }
}
