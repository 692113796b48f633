//! In-memory doubles for the like store and the count cache.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use applause::application::likes::{CounterConfig, LikeCounterService};
use applause::application::repos::{EntityGate, LikesRepo, RepoError};
use applause::cache::{CacheError, CountCache, CountKey, Epoch};
use applause::domain::entities::LikeRecord;
use applause::domain::types::{EntityId, UserId};
use async_trait::async_trait;
use time::OffsetDateTime;

#[derive(Default)]
struct StoreState {
    entities: HashSet<String>,
    likes: HashMap<String, HashSet<String>>,
}

/// Store double enforcing pair uniqueness under a single lock.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    unavailable: AtomicBool,
    writes_fail: AtomicBool,
    delay_ms: AtomicU64,
    write_delay_ms: AtomicU64,
    count_pause_ms: AtomicU64,
    pub exists_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
}

impl FakeStore {
    pub fn with_entities(ids: &[&str]) -> Arc<Self> {
        let store = Self::default();
        {
            let mut state = store.state.lock().expect("store lock");
            state.entities.extend(ids.iter().map(|id| id.to_string()));
        }
        Arc::new(store)
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Inserts and deletes fail after the gate has answered.
    pub fn set_writes_fail(&self, value: bool) {
        self.writes_fail.store(value, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Counts are taken immediately, then returned after `pause`.
    pub fn pause_counts_after_read(&self, pause: Duration) {
        self.count_pause_ms
            .store(pause.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn stored_likes(&self, entity: &str) -> usize {
        let state = self.state.lock().expect("store lock");
        state.likes.get(entity).map_or(0, HashSet::len)
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), RepoError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection refused"));
        }
        Ok(())
    }

    async fn enter_write(&self) -> Result<(), RepoError> {
        self.enter().await?;
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("connection reset mid-statement"));
        }
        Ok(())
    }
}

#[async_trait]
impl LikesRepo for FakeStore {
    async fn insert_like_if_absent(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<LikeRecord, RepoError> {
        self.enter_write().await?;
        let mut state = self.state.lock().expect("store lock");
        if !state.entities.contains(entity_id.as_str()) {
            return Err(RepoError::InvalidInput {
                message: "album does not exist".to_string(),
            });
        }
        let users = state
            .likes
            .entry(entity_id.as_str().to_string())
            .or_default();
        if !users.insert(user_id.as_str().to_string()) {
            return Err(RepoError::Duplicate {
                constraint: "user_album_likes_user_id_album_id_key".to_string(),
            });
        }
        Ok(LikeRecord {
            id: LikeRecord::new_id(),
            entity_id: entity_id.clone(),
            user_id: user_id.clone(),
            created_at: OffsetDateTime::now_utc(),
        })
    }

    async fn delete_like(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<bool, RepoError> {
        self.enter_write().await?;
        let mut state = self.state.lock().expect("store lock");
        Ok(state
            .likes
            .get_mut(entity_id.as_str())
            .is_some_and(|users| users.remove(user_id.as_str())))
    }

    async fn count_likes(&self, entity_id: &EntityId) -> Result<u64, RepoError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let count = {
            let state = self.state.lock().expect("store lock");
            state
                .likes
                .get(entity_id.as_str())
                .map_or(0, |users| users.len() as u64)
        };
        let pause = self.count_pause_ms.load(Ordering::SeqCst);
        if pause > 0 {
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
        Ok(count)
    }
}

#[async_trait]
impl EntityGate for FakeStore {
    async fn exists(&self, entity_id: &EntityId) -> Result<bool, RepoError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        let state = self.state.lock().expect("store lock");
        Ok(state.entities.contains(entity_id.as_str()))
    }
}

/// Cache double whose operations can be made to fail or stall independently.
#[derive(Default)]
pub struct FakeCache {
    entries: Mutex<HashMap<String, u64>>,
    epochs: Mutex<HashMap<String, Epoch>>,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
    get_delay_ms: AtomicU64,
    deletes: AtomicUsize,
    sets: AtomicUsize,
}

impl FakeCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_get_delay(&self, delay: Duration) {
        self.get_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn peek(&self, key: &str) -> Option<u64> {
        self.entries.lock().expect("cache lock").get(key).copied()
    }

    pub fn seed(&self, key: &str, value: u64) {
        self.entries
            .lock()
            .expect("cache lock")
            .insert(key.to_string(), value);
    }

    /// Drops every entry, as a restarted cache would.
    pub fn flush(&self) {
        self.entries.lock().expect("cache lock").clear();
    }

    pub fn current_epoch(&self, key: &str) -> Epoch {
        self.epochs
            .lock()
            .expect("epoch lock")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CountCache for FakeCache {
    async fn get(&self, key: &CountKey) -> Result<Option<u64>, CacheError> {
        let delay = self.get_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("connection reset"));
        }
        Ok(self.peek(key.as_str()))
    }

    async fn set(&self, key: &CountKey, value: u64) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("connection reset"));
        }
        self.seed(key.as_str(), value);
        Ok(())
    }

    async fn delete(&self, key: &CountKey) -> Result<(), CacheError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("connection reset"));
        }
        self.entries.lock().expect("cache lock").remove(key.as_str());
        *self
            .epochs
            .lock()
            .expect("epoch lock")
            .entry(key.as_str().to_string())
            .or_default() += 1;
        Ok(())
    }

    async fn epoch(&self, key: &CountKey) -> Result<Epoch, CacheError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("connection reset"));
        }
        Ok(self.current_epoch(key.as_str()))
    }

    async fn set_if_unchanged(
        &self,
        key: &CountKey,
        value: u64,
        seen: Epoch,
    ) -> Result<bool, CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(CacheError::unavailable("connection reset"));
        }
        let epochs = self.epochs.lock().expect("epoch lock");
        if epochs.get(key.as_str()).copied().unwrap_or(0) != seen {
            return Ok(false);
        }
        self.seed(key.as_str(), value);
        Ok(true)
    }
}

pub fn test_config() -> CounterConfig {
    CounterConfig {
        store_timeout: Duration::from_millis(200),
        cache_timeout: Duration::from_millis(50),
        ..CounterConfig::default()
    }
}

pub fn service_with(
    store: &Arc<FakeStore>,
    cache: &Arc<FakeCache>,
    config: CounterConfig,
) -> LikeCounterService {
    let gate: Arc<dyn EntityGate> = store.clone();
    let likes: Arc<dyn LikesRepo> = store.clone();
    let cache: Arc<dyn CountCache> = cache.clone();
    LikeCounterService::new(gate, likes, cache, config)
}

pub fn entity(id: &str) -> EntityId {
    EntityId::parse(id).expect("valid entity id")
}

pub fn user(id: &str) -> UserId {
    UserId::parse(id).expect("valid user id")
}
