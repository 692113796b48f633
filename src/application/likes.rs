//! Cache-aside like counter.
//!
//! Mutations go to the authoritative store first and invalidate the cached
//! total after a commit, or after a failure that may have committed. Reads
//! consult the cache, and on a miss or any cache failure recompute from the
//! store and repopulate.
//!
//! A read records the key's epoch before counting and repopulates with
//! [`CountCache::set_if_unchanged`], so a count taken before a concurrent
//! mutation is discarded once that mutation has invalidated the key.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::application::repos::{EntityGate, LikesRepo, RepoError};
use crate::cache::{CountCache, CountKey, DEFAULT_KEY_PREFIX, Epoch};
use crate::domain::entities::LikeCount;
use crate::domain::types::{CountSource, EntityId, LikeAction, UserId};

pub const METRIC_CACHE_HIT: &str = "applause_likes_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "applause_likes_cache_miss_total";
pub const METRIC_CACHE_ERROR: &str = "applause_likes_cache_error_total";
pub const METRIC_INVALIDATION_FAILED: &str = "applause_likes_invalidation_failed_total";
pub const METRIC_MUTATION: &str = "applause_likes_mutation_total";
pub const METRIC_POPULATE_SKIPPED: &str = "applause_likes_populate_skipped_total";

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(250);

/// Transport-neutral classification of [`LikeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unavailable,
}

#[derive(Debug, Error)]
pub enum LikeError {
    #[error("entity `{0}` not found")]
    EntityNotFound(EntityId),
    #[error("user `{user_id}` already liked `{entity_id}`")]
    AlreadyLiked { entity_id: EntityId, user_id: UserId },
    #[error("user `{user_id}` has no like on `{entity_id}` to remove")]
    NotLiked { entity_id: EntityId, user_id: UserId },
    #[error("like store unavailable: {0}")]
    Unavailable(#[source] RepoError),
}

impl LikeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LikeError::EntityNotFound(_) | LikeError::NotLiked { .. } => ErrorKind::NotFound,
            LikeError::AlreadyLiked { .. } => ErrorKind::Conflict,
            LikeError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}

impl From<RepoError> for LikeError {
    fn from(err: RepoError) -> Self {
        LikeError::Unavailable(err)
    }
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub key_prefix: String,
    /// Deadline applied to each store and gate call.
    pub store_timeout: Duration,
    /// Deadline applied to each cache call.
    pub cache_timeout: Duration,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct LikeCounterService {
    gate: Arc<dyn EntityGate>,
    likes: Arc<dyn LikesRepo>,
    cache: Arc<dyn CountCache>,
    config: CounterConfig,
}

impl LikeCounterService {
    pub fn new(
        gate: Arc<dyn EntityGate>,
        likes: Arc<dyn LikesRepo>,
        cache: Arc<dyn CountCache>,
        config: CounterConfig,
    ) -> Self {
        Self {
            gate,
            likes,
            cache,
            config,
        }
    }

    /// Record `user_id`'s like of `entity_id`.
    ///
    /// Fails with [`LikeError::AlreadyLiked`] when the pair already exists; the
    /// check is the store's unique constraint, never a prior read.
    #[instrument(skip_all, fields(entity = %entity_id, user = %user_id))]
    pub async fn toggle_like(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<LikeAction, LikeError> {
        self.ensure_exists(entity_id).await?;

        let inserted = self
            .store_call(
                "insert_like_if_absent",
                self.likes.insert_like_if_absent(entity_id, user_id),
            )
            .await;

        match inserted {
            Ok(record) => {
                debug!(like_id = %record.id, "like recorded");
                counter!(METRIC_MUTATION, "action" => LikeAction::Liked.as_str()).increment(1);
                self.invalidate(entity_id).await;
                Ok(LikeAction::Liked)
            }
            Err(RepoError::Duplicate { .. }) => Err(LikeError::AlreadyLiked {
                entity_id: entity_id.clone(),
                user_id: user_id.clone(),
            }),
            // The entity vanished between the gate check and the insert.
            Err(RepoError::InvalidInput { .. }) => {
                Err(LikeError::EntityNotFound(entity_id.clone()))
            }
            Err(err) => {
                if commit_state_unknown(&err) {
                    self.invalidate(entity_id).await;
                }
                Err(err.into())
            }
        }
    }

    /// Remove `user_id`'s like of `entity_id`.
    #[instrument(skip_all, fields(entity = %entity_id, user = %user_id))]
    pub async fn remove_like(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<(), LikeError> {
        self.ensure_exists(entity_id).await?;

        let deleted = self
            .store_call("delete_like", self.likes.delete_like(entity_id, user_id))
            .await;

        match deleted {
            Ok(true) => {
                counter!(METRIC_MUTATION, "action" => LikeAction::Unliked.as_str()).increment(1);
                self.invalidate(entity_id).await;
                Ok(())
            }
            Ok(false) => Err(LikeError::NotLiked {
                entity_id: entity_id.clone(),
                user_id: user_id.clone(),
            }),
            Err(err) => {
                if commit_state_unknown(&err) {
                    self.invalidate(entity_id).await;
                }
                Err(err.into())
            }
        }
    }

    /// Current like total for `entity_id` and the tier that served it.
    ///
    /// Cache hits skip the existence check; cache failures of any kind fall
    /// through to the store and are never surfaced.
    #[instrument(skip_all, fields(entity = %entity_id))]
    pub async fn get_count(&self, entity_id: &EntityId) -> Result<LikeCount, LikeError> {
        let key = self.key_for(entity_id);

        if let Some(count) = self.lookup_cached(&key).await {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(LikeCount {
                count,
                source: CountSource::Cache,
            });
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        // Must be read before the store count.
        let seen = self.observe_epoch(&key).await;

        self.ensure_exists(entity_id).await?;
        let count = self
            .store_call("count_likes", self.likes.count_likes(entity_id))
            .await?;

        match seen {
            Some(seen) => self.populate(&key, count, seen).await,
            None => debug!(key = %key, "epoch unknown; not repopulating"),
        }

        Ok(LikeCount {
            count,
            source: CountSource::Store,
        })
    }

    fn key_for(&self, entity_id: &EntityId) -> CountKey {
        CountKey::for_entity(&self.config.key_prefix, entity_id)
    }

    async fn ensure_exists(&self, entity_id: &EntityId) -> Result<(), LikeError> {
        let exists = self
            .store_call("entity_exists", self.gate.exists(entity_id))
            .await?;

        if exists {
            Ok(())
        } else {
            Err(LikeError::EntityNotFound(entity_id.clone()))
        }
    }

    async fn store_call<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, RepoError>>,
    ) -> Result<T, RepoError> {
        match timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    op,
                    timeout_ms = self.config.store_timeout.as_millis() as u64,
                    "store call exceeded its deadline"
                );
                Err(RepoError::Timeout)
            }
        }
    }

    async fn lookup_cached(&self, key: &CountKey) -> Option<u64> {
        match timeout(self.config.cache_timeout, self.cache.get(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
                warn!(key = %key, error = %err, "cache read failed; reading from store");
                None
            }
            Err(_) => {
                counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
                warn!(key = %key, "cache read timed out; reading from store");
                None
            }
        }
    }

    async fn observe_epoch(&self, key: &CountKey) -> Option<Epoch> {
        match timeout(self.config.cache_timeout, self.cache.epoch(key)).await {
            Ok(Ok(epoch)) => Some(epoch),
            Ok(Err(err)) => {
                counter!(METRIC_CACHE_ERROR, "op" => "epoch").increment(1);
                warn!(key = %key, error = %err, "failed to read cache epoch");
                None
            }
            Err(_) => {
                counter!(METRIC_CACHE_ERROR, "op" => "epoch").increment(1);
                warn!(key = %key, "cache epoch read timed out");
                None
            }
        }
    }

    async fn populate(&self, key: &CountKey, count: u64, seen: Epoch) {
        let write = self.cache.set_if_unchanged(key, count, seen);
        match timeout(self.config.cache_timeout, write).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                counter!(METRIC_POPULATE_SKIPPED).increment(1);
                debug!(key = %key, "key invalidated during read; not repopulating");
            }
            Ok(Err(err)) => {
                counter!(METRIC_CACHE_ERROR, "op" => "set").increment(1);
                warn!(key = %key, error = %err, "failed to populate count cache");
            }
            Err(_) => {
                counter!(METRIC_CACHE_ERROR, "op" => "set").increment(1);
                warn!(key = %key, "count cache populate timed out");
            }
        }
    }

    async fn invalidate(&self, entity_id: &EntityId) {
        let key = self.key_for(entity_id);
        let outcome = timeout(self.config.cache_timeout, self.cache.delete(&key)).await;

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(_) => "timed out".to_string(),
        };

        counter!(METRIC_INVALIDATION_FAILED).increment(1);
        warn!(
            key = %key,
            error = %failure,
            "cache invalidation failed; cached count may be stale until it expires"
        );
    }
}

/// Whether a failed write may still have committed.
fn commit_state_unknown(err: &RepoError) -> bool {
    matches!(err, RepoError::Timeout | RepoError::Persistence(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity() -> EntityId {
        EntityId::parse("album-1").expect("valid id")
    }

    fn user() -> UserId {
        UserId::parse("u1").expect("valid id")
    }

    #[test]
    fn errors_map_to_transport_neutral_kinds() {
        assert_eq!(
            LikeError::EntityNotFound(entity()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LikeError::NotLiked {
                entity_id: entity(),
                user_id: user(),
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LikeError::AlreadyLiked {
                entity_id: entity(),
                user_id: user(),
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            LikeError::from(RepoError::Timeout).kind(),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn only_ambiguous_failures_count_as_unknown_commits() {
        assert!(commit_state_unknown(&RepoError::Timeout));
        assert!(commit_state_unknown(&RepoError::from_persistence("reset")));
        assert!(!commit_state_unknown(&RepoError::NotFound));
        assert!(!commit_state_unknown(&RepoError::InvalidInput {
            message: "fk".to_string(),
        }));
    }

    #[test]
    fn default_config_uses_shared_key_prefix() {
        let config = CounterConfig::default();
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
        assert!(config.cache_timeout < config.store_timeout);
    }
}
