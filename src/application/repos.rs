//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::LikeRecord;
use crate::domain::types::{EntityId, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Authoritative record of individual likes.
///
/// Implementations must enforce the one-like-per-(entity, user) invariant
/// atomically at insertion time.
#[async_trait]
pub trait LikesRepo: Send + Sync {
    /// Insert a like unless one already exists for the pair.
    ///
    /// Returns [`RepoError::Duplicate`] when the pair is already present.
    async fn insert_like_if_absent(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<LikeRecord, RepoError>;

    /// Remove the pair's like, reporting whether a row was deleted.
    async fn delete_like(&self, entity_id: &EntityId, user_id: &UserId)
    -> Result<bool, RepoError>;

    async fn count_likes(&self, entity_id: &EntityId) -> Result<u64, RepoError>;
}

/// Answers whether a likeable entity exists.
#[async_trait]
pub trait EntityGate: Send + Sync {
    async fn exists(&self, entity_id: &EntityId) -> Result<bool, RepoError>;
}
