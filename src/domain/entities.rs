//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{CountSource, EntityId, UserId};

/// A single user's like of an entity. Immutable while it exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikeRecord {
    pub id: String,
    pub entity_id: EntityId,
    pub user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl LikeRecord {
    /// Mint a fresh record identifier.
    pub fn new_id() -> String {
        format!("like-{}", Uuid::new_v4().simple())
    }
}

/// A like total together with the tier that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeCount {
    pub count: u64,
    pub source: CountSource,
}
