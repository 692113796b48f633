//! Cache key definitions.

use std::fmt;

use crate::domain::types::EntityId;

pub const DEFAULT_KEY_PREFIX: &str = "user_album_likes";

/// Key under which an entity's like total is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountKey(String);

impl CountKey {
    pub fn for_entity(prefix: &str, entity_id: &EntityId) -> Self {
        Self(format!("{prefix}:{entity_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
