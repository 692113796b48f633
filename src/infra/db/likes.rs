use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{EntityGate, LikesRepo, RepoError},
    domain::entities::LikeRecord,
    domain::types::{EntityId, UserId},
};

use super::{PostgresRepositories, map_sqlx_error};

const LIKES_UNIQUE_CONSTRAINT: &str = "user_album_likes_user_id_album_id_key";

#[derive(sqlx::FromRow)]
struct InsertedLikeRow {
    id: String,
    created_at: OffsetDateTime,
}

#[async_trait]
impl LikesRepo for PostgresRepositories {
    async fn insert_like_if_absent(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<LikeRecord, RepoError> {
        // The unique constraint arbitrates concurrent inserts for the same pair;
        // the loser gets no row back.
        let row = sqlx::query_as::<_, InsertedLikeRow>(
            r#"
            INSERT INTO user_album_likes (id, user_id, album_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, album_id) DO NOTHING
            RETURNING id, created_at
            "#,
        )
        .bind(LikeRecord::new_id())
        .bind(user_id.as_str())
        .bind(entity_id.as_str())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(LikeRecord {
                id: row.id,
                entity_id: entity_id.clone(),
                user_id: user_id.clone(),
                created_at: row.created_at,
            }),
            None => Err(RepoError::Duplicate {
                constraint: LIKES_UNIQUE_CONSTRAINT.to_string(),
            }),
        }
    }

    async fn delete_like(
        &self,
        entity_id: &EntityId,
        user_id: &UserId,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_album_likes
            WHERE user_id = $1 AND album_id = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(entity_id.as_str())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_likes(&self, entity_id: &EntityId) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM user_album_likes
            WHERE album_id = $1
            "#,
        )
        .bind(entity_id.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl EntityGate for PostgresRepositories {
    async fn exists(&self, entity_id: &EntityId) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM albums WHERE id = $1)")
            .bind(entity_id.as_str())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
