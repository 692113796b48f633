use sqlx::error::ErrorKind;

use crate::application::repos::RepoError;

/// Postgres `query_canceled`, raised when `statement_timeout` fires.
const QUERY_CANCELED: &str = "57014";
/// Postgres `invalid_text_representation`.
const INVALID_TEXT_REPRESENTATION: &str = "22P02";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation => RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            },
            ErrorKind::ForeignKeyViolation => RepoError::InvalidInput {
                message: db.message().to_string(),
            },
            _ => match db.code().as_deref() {
                Some(QUERY_CANCELED) => RepoError::Timeout,
                Some(INVALID_TEXT_REPRESENTATION) => RepoError::InvalidInput {
                    message: db.message().to_string(),
                },
                _ => RepoError::from_persistence(db),
            },
        },
        other => RepoError::from_persistence(other),
    }
}
