//! Album like handlers.

use axum::Json;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::domain::types::{EntityId, UserId};

use super::error::ApiError;
use super::state::HttpState;

/// Identity asserted by the upstream authentication layer.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
/// Which tier served a like count: `cache` or `store`.
pub const DATA_SOURCE_HEADER: HeaderName = HeaderName::from_static("x-data-source");

/// Caller identity, trusted as already verified.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(&USER_ID_HEADER)
            .ok_or_else(|| ApiError::unauthorized(None))?
            .to_str()
            .map_err(|_| ApiError::unauthorized(Some("user id header is not ASCII".into())))?;

        UserId::parse(raw)
            .map(CurrentUser)
            .map_err(|err| ApiError::unauthorized(Some(err.to_string())))
    }
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LikesData {
    pub likes: u64,
}

#[derive(Debug, Serialize)]
pub struct LikesBody {
    pub status: &'static str,
    pub data: LikesData,
}

fn parse_entity(raw: &str) -> Result<EntityId, ApiError> {
    EntityId::parse(raw).map_err(ApiError::invalid_input)
}

pub async fn like_album(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id)?;
    let action = state.likes.toggle_like(&entity_id, &user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageBody {
            status: "success",
            message: format!("album {}", action.as_str()),
        }),
    ))
}

pub async fn unlike_album(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id)?;
    state.likes.remove_like(&entity_id, &user_id).await?;

    Ok(Json(MessageBody {
        status: "success",
        message: "album unliked".to_string(),
    }))
}

pub async fn get_album_likes(
    State(state): State<HttpState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let entity_id = parse_entity(&id)?;
    let count = state.likes.get_count(&entity_id).await?;

    Ok((
        [(DATA_SOURCE_HEADER, count.source.as_str())],
        Json(LikesBody {
            status: "success",
            data: LikesData { likes: count.count },
        }),
    ))
}

pub async fn health(State(state): State<HttpState>) -> Response {
    match state.health.check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_message(
                "infra::http::health",
                StatusCode::SERVICE_UNAVAILABLE,
                err,
            )
            .attach(&mut response);
            response
        }
    }
}
