//! HTTP handlers for the post queue.

use crate::{
    errors::AppError,
    extract::{ApiJson, ApiPath},
    models::post::{PostDetail, PostResponse},
    services::post_service::NewPost,
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

/// `POST /api/v1/publish` queues a post and nudges the scheduler.
pub async fn create_post(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewPost>,
) -> Result<impl IntoResponse, AppError> {
    let post = state.posts.create_post(&req).await?;
    state.dispatch.nudge(post.id);
    Ok((StatusCode::CREATED, Json(PostResponse::from(&post))))
}

/// `GET /api/v1/publish/pending`
pub async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<PostResponse>>, AppError> {
    let posts = state.posts.list_pending().await?;
    Ok(Json(posts.iter().map(PostResponse::from).collect()))
}

/// `GET /api/v1/publish/{id}`
pub async fn get_post(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PostDetail>, AppError> {
    let (post, deliveries) = state.posts.get_post(id).await?;
    Ok(Json(PostDetail::new(&post, deliveries)))
}

/// `DELETE /api/v1/publish/{id}` cancels a post that has not started.
pub async fn cancel_post(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.posts.cancel_post(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/v1/publish/{id}/retry`
pub async fn retry_post(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<PostResponse>, AppError> {
    let post = state.posts.retry_post(id).await?;
    state.dispatch.nudge(post.id);
    Ok(Json(PostResponse::from(&post)))
}
