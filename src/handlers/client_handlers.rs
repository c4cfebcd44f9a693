//! HTTP handlers for clients and their connected platform accounts.

use crate::{
    errors::AppError,
    extract::{ApiJson, ApiPath},
    models::{
        client::Client,
        credential::{CredentialSummary, TokenData},
        platform::Platform,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateClientReq {
    pub name: String,
}

/// `POST /api/v1/clients`
pub async fn create_client(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateClientReq>,
) -> Result<impl IntoResponse, AppError> {
    let client = state.clients.create_client(&req.name).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// `GET /api/v1/clients`
pub async fn list_clients(State(state): State<AppState>) -> Result<Json<Vec<Client>>, AppError> {
    Ok(Json(state.clients.list_clients().await?))
}

/// `GET /api/v1/clients/{id}`
pub async fn get_client(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(state.clients.get_client(id).await?))
}

/// `DELETE /api/v1/clients/{id}` removes the client with everything it owns.
pub async fn delete_client(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, AppError> {
    state.clients.delete_client(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/clients/{id}/credentials`
pub async fn list_credentials(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<CredentialSummary>>, AppError> {
    state.clients.get_client(id).await?;
    Ok(Json(state.credentials.list_summaries(id).await?))
}

/// `PUT /api/v1/clients/{id}/credentials/{platform}`
///
/// Manual token import, e.g. Meta accounts that need `page_id` or
/// `ig_user_id` next to the token.
pub async fn put_credential(
    State(state): State<AppState>,
    ApiPath((id, platform)): ApiPath<(i64, String)>,
    ApiJson(token): ApiJson<TokenData>,
) -> Result<Json<CredentialSummary>, AppError> {
    let platform: Platform = platform.parse()?;
    Ok(Json(state.credentials.upsert(id, platform, &token).await?))
}

/// `DELETE /api/v1/clients/{id}/credentials/{platform}`
pub async fn delete_credential(
    State(state): State<AppState>,
    ApiPath((id, platform)): ApiPath<(i64, String)>,
) -> Result<StatusCode, AppError> {
    let platform: Platform = platform.parse()?;
    state.credentials.revoke(id, platform).await?;
    Ok(StatusCode::NO_CONTENT)
}
