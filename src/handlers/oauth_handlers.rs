//! OAuth consent flow: redirect out to the provider, handle the callback.

use crate::{
    errors::AppError,
    extract::{ApiPath, ApiQuery},
    models::platform::Platform,
    state::AppState,
};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub client_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// `GET /auth/login/{platform}?client_id=N`
pub async fn login(
    State(state): State<AppState>,
    ApiPath(platform): ApiPath<String>,
    ApiQuery(query): ApiQuery<LoginQuery>,
) -> Result<Redirect, AppError> {
    let platform: Platform = platform.parse()?;
    let url = state.oauth.begin(query.client_id, platform).await?;
    Ok(Redirect::temporary(&url))
}

/// `GET /auth/callback?code=...&state=...`
pub async fn callback(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = query.error {
        warn!("[OAuth] Provider returned error: {}", error);
        let detail = query.error_description.unwrap_or_default();
        let message = if detail.is_empty() {
            format!("authorization denied: {}", error)
        } else {
            format!("authorization denied: {} ({})", error, detail)
        };
        return Err(AppError::bad_request(message));
    }
    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return Err(AppError::bad_request("missing `code` or `state`"));
    };

    let (client_id, platform) = state.oauth.complete(&code, &oauth_state).await?;
    Ok(Json(json!({
        "message": "OAuth successful. Tokens saved to database.",
        "client_id": client_id,
        "platform": platform,
    })))
}
