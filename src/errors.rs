use crate::{
    models::platform::UnknownPlatform,
    services::{
        client_service::ClientError,
        credential_service::CredentialError,
        oauth_providers::OAuthError,
        oauth_service::HandshakeError,
        post_service::PostError,
    },
};
use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned by every handler, rendered as `{"error", "status"}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        let message = msg.into();
        tracing::error!("internal error: {}", message);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    /// A platform or provider call failed.
    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl AppError {
    /// A request axum could not extract. Unreadable input counts as a
    /// validation failure.
    fn rejected(status: StatusCode, message: String) -> Self {
        let status = match status {
            StatusCode::UNPROCESSABLE_ENTITY => StatusCode::BAD_REQUEST,
            other => other,
        };
        Self::new(status, message)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::rejected(rejection.status(), rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<UnknownPlatform> for AppError {
    fn from(err: UnknownPlatform) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::NotFound(_) => AppError::not_found(err.to_string()),
            ClientError::InvalidName(_) => AppError::bad_request(err.to_string()),
            ClientError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::ClientNotFound(_) | CredentialError::NotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            CredentialError::EmptyAccessToken => AppError::bad_request(err.to_string()),
            CredentialError::Refresh { .. } => AppError::bad_gateway(err.to_string()),
            CredentialError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::NotConfigured(_) => AppError::bad_request(err.to_string()),
            OAuthError::Provider { .. } | OAuthError::CannotRefresh(_) | OAuthError::Http(_) => {
                AppError::bad_gateway(err.to_string())
            }
            OAuthError::Url(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<HandshakeError> for AppError {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::ClientNotFound(_) => AppError::not_found(err.to_string()),
            HandshakeError::InvalidState => AppError::bad_request(err.to_string()),
            HandshakeError::OAuth(inner) => inner.into(),
            HandshakeError::Credential(inner) => inner.into(),
            HandshakeError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<PostError> for AppError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::NotFound(_) | PostError::ClientNotFound(_) => AppError::not_found(err.to_string()),
            PostError::Validation(_) => AppError::bad_request(err.to_string()),
            PostError::Conflict { .. } => AppError::conflict(err.to_string()),
            PostError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{platform::Platform, post::PostStatus};

    #[test]
    fn service_errors_map_to_statuses() {
        assert_eq!(AppError::from(ClientError::NotFound(3)).status, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(PostError::Conflict {
                id: 1,
                actual: PostStatus::Completed,
                expected: PostStatus::Pending,
                action: "cancelled",
            })
            .status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(HandshakeError::OAuth(OAuthError::Provider {
                platform: Platform::Youtube,
                message: "invalid_grant".into(),
            }))
            .status,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(HandshakeError::OAuth(OAuthError::NotConfigured(Platform::Tiktok))).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(UnknownPlatform("vine".into())).message,
            "unsupported platform `vine`"
        );
    }
}
