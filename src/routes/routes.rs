//! Defines every HTTP route of the publisher.
//!
//! ## Structure
//! - **Health**: `GET /health`, `GET /healthz`, `GET /readyz`
//! - **Clients**
//!   - `POST   /api/v1/clients`, `GET /api/v1/clients`
//!   - `GET    /api/v1/clients/{id}`, `DELETE /api/v1/clients/{id}`
//!   - `GET    /api/v1/clients/{id}/credentials`
//!   - `PUT    /api/v1/clients/{id}/credentials/{platform}` — manual token import
//!   - `DELETE /api/v1/clients/{id}/credentials/{platform}` — revoke
//! - **Publishing**
//!   - `POST   /api/v1/publish`, `GET /api/v1/publish/pending`
//!   - `GET    /api/v1/publish/{id}`, `DELETE /api/v1/publish/{id}`
//!   - `POST   /api/v1/publish/{id}/retry`
//! - **OAuth**: `GET /auth/login/{platform}?client_id=`, `GET /auth/callback`

use crate::{
    handlers::{
        client_handlers::{
            create_client, delete_client, delete_credential, get_client, list_clients,
            list_credentials, put_credential,
        },
        health_handlers::{health, healthz, readyz},
        oauth_handlers::{callback, login},
        publish_handlers::{cancel_post, create_post, get_post, list_pending, retry_post},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. The caller attaches `AppState` with `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // clients and credentials
        .route("/api/v1/clients", post(create_client).get(list_clients))
        .route("/api/v1/clients/{id}", get(get_client).delete(delete_client))
        .route("/api/v1/clients/{id}/credentials", get(list_credentials))
        .route(
            "/api/v1/clients/{id}/credentials/{platform}",
            put(put_credential).delete(delete_credential),
        )
        // publishing queue
        .route("/api/v1/publish", post(create_post))
        .route("/api/v1/publish/pending", get(list_pending))
        .route("/api/v1/publish/{id}", get(get_post).delete(cancel_post))
        .route("/api/v1/publish/{id}/retry", post(retry_post))
        // OAuth consent
        .route("/auth/login/{platform}", get(login))
        .route("/auth/callback", get(callback))
}
