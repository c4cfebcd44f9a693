//! Shared handler state.

use crate::services::{
    client_service::ClientService, credential_service::CredentialService,
    oauth_service::OAuthService, post_service::PostService, scheduler::DispatchHandle,
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub clients: ClientService,
    pub credentials: CredentialService,
    pub oauth: OAuthService,
    pub posts: PostService,
    pub dispatch: DispatchHandle,
    /// Scratch directory checked by `/readyz`.
    pub temp_dir: PathBuf,
}
