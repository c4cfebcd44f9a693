//! OAuthService: the authorization-code handshake.
//!
//! `begin` records a one-time `state` bound to a client and platform and
//! returns the consent URL; `complete` consumes that state, exchanges the
//! code and stores the tokens.

use crate::{
    models::platform::Platform,
    services::{
        credential_service::{CredentialError, CredentialService},
        oauth_providers::{OAuthError, OAuthProviders},
    },
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// How long a consent round trip may take.
const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("client {0} not found")]
    ClientNotFound(i64),
    #[error("unknown or expired OAuth state")]
    InvalidState,
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;

#[derive(Clone)]
pub struct OAuthService {
    pub db: Arc<SqlitePool>,
    providers: Arc<OAuthProviders>,
    credentials: CredentialService,
}

impl OAuthService {
    pub fn new(
        db: Arc<SqlitePool>,
        providers: Arc<OAuthProviders>,
        credentials: CredentialService,
    ) -> Self {
        Self {
            db,
            providers,
            credentials,
        }
    }

    /// Start a consent flow and return the provider URL to redirect to.
    pub async fn begin(&self, client_id: i64, platform: Platform) -> HandshakeResult<String> {
        if !self.providers.is_configured(platform) {
            return Err(OAuthError::NotConfigured(platform).into());
        }

        let state = new_state();
        let url = self.providers.authorization_url(platform, &state)?;

        sqlx::query("DELETE FROM oauth_states WHERE created_at < ?")
            .bind(Utc::now() - Duration::minutes(STATE_TTL_MINUTES))
            .execute(&*self.db)
            .await?;

        sqlx::query(
            "INSERT INTO oauth_states (state, client_id, platform, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&state)
        .bind(client_id)
        .bind(platform)
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        .map_err(|err| {
            if crate::db::is_foreign_key_violation(&err) {
                HandshakeError::ClientNotFound(client_id)
            } else {
                HandshakeError::Sqlx(err)
            }
        })?;

        info!(client_id, %platform, "started OAuth consent flow");
        Ok(url)
    }

    /// Finish a consent flow. The state is single use.
    pub async fn complete(&self, code: &str, state: &str) -> HandshakeResult<(i64, Platform)> {
        let row: Option<(i64, Platform, DateTime<Utc>)> = sqlx::query_as(
            "DELETE FROM oauth_states WHERE state = ? RETURNING client_id, platform, created_at",
        )
        .bind(state)
        .fetch_optional(&*self.db)
        .await?;

        let (client_id, platform, created_at) = row.ok_or(HandshakeError::InvalidState)?;
        if created_at + Duration::minutes(STATE_TTL_MINUTES) < Utc::now() {
            return Err(HandshakeError::InvalidState);
        }

        let token = self.providers.exchange_code(platform, code).await?;
        self.credentials.upsert(client_id, platform, &token).await?;

        info!(client_id, %platform, "completed OAuth consent flow");
        Ok((client_id, platform))
    }
}

/// 32 random bytes, URL-safe.
fn new_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
