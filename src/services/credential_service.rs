//! CredentialService: storage of OAuth tokens per client and platform.
//!
//! Tokens are only read to publish on the client's behalf. Revoking a
//! platform deletes its row outright.

use crate::{
    models::{
        credential::{CredentialSummary, SocialCredential, TokenData},
        platform::Platform,
    },
    services::oauth_providers::OAuthProviders,
};
use chrono::{Duration, Utc};
use sqlx::{SqlitePool, types::Json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Access tokens closer than this to expiry are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("client {0} not found")]
    ClientNotFound(i64),
    #[error("no {platform} credentials for client {client_id}")]
    NotFound { client_id: i64, platform: Platform },
    #[error("access_token must not be empty")]
    EmptyAccessToken,
    #[error("refreshing {platform} token failed: {message}")]
    Refresh { platform: Platform, message: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type CredentialResult<T> = Result<T, CredentialError>;

#[derive(Clone)]
pub struct CredentialService {
    pub db: Arc<SqlitePool>,
    providers: Arc<OAuthProviders>,
}

impl CredentialService {
    pub fn new(db: Arc<SqlitePool>, providers: Arc<OAuthProviders>) -> Self {
        Self { db, providers }
    }

    /// Insert or replace the token for `(client_id, platform)`.
    pub async fn upsert(
        &self,
        client_id: i64,
        platform: Platform,
        token: &TokenData,
    ) -> CredentialResult<CredentialSummary> {
        if token.access_token.trim().is_empty() {
            return Err(CredentialError::EmptyAccessToken);
        }

        let row = sqlx::query_as::<_, SocialCredential>(
            r#"
            INSERT INTO social_credentials (client_id, platform, token_data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(client_id, platform) DO UPDATE SET
                token_data = excluded.token_data,
                updated_at = excluded.updated_at
            RETURNING id, client_id, platform, token_data, updated_at
            "#,
        )
        .bind(client_id)
        .bind(platform)
        .bind(Json(token))
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if crate::db::is_foreign_key_violation(&err) {
                CredentialError::ClientNotFound(client_id)
            } else {
                CredentialError::Sqlx(err)
            }
        })?;

        info!(client_id, %platform, "stored credentials");
        Ok(CredentialSummary::from(&row))
    }

    async fn fetch(&self, client_id: i64, platform: Platform) -> CredentialResult<Option<SocialCredential>> {
        Ok(sqlx::query_as::<_, SocialCredential>(
            "SELECT id, client_id, platform, token_data, updated_at
             FROM social_credentials WHERE client_id = ? AND platform = ?",
        )
        .bind(client_id)
        .bind(platform)
        .fetch_optional(&*self.db)
        .await?)
    }

    pub async fn get(&self, client_id: i64, platform: Platform) -> CredentialResult<Option<TokenData>> {
        Ok(self.fetch(client_id, platform).await?.map(|c| c.token_data.0))
    }

    pub async fn list_summaries(&self, client_id: i64) -> CredentialResult<Vec<CredentialSummary>> {
        let rows = sqlx::query_as::<_, SocialCredential>(
            "SELECT id, client_id, platform, token_data, updated_at
             FROM social_credentials WHERE client_id = ? ORDER BY platform",
        )
        .bind(client_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.iter().map(CredentialSummary::from).collect())
    }

    /// Delete the stored tokens for one platform.
    pub async fn revoke(&self, client_id: i64, platform: Platform) -> CredentialResult<()> {
        let result = sqlx::query("DELETE FROM social_credentials WHERE client_id = ? AND platform = ?")
            .bind(client_id)
            .bind(platform)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CredentialError::NotFound { client_id, platform });
        }
        info!(client_id, %platform, "revoked credentials");
        Ok(())
    }

    /// Return a token usable for at least the refresh margin, refreshing and
    /// persisting it when needed and possible.
    pub async fn fresh_token(&self, client_id: i64, platform: Platform) -> CredentialResult<TokenData> {
        let token = self
            .get(client_id, platform)
            .await?
            .ok_or(CredentialError::NotFound { client_id, platform })?;

        if !token.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(token);
        }
        if !self.providers.is_configured(platform) || !self.providers.can_refresh(platform, &token) {
            warn!(client_id, %platform, "access token expired and cannot be refreshed");
            return Ok(token);
        }

        let refreshed = self
            .providers
            .refresh(platform, &token)
            .await
            .map_err(|err| CredentialError::Refresh {
                platform,
                message: err.to_string(),
            })?;
        self.upsert(client_id, platform, &refreshed).await?;
        info!(client_id, %platform, "refreshed access token");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ProviderCredentials,
        db::testing::memory_pool,
        services::{client_service::ClientService, oauth_providers::ProviderEndpoints},
        test_support::MockServer,
    };
    use axum::{Form, Json as AxumJson, Router, routing::post};
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    async fn setup(providers: OAuthProviders) -> (CredentialService, i64) {
        let pool = memory_pool().await;
        let client = ClientService::new(pool.clone())
            .create_client("Creds")
            .await
            .unwrap();
        (CredentialService::new(pool, Arc::new(providers)), client.id)
    }

    fn no_providers() -> OAuthProviders {
        OAuthProviders::new(reqwest::Client::new(), "http://cb", &[])
    }

    fn token(access: &str) -> TokenData {
        TokenData {
            access_token: access.into(),
            refresh_token: Some("rt".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let (service, client_id) = setup(no_providers()).await;
        service.upsert(client_id, Platform::Youtube, &token("one")).await.unwrap();
        service.upsert(client_id, Platform::Youtube, &token("two")).await.unwrap();

        let stored = service.get(client_id, Platform::Youtube).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "two");

        let summaries = service.list_summaries(client_id).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].has_refresh_token);
    }

    #[tokio::test]
    async fn upsert_for_unknown_client_fails() {
        let (service, _) = setup(no_providers()).await;
        assert!(matches!(
            service.upsert(999, Platform::Tiktok, &token("x")).await,
            Err(CredentialError::ClientNotFound(999))
        ));
        assert!(matches!(
            service.upsert(999, Platform::Tiktok, &token(" ")).await,
            Err(CredentialError::EmptyAccessToken)
        ));
    }

    #[tokio::test]
    async fn revoke_deletes_tokens() {
        let (service, client_id) = setup(no_providers()).await;
        service.upsert(client_id, Platform::Tiktok, &token("x")).await.unwrap();
        service.revoke(client_id, Platform::Tiktok).await.unwrap();
        assert!(service.get(client_id, Platform::Tiktok).await.unwrap().is_none());
        assert!(matches!(
            service.revoke(client_id, Platform::Tiktok).await,
            Err(CredentialError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn valid_token_is_returned_untouched() {
        let (service, client_id) = setup(no_providers()).await;
        let mut t = token("valid");
        t.expires_at = Some(Utc::now() + Duration::hours(1));
        service.upsert(client_id, Platform::Youtube, &t).await.unwrap();

        let fresh = service.fresh_token(client_id, Platform::Youtube).await.unwrap();
        assert_eq!(fresh.access_token, "valid");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "refresh_token");
                assert_eq!(form["refresh_token"], "rt");
                AxumJson(json!({"access_token": "renewed", "expires_in": 3600}))
            }),
        );
        let server = MockServer::start(app).await;
        let providers = OAuthProviders::new(
            reqwest::Client::new(),
            "http://cb",
            &[ProviderCredentials {
                platform: Platform::Youtube,
                client_id: "id".into(),
                client_secret: "secret".into(),
            }],
        )
        .with_endpoints(
            Platform::Youtube,
            ProviderEndpoints {
                authorize_url: server.url("/auth"),
                token_url: server.url("/token"),
            },
        );
        let (service, client_id) = setup(providers).await;
        let mut t = token("stale");
        t.expires_at = Some(Utc::now() - Duration::minutes(5));
        service.upsert(client_id, Platform::Youtube, &t).await.unwrap();

        let fresh = service.fresh_token(client_id, Platform::Youtube).await.unwrap();
        assert_eq!(fresh.access_token, "renewed");
        assert_eq!(fresh.refresh_token.as_deref(), Some("rt"));

        let stored = service.get(client_id, Platform::Youtube).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "renewed");
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_passed_through() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/token",
            post(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                AxumJson(json!({"access_token": "unexpected"}))
            }),
        );
        let server = MockServer::start(app).await;
        let providers = OAuthProviders::new(
            reqwest::Client::new(),
            "http://cb",
            &[ProviderCredentials {
                platform: Platform::Youtube,
                client_id: "id".into(),
                client_secret: "secret".into(),
            }],
        )
        .with_endpoints(
            Platform::Youtube,
            ProviderEndpoints {
                authorize_url: server.url("/auth"),
                token_url: server.url("/token"),
            },
        );
        let (service, client_id) = setup(providers).await;
        let t = TokenData {
            access_token: "stale".into(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::minutes(5)),
            ..Default::default()
        };
        service.upsert(client_id, Platform::Youtube, &t).await.unwrap();

        let fresh = service.fresh_token(client_id, Platform::Youtube).await.unwrap();
        assert_eq!(fresh.access_token, "stale");
        assert!(fresh.refresh_token.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credentials_are_reported() {
        let (service, client_id) = setup(no_providers()).await;
        assert!(matches!(
            service.fresh_token(client_id, Platform::Instagram).await,
            Err(CredentialError::NotFound { platform: Platform::Instagram, .. })
        ));
    }
}
