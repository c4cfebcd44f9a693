//! OAuth 2.0 endpoints of the supported platforms.
//!
//! Builds consent URLs and talks to token endpoints. Holds no state besides
//! the configured applications; persistence lives in `OAuthService` and
//! `CredentialService`.

use crate::{
    config::ProviderCredentials,
    models::{credential::TokenData, platform::Platform},
};
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("platform `{0}` is not configured for OAuth")]
    NotConfigured(Platform),
    #[error("{platform} token endpoint rejected the request: {message}")]
    Provider { platform: Platform, message: String },
    #[error("{0} token cannot be refreshed")]
    CannotRefresh(Platform),
    #[error("invalid URL: {0}")]
    Url(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type OAuthResult<T> = Result<T, OAuthError>;

/// Consent and token endpoints for one platform.
#[derive(Clone, Debug)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
}

impl ProviderEndpoints {
    pub fn default_for(platform: Platform) -> Self {
        let (authorize_url, token_url) = match platform {
            Platform::Youtube => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
            ),
            Platform::Tiktok => (
                "https://www.tiktok.com/v2/auth/authorize/",
                "https://open.tiktokapis.com/v2/oauth/token/",
            ),
            Platform::Instagram | Platform::Facebook => (
                "https://www.facebook.com/v19.0/dialog/oauth",
                "https://graph.facebook.com/v19.0/oauth/access_token",
            ),
        };
        Self {
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
        }
    }
}

fn scopes(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Youtube => &["https://www.googleapis.com/auth/youtube.upload"],
        Platform::Tiktok => &["video.publish", "video.upload"],
        Platform::Instagram => &[
            "instagram_basic",
            "instagram_content_publish",
            "pages_show_list",
        ],
        Platform::Facebook => &[
            "pages_show_list",
            "pages_read_engagement",
            "pages_manage_posts",
        ],
    }
}

/// TikTok names the application id `client_key`.
fn client_id_param(platform: Platform) -> &'static str {
    match platform {
        Platform::Tiktok => "client_key",
        _ => "client_id",
    }
}

fn is_meta(platform: Platform) -> bool {
    matches!(platform, Platform::Instagram | Platform::Facebook)
}

#[derive(Clone, Debug)]
struct Provider {
    client_id: String,
    client_secret: String,
    endpoints: ProviderEndpoints,
}

/// Raw token endpoint payload shared by Google, TikTok and Meta.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    error: Option<Value>,
    error_description: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TokenResponse {
    fn into_token(self, platform: Platform) -> OAuthResult<TokenData> {
        if let Some(error) = self.error {
            let message = self.error_description.unwrap_or_else(|| match error {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return Err(OAuthError::Provider { platform, message });
        }
        let access_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::Provider {
                platform,
                message: "response did not contain an access_token".into(),
            })?;
        Ok(TokenData {
            access_token,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            token_type: self.token_type,
            expires_at: self
                .expires_in
                .map(|secs| Utc::now() + Duration::seconds(secs)),
            scope: self.scope,
            extra: self.extra,
        })
    }
}

/// Configured OAuth applications keyed by platform.
#[derive(Clone)]
pub struct OAuthProviders {
    http: reqwest::Client,
    redirect_uri: String,
    providers: HashMap<Platform, Provider>,
}

impl OAuthProviders {
    pub fn new(
        http: reqwest::Client,
        redirect_uri: impl Into<String>,
        credentials: &[ProviderCredentials],
    ) -> Self {
        let providers = credentials
            .iter()
            .map(|c| {
                (
                    c.platform,
                    Provider {
                        client_id: c.client_id.clone(),
                        client_secret: c.client_secret.clone(),
                        endpoints: ProviderEndpoints::default_for(c.platform),
                    },
                )
            })
            .collect();
        Self {
            http,
            redirect_uri: redirect_uri.into(),
            providers,
        }
    }

    /// Point a configured platform at different endpoints.
    pub fn with_endpoints(mut self, platform: Platform, endpoints: ProviderEndpoints) -> Self {
        if let Some(provider) = self.providers.get_mut(&platform) {
            provider.endpoints = endpoints;
        }
        self
    }

    pub fn is_configured(&self, platform: Platform) -> bool {
        self.providers.contains_key(&platform)
    }

    fn provider(&self, platform: Platform) -> OAuthResult<&Provider> {
        self.providers
            .get(&platform)
            .ok_or(OAuthError::NotConfigured(platform))
    }

    /// Consent screen URL carrying `state` back to the callback.
    pub fn authorization_url(&self, platform: Platform, state: &str) -> OAuthResult<String> {
        let provider = self.provider(platform)?;
        let separator = if platform == Platform::Tiktok { "," } else { " " };
        let scope = scopes(platform).join(separator);

        let mut params = vec![
            (client_id_param(platform), provider.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state),
        ];
        if platform == Platform::Youtube {
            params.push(("access_type", "offline"));
            params.push(("prompt", "consent"));
        }

        Url::parse_with_params(&provider.endpoints.authorize_url, &params)
            .map(String::from)
            .map_err(|err| OAuthError::Url(err.to_string()))
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, platform: Platform, code: &str) -> OAuthResult<TokenData> {
        let provider = self.provider(platform)?;
        let params = [
            (client_id_param(platform), provider.client_id.as_str()),
            ("client_secret", provider.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        self.token_request(platform, provider, &params).await
    }

    /// Whether `refresh` can produce a new access token for this token.
    pub fn can_refresh(&self, platform: Platform, token: &TokenData) -> bool {
        if is_meta(platform) {
            // Long-lived Meta tokens are extended with the still-valid token itself.
            !token.expires_within(Utc::now(), Duration::zero())
        } else {
            token.refresh_token.is_some()
        }
    }

    /// Obtain a new access token, keeping fields the provider did not resend.
    pub async fn refresh(&self, platform: Platform, current: &TokenData) -> OAuthResult<TokenData> {
        let provider = self.provider(platform)?;
        if !self.can_refresh(platform, current) {
            return Err(OAuthError::CannotRefresh(platform));
        }

        let fresh = if is_meta(platform) {
            let params = [
                ("grant_type", "fb_exchange_token"),
                ("client_id", provider.client_id.as_str()),
                ("client_secret", provider.client_secret.as_str()),
                ("fb_exchange_token", current.access_token.as_str()),
            ];
            self.token_request(platform, provider, &params).await?
        } else {
            let refresh_token = current.refresh_token.as_deref().unwrap_or_default();
            let params = [
                (client_id_param(platform), provider.client_id.as_str()),
                ("client_secret", provider.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ];
            self.token_request(platform, provider, &params).await?
        };

        Ok(merge_tokens(current, fresh))
    }

    async fn token_request(
        &self,
        platform: Platform,
        provider: &Provider,
        params: &[(&str, &str)],
    ) -> OAuthResult<TokenData> {
        debug!(%platform, url = %provider.endpoints.token_url, "calling token endpoint");
        let response = self
            .http
            .post(&provider.endpoints.token_url)
            .form(params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(parsed) => parsed.into_token(platform),
            Err(_) => Err(OAuthError::Provider {
                platform,
                message: format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            }),
        }
    }
}

/// Overlay a refreshed token on the stored one.
pub fn merge_tokens(current: &TokenData, fresh: TokenData) -> TokenData {
    let mut extra = current.extra.clone();
    extra.extend(fresh.extra);
    TokenData {
        access_token: fresh.access_token,
        refresh_token: fresh.refresh_token.or_else(|| current.refresh_token.clone()),
        token_type: fresh.token_type.or_else(|| current.token_type.clone()),
        expires_at: fresh.expires_at,
        scope: fresh.scope.or_else(|| current.scope.clone()),
        extra,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockServer;
    use axum::{Form, Json, Router, routing::post};
    use serde_json::json;

    fn creds(platform: Platform) -> Vec<ProviderCredentials> {
        vec![ProviderCredentials {
            platform,
            client_id: "app-id".into(),
            client_secret: "app-secret".into(),
        }]
    }

    fn query_map(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn google_consent_url_requests_offline_access() {
        let providers = OAuthProviders::new(
            reqwest::Client::new(),
            "http://localhost:8000/auth/callback",
            &creds(Platform::Youtube),
        );
        let url = providers.authorization_url(Platform::Youtube, "st4te").unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));

        let q = query_map(&url);
        assert_eq!(q["client_id"], "app-id");
        assert_eq!(q["state"], "st4te");
        assert_eq!(q["access_type"], "offline");
        assert_eq!(q["prompt"], "consent");
        assert_eq!(q["redirect_uri"], "http://localhost:8000/auth/callback");
        assert_eq!(q["scope"], "https://www.googleapis.com/auth/youtube.upload");
    }

    #[test]
    fn tiktok_uses_client_key_and_comma_scopes() {
        let providers = OAuthProviders::new(reqwest::Client::new(), "http://cb", &creds(Platform::Tiktok));
        let q = query_map(&providers.authorization_url(Platform::Tiktok, "s").unwrap());
        assert_eq!(q["client_key"], "app-id");
        assert!(!q.contains_key("client_id"));
        assert_eq!(q["scope"], "video.publish,video.upload");
    }

    #[test]
    fn unconfigured_platform_is_rejected() {
        let providers = OAuthProviders::new(reqwest::Client::new(), "http://cb", &[]);
        assert!(matches!(
            providers.authorization_url(Platform::Facebook, "s"),
            Err(OAuthError::NotConfigured(Platform::Facebook))
        ));
    }

    #[test]
    fn merge_keeps_refresh_token_and_extras() {
        let mut current = TokenData {
            access_token: "old".into(),
            refresh_token: Some("refresh".into()),
            ..Default::default()
        };
        current.extra.insert("page_id".into(), json!("99"));
        let fresh = TokenData {
            access_token: "new".into(),
            ..Default::default()
        };
        let merged = merge_tokens(&current, fresh);
        assert_eq!(merged.access_token, "new");
        assert_eq!(merged.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(merged.extra_str("page_id").as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn exchanges_code_with_form_post() {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "authorization_code");
                assert_eq!(form["client_key"], "app-id");
                assert_eq!(form["code"], "the-code");
                Json(json!({
                    "access_token": "at-1",
                    "refresh_token": "rt-1",
                    "expires_in": 86400,
                    "open_id": "tt-user",
                    "scope": "video.publish"
                }))
            }),
        );
        let server = MockServer::start(app).await;
        let providers = OAuthProviders::new(reqwest::Client::new(), "http://cb", &creds(Platform::Tiktok))
            .with_endpoints(
                Platform::Tiktok,
                ProviderEndpoints {
                    authorize_url: server.url("/authorize"),
                    token_url: server.url("/token"),
                },
            );

        let token = providers.exchange_code(Platform::Tiktok, "the-code").await.unwrap();
        assert_eq!(token.access_token, "at-1");
        assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(token.extra_str("open_id").as_deref(), Some("tt-user"));
        assert!(token.expires_at.unwrap() > Utc::now() + Duration::hours(23));
    }

    #[tokio::test]
    async fn provider_error_is_reported() {
        let app = Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant", "error_description": "Bad code"})),
                )
            }),
        );
        let server = MockServer::start(app).await;
        let providers = OAuthProviders::new(reqwest::Client::new(), "http://cb", &creds(Platform::Youtube))
            .with_endpoints(
                Platform::Youtube,
                ProviderEndpoints {
                    authorize_url: server.url("/authorize"),
                    token_url: server.url("/token"),
                },
            );

        let err = providers.exchange_code(Platform::Youtube, "bad").await.unwrap_err();
        assert_eq!(err.to_string(), "youtube token endpoint rejected the request: Bad code");
    }

    #[tokio::test]
    async fn meta_refresh_uses_exchange_grant() {
        let app = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "fb_exchange_token");
                assert_eq!(form["client_id"], "app-id");
                assert_eq!(form["fb_exchange_token"], "short");
                Json(json!({"access_token": "long", "token_type": "bearer", "expires_in": 5183944}))
            }),
        );
        let server = MockServer::start(app).await;
        let providers = OAuthProviders::new(reqwest::Client::new(), "http://cb", &creds(Platform::Facebook))
            .with_endpoints(
                Platform::Facebook,
                ProviderEndpoints {
                    authorize_url: server.url("/authorize"),
                    token_url: server.url("/token"),
                },
            );

        let mut current = TokenData {
            access_token: "short".into(),
            expires_at: Some(Utc::now() + Duration::minutes(30)),
            ..Default::default()
        };
        current.extra.insert("page_id".into(), json!("42"));

        let refreshed = providers.refresh(Platform::Facebook, &current).await.unwrap();
        assert_eq!(refreshed.access_token, "long");
        assert_eq!(refreshed.extra_str("page_id").as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_fast() {
        let providers = OAuthProviders::new(reqwest::Client::new(), "http://cb", &creds(Platform::Youtube));
        let token = TokenData {
            access_token: "a".into(),
            ..Default::default()
        };
        assert!(matches!(
            providers.refresh(Platform::Youtube, &token).await,
            Err(OAuthError::CannotRefresh(Platform::Youtube))
        ));
    }
}
