//! OAuth credentials stored per client and platform.

use crate::models::platform::Platform;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{FromRow, types::Json};

/// Token material returned by a provider's token endpoint.
///
/// Provider-specific keys (`open_id` from TikTok, `page_id` or `ig_user_id`
/// imported for Meta accounts) are kept in `extra` and written back
/// unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TokenData {
    pub access_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Absolute expiry of `access_token`, if the provider reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenData {
    /// True when the access token is expired or expires within `margin`.
    /// Tokens without a known expiry are treated as valid.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at
            .map(|expires_at| expires_at <= now + margin)
            .unwrap_or(false)
    }

    /// Look up a provider-specific string value, accepting numeric ids too.
    pub fn extra_str(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A stored credential row.
#[derive(Clone, FromRow, Debug)]
pub struct SocialCredential {
    pub id: i64,
    pub client_id: i64,
    pub platform: Platform,
    pub token_data: Json<TokenData>,
    pub updated_at: DateTime<Utc>,
}

/// Token-free view of a credential, safe to return from the API.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CredentialSummary {
    pub platform: Platform,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
}

impl From<&SocialCredential> for CredentialSummary {
    fn from(cred: &SocialCredential) -> Self {
        Self {
            platform: cred.platform,
            updated_at: cred.updated_at,
            expires_at: cred.token_data.expires_at,
            has_refresh_token: cred
                .token_data
                .refresh_token
                .as_deref()
                .is_some_and(|t| !t.is_empty()),
        }
    }
}
