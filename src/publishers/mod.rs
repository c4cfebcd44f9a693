//! Platform publishers.
//!
//! Each publisher turns a downloaded video plus the client's token into a
//! post on one platform. They share one `reqwest::Client` and report
//! failures as `PublishError`; the manager records the outcome per platform.

pub mod facebook;
pub mod instagram;
pub mod tiktok;
pub mod youtube;

use crate::models::{credential::TokenData, platform::Platform};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, io, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{platform} API returned HTTP {status}: {body}")]
    Api {
        platform: Platform,
        status: u16,
        body: String,
    },
    #[error("{platform} rejected the upload: {message}")]
    Rejected { platform: Platform, message: String },
    #[error("{platform}: {message}")]
    Precondition { platform: Platform, message: String },
    #[error("{0} did not finish processing the video in time")]
    Timeout(Platform),
    #[error("no publisher registered for {0}")]
    Unsupported(Platform),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type PublishResult<T> = Result<T, PublishError>;

/// Everything a publisher needs to know about one post.
#[derive(Clone, Debug)]
pub struct PublishJob {
    pub post_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Local copy of the video.
    pub video_path: PathBuf,
    pub video_size: u64,
    /// Public URL of the same video, for platforms that pull it.
    pub video_url: Option<String>,
}

impl PublishJob {
    /// Title, then the description after a blank line when present.
    pub fn caption(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(desc) if !desc.is_empty() => format!("{}\n\n{}", self.title, desc),
            _ => self.title.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PublishReceipt {
    /// Identifier the platform assigned to the upload.
    pub remote_id: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish(&self, job: &PublishJob, token: &TokenData) -> PublishResult<PublishReceipt>;
}

/// Base URLs and per-platform options.
#[derive(Clone, Debug)]
pub struct PublisherSettings {
    pub youtube_base: String,
    pub tiktok_base: String,
    pub graph_base: String,
    pub youtube_privacy: String,
    pub tiktok_privacy: String,
    pub container_poll_interval: Duration,
    pub container_poll_attempts: u32,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            youtube_base: "https://www.googleapis.com".into(),
            tiktok_base: "https://open.tiktokapis.com".into(),
            graph_base: "https://graph.facebook.com/v19.0".into(),
            youtube_privacy: "private".into(),
            tiktok_privacy: "SELF_ONLY".into(),
            container_poll_interval: Duration::from_secs(5),
            container_poll_attempts: 60,
        }
    }
}

#[derive(Clone, Default)]
pub struct PublisherRegistry {
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in publishers.
    pub fn standard(http: reqwest::Client, settings: &PublisherSettings) -> Self {
        Self::new()
            .register(Arc::new(youtube::YouTubePublisher::new(http.clone(), settings)))
            .register(Arc::new(tiktok::TikTokPublisher::new(http.clone(), settings)))
            .register(Arc::new(instagram::InstagramPublisher::new(http.clone(), settings)))
            .register(Arc::new(facebook::FacebookPublisher::new(http, settings)))
    }

    pub fn register(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.insert(publisher.platform(), publisher);
        self
    }

    pub fn get(&self, platform: Platform) -> PublishResult<Arc<dyn Publisher>> {
        self.publishers
            .get(&platform)
            .cloned()
            .ok_or(PublishError::Unsupported(platform))
    }
}

/// Fail on non-2xx responses, otherwise decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: Platform,
    response: reqwest::Response,
) -> PublishResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(PublishError::Api {
            platform,
            status: status.as_u16(),
            body: truncate(&body, 300),
        });
    }
    serde_json::from_str(&body).map_err(|err| PublishError::Rejected {
        platform,
        message: format!("unexpected response ({}): {}", err, truncate(&body, 300)),
    })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
