//! YouTube Data API v3 resumable uploads.

use super::{PublishError, PublishJob, PublishReceipt, PublishResult, Publisher, PublisherSettings, read_json};
use crate::models::{credential::TokenData, platform::Platform};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;

/// YouTube caps titles at 100 characters.
const MAX_TITLE_CHARS: usize = 100;
/// "People & Blogs"
const DEFAULT_CATEGORY: &str = "22";

pub struct YouTubePublisher {
    http: reqwest::Client,
    base_url: String,
    privacy: String,
}

#[derive(Deserialize)]
struct UploadedVideo {
    id: String,
}

impl YouTubePublisher {
    pub fn new(http: reqwest::Client, settings: &PublisherSettings) -> Self {
        Self {
            http,
            base_url: settings.youtube_base.trim_end_matches('/').to_string(),
            privacy: settings.youtube_privacy.clone(),
        }
    }
}

/// Angle brackets are rejected in titles and descriptions.
fn sanitize(text: &str) -> String {
    text.chars().filter(|c| *c != '<' && *c != '>').collect()
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn publish(&self, job: &PublishJob, token: &TokenData) -> PublishResult<PublishReceipt> {
        let title: String = sanitize(&job.title).chars().take(MAX_TITLE_CHARS).collect();
        let metadata = json!({
            "snippet": {
                "title": title,
                "description": sanitize(job.description.as_deref().unwrap_or_default()),
                "categoryId": DEFAULT_CATEGORY,
            },
            "status": {
                "privacyStatus": self.privacy,
                "selfDeclaredMadeForKids": false,
            }
        });

        info!(post_id = job.post_id, "[YouTube API] Starting resumable upload: '{}'", title);
        let session = self
            .http
            .post(format!("{}/upload/youtube/v3/videos", self.base_url))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&token.access_token)
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", job.video_size.to_string())
            .json(&metadata)
            .send()
            .await?;

        let status = session.status();
        if !status.is_success() {
            return Err(PublishError::Api {
                platform: Platform::Youtube,
                status: status.as_u16(),
                body: super::truncate(&session.text().await.unwrap_or_default(), 300),
            });
        }
        let upload_url = session
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PublishError::Rejected {
                platform: Platform::Youtube,
                message: "upload session did not return a Location header".into(),
            })?;

        let file = File::open(&job.video_path).await?;
        let response = self
            .http
            .put(upload_url)
            .bearer_auth(&token.access_token)
            .header(header::CONTENT_TYPE, "video/mp4")
            .header(header::CONTENT_LENGTH, job.video_size.to_string())
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let video: UploadedVideo = read_json(Platform::Youtube, response).await?;
        info!(post_id = job.post_id, video_id = %video.id, "[YouTube API] Upload complete");
        Ok(PublishReceipt { remote_id: video.id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{publishers::testing, test_support::MockServer};
    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, StatusCode, header as axum_header},
        response::IntoResponse,
        routing::{post, put},
    };
    use serde_json::Value;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    #[derive(Clone, Default)]
    struct Seen {
        metadata: Arc<Mutex<Option<Value>>>,
        uploaded: Arc<Mutex<Vec<u8>>>,
        base: Arc<Mutex<String>>,
    }

    async fn start_session(
        State(seen): State<Seen>,
        Query(q): Query<HashMap<String, String>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        assert_eq!(q["uploadType"], "resumable");
        assert_eq!(
            headers.get(axum_header::AUTHORIZATION).unwrap(),
            "Bearer yt-token"
        );
        *seen.metadata.lock().unwrap() = Some(body);
        let location = format!("{}/session/abc", seen.base.lock().unwrap());
        (StatusCode::OK, [(axum_header::LOCATION, location)])
    }

    async fn upload(State(seen): State<Seen>, body: Bytes) -> impl IntoResponse {
        *seen.uploaded.lock().unwrap() = body.to_vec();
        Json(serde_json::json!({"id": "yt-video-1", "kind": "youtube#video"}))
    }

    #[tokio::test]
    async fn uploads_through_resumable_session() {
        let seen = Seen::default();
        let app = Router::new()
            .route("/upload/youtube/v3/videos", post(start_session))
            .route("/session/abc", put(upload))
            .with_state(seen.clone());
        let server = MockServer::start(app).await;
        *seen.base.lock().unwrap() = server.url("");

        let dir = tempfile::tempdir().unwrap();
        let mut job = testing::job(dir.path(), b"video-bytes");
        job.title = "<b>Launch</b> day".into();
        let publisher = YouTubePublisher::new(reqwest::Client::new(), &testing::settings(&server.url("")));

        let receipt = publisher.publish(&job, &testing::token("yt-token")).await.unwrap();
        assert_eq!(receipt.remote_id, "yt-video-1");
        assert_eq!(seen.uploaded.lock().unwrap().as_slice(), b"video-bytes");

        let metadata = seen.metadata.lock().unwrap().clone().unwrap();
        assert_eq!(metadata["snippet"]["title"], "bLaunch/b day");
        assert_eq!(metadata["status"]["privacyStatus"], "private");
    }

    #[tokio::test]
    async fn rejected_session_reports_status() {
        let app = Router::new().route(
            "/upload/youtube/v3/videos",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid credentials") }),
        );
        let server = MockServer::start(app).await;
        let dir = tempfile::tempdir().unwrap();
        let publisher = YouTubePublisher::new(reqwest::Client::new(), &testing::settings(&server.url("")));

        let err = publisher
            .publish(&testing::job(dir.path(), b"v"), &testing::token("bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Api { status: 401, .. }));
    }
}
