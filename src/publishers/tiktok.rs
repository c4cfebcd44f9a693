//! TikTok Content Posting API, direct post with chunked file upload.

use super::{PublishError, PublishJob, PublishReceipt, PublishResult, Publisher, PublisherSettings, read_json};
use crate::models::{credential::TokenData, platform::Platform};
use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use std::io::SeekFrom;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::{debug, info};

/// 10 MiB, inside TikTok's 5–64 MB window for all but the last chunk.
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024;
const MAX_CAPTION_CHARS: usize = 2200;

/// How a file is split into upload chunks.
///
/// Files up to one chunk go in a single request; otherwise the count is
/// `size / CHUNK_SIZE` and the last chunk absorbs the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub video_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

impl ChunkPlan {
    pub fn for_size(video_size: u64) -> Self {
        if video_size <= CHUNK_SIZE {
            Self {
                video_size,
                chunk_size: video_size,
                total_chunks: 1,
            }
        } else {
            Self {
                video_size,
                chunk_size: CHUNK_SIZE,
                total_chunks: video_size / CHUNK_SIZE,
            }
        }
    }

    /// Inclusive byte ranges, one per chunk.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        (0..self.total_chunks)
            .map(|i| {
                let start = i * self.chunk_size;
                let end = if i + 1 == self.total_chunks {
                    self.video_size - 1
                } else {
                    start + self.chunk_size - 1
                };
                (start, end)
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct InitResponse {
    data: Option<InitData>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct InitData {
    publish_id: String,
    upload_url: String,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    message: String,
}

pub struct TikTokPublisher {
    http: reqwest::Client,
    base_url: String,
    privacy: String,
}

impl TikTokPublisher {
    pub fn new(http: reqwest::Client, settings: &PublisherSettings) -> Self {
        Self {
            http,
            base_url: settings.tiktok_base.trim_end_matches('/').to_string(),
            privacy: settings.tiktok_privacy.clone(),
        }
    }
}

#[async_trait]
impl Publisher for TikTokPublisher {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    async fn publish(&self, job: &PublishJob, token: &TokenData) -> PublishResult<PublishReceipt> {
        if job.video_size == 0 {
            return Err(PublishError::Precondition {
                platform: Platform::Tiktok,
                message: "video file is empty".into(),
            });
        }
        let plan = ChunkPlan::for_size(job.video_size);
        let caption: String = job.caption().chars().take(MAX_CAPTION_CHARS).collect();

        info!(post_id = job.post_id, chunks = plan.total_chunks, "[TikTok API] Initializing upload: '{}'", job.title);
        let response = self
            .http
            .post(format!("{}/v2/post/publish/video/init/", self.base_url))
            .bearer_auth(&token.access_token)
            .json(&json!({
                "post_info": {
                    "title": caption,
                    "privacy_level": self.privacy,
                },
                "source_info": {
                    "source": "FILE_UPLOAD",
                    "video_size": plan.video_size,
                    "chunk_size": plan.chunk_size,
                    "total_chunk_count": plan.total_chunks,
                }
            }))
            .send()
            .await?;
        let init: InitResponse = read_json(Platform::Tiktok, response).await?;

        if let Some(error) = init.error.filter(|e| e.code != "ok") {
            return Err(PublishError::Rejected {
                platform: Platform::Tiktok,
                message: format!("{}: {}", error.code, error.message),
            });
        }
        let data = init.data.ok_or_else(|| PublishError::Rejected {
            platform: Platform::Tiktok,
            message: "init response carried no upload data".into(),
        })?;

        let mut file = File::open(&job.video_path).await?;
        for (start, end) in plan.ranges() {
            let len = (end - start + 1) as usize;
            let mut buf = vec![0u8; len];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut buf).await?;

            debug!("[TikTok API] Uploading bytes {}-{}/{}", start, end, plan.video_size);
            let response = self
                .http
                .put(&data.upload_url)
                .header(header::CONTENT_TYPE, "video/mp4")
                .header(header::CONTENT_LENGTH, len.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, plan.video_size),
                )
                .body(buf)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(PublishError::Api {
                    platform: Platform::Tiktok,
                    status: status.as_u16(),
                    body: super::truncate(&response.text().await.unwrap_or_default(), 300),
                });
            }
        }

        info!(post_id = job.post_id, publish_id = %data.publish_id, "[TikTok API] Upload complete");
        Ok(PublishReceipt {
            remote_id: data.publish_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{publishers::testing, test_support::MockServer};
    use axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode, header as axum_header},
        routing::{post, put},
    };
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    #[test]
    fn small_files_are_one_chunk() {
        let plan = ChunkPlan::for_size(1_000);
        assert_eq!(plan.total_chunks, 1);
        assert_eq!(plan.chunk_size, 1_000);
        assert_eq!(plan.ranges(), vec![(0, 999)]);
    }

    #[test]
    fn remainder_goes_to_last_chunk() {
        let size = CHUNK_SIZE * 2 + 123;
        let plan = ChunkPlan::for_size(size);
        assert_eq!(plan.total_chunks, 2);
        assert_eq!(
            plan.ranges(),
            vec![(0, CHUNK_SIZE - 1), (CHUNK_SIZE, size - 1)]
        );
    }

    #[test]
    fn exact_multiple_has_no_short_chunk() {
        let plan = ChunkPlan::for_size(CHUNK_SIZE * 3);
        assert_eq!(plan.total_chunks, 3);
        assert_eq!(plan.ranges().last(), Some(&(CHUNK_SIZE * 2, CHUNK_SIZE * 3 - 1)));
    }

    #[derive(Clone, Default)]
    struct Seen {
        init: Arc<Mutex<Option<Value>>>,
        ranges: Arc<Mutex<Vec<String>>>,
        bytes: Arc<Mutex<Vec<u8>>>,
        base: Arc<Mutex<String>>,
    }

    #[tokio::test]
    async fn initializes_then_uploads_chunks() {
        let seen = Seen::default();
        let app = Router::new()
            .route(
                "/v2/post/publish/video/init/",
                post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    *seen.init.lock().unwrap() = Some(body);
                    let upload_url = format!("{}/upload/xyz", seen.base.lock().unwrap());
                    Json(serde_json::json!({
                        "data": {"publish_id": "v_pub_file~v2.1", "upload_url": upload_url},
                        "error": {"code": "ok", "message": "", "log_id": "1"}
                    }))
                }),
            )
            .route(
                "/upload/xyz",
                put(|State(seen): State<Seen>, headers: HeaderMap, body: Bytes| async move {
                    let range = headers
                        .get(axum_header::CONTENT_RANGE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    seen.ranges.lock().unwrap().push(range);
                    seen.bytes.lock().unwrap().extend_from_slice(&body);
                    StatusCode::CREATED
                }),
            )
            .with_state(seen.clone());
        let server = MockServer::start(app).await;
        *seen.base.lock().unwrap() = server.url("");

        let dir = tempfile::tempdir().unwrap();
        let job = testing::job(dir.path(), b"tiktok-video");
        let publisher = TikTokPublisher::new(reqwest::Client::new(), &testing::settings(&server.url("")));

        let receipt = publisher.publish(&job, &testing::token("tt")).await.unwrap();
        assert_eq!(receipt.remote_id, "v_pub_file~v2.1");
        assert_eq!(seen.ranges.lock().unwrap().as_slice(), ["bytes 0-11/12"]);
        assert_eq!(seen.bytes.lock().unwrap().as_slice(), b"tiktok-video");

        let init = seen.init.lock().unwrap().clone().unwrap();
        assert_eq!(init["source_info"]["source"], "FILE_UPLOAD");
        assert_eq!(init["source_info"]["total_chunk_count"], 1);
        assert_eq!(init["post_info"]["privacy_level"], "SELF_ONLY");
    }

    #[tokio::test]
    async fn api_error_code_fails_publish() {
        let app = Router::new().route(
            "/v2/post/publish/video/init/",
            post(|| async {
                Json(serde_json::json!({
                    "error": {"code": "spam_risk_too_many_posts", "message": "daily cap reached"}
                }))
            }),
        );
        let server = MockServer::start(app).await;
        let dir = tempfile::tempdir().unwrap();
        let publisher = TikTokPublisher::new(reqwest::Client::new(), &testing::settings(&server.url("")));

        let err = publisher
            .publish(&testing::job(dir.path(), b"v"), &testing::token("tt"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "tiktok rejected the upload: spam_risk_too_many_posts: daily cap reached"
        );
    }
}
