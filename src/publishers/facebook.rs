//! Facebook Page Reels via the Graph API `video_reels` endpoint.

use super::{PublishError, PublishJob, PublishReceipt, PublishResult, Publisher, PublisherSettings, read_json};
use crate::models::{credential::TokenData, platform::Platform};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

pub struct FacebookPublisher {
    http: reqwest::Client,
    graph_base: String,
}

#[derive(Deserialize)]
struct PageToken {
    access_token: String,
}

#[derive(Deserialize)]
struct StartedUpload {
    video_id: String,
}

#[derive(Deserialize)]
struct Success {
    #[serde(default)]
    success: bool,
}

impl FacebookPublisher {
    pub fn new(http: reqwest::Client, settings: &PublisherSettings) -> Self {
        Self {
            http,
            graph_base: settings.graph_base.trim_end_matches('/').to_string(),
        }
    }

    fn rejected(message: impl Into<String>) -> PublishError {
        PublishError::Rejected {
            platform: Platform::Facebook,
            message: message.into(),
        }
    }

    fn precondition(message: &str) -> PublishError {
        PublishError::Precondition {
            platform: Platform::Facebook,
            message: message.to_string(),
        }
    }

    /// Reels are posted with the page's own token, not the user's.
    async fn page_token(&self, page_id: &str, user_token: &str) -> PublishResult<String> {
        let response = self
            .http
            .get(format!("{}/{}", self.graph_base, page_id))
            .query(&[("fields", "access_token"), ("access_token", user_token)])
            .send()
            .await?;
        let page: PageToken = read_json(Platform::Facebook, response).await?;
        Ok(page.access_token)
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, job: &PublishJob, token: &TokenData) -> PublishResult<PublishReceipt> {
        let page_id = token
            .extra_str("page_id")
            .ok_or_else(|| Self::precondition("credentials carry no page_id"))?;
        let video_url = job
            .video_url
            .as_deref()
            .ok_or_else(|| Self::precondition("a public media URL is required for Reels"))?;

        info!(post_id = job.post_id, "[Facebook API] Uploading Page Reel: '{}'", job.title);
        let page_token = self.page_token(&page_id, &token.access_token).await?;
        let reels_url = format!("{}/{}/video_reels", self.graph_base, page_id);

        let response = self
            .http
            .post(&reels_url)
            .form(&[("upload_phase", "start"), ("access_token", page_token.as_str())])
            .send()
            .await?;
        let started: StartedUpload = read_json(Platform::Facebook, response).await?;

        let response = self
            .http
            .post(format!("{}/{}", self.graph_base, started.video_id))
            .form(&[
                ("video_file_url", video_url),
                ("access_token", page_token.as_str()),
            ])
            .send()
            .await?;
        let hosted: Success = read_json(Platform::Facebook, response).await?;
        if !hosted.success {
            return Err(Self::rejected("hosted file upload was not accepted"));
        }

        let caption = job.caption();
        let response = self
            .http
            .post(&reels_url)
            .form(&[
                ("upload_phase", "finish"),
                ("video_id", started.video_id.as_str()),
                ("video_state", "PUBLISHED"),
                ("description", caption.as_str()),
                ("access_token", page_token.as_str()),
            ])
            .send()
            .await?;
        let finished: Success = read_json(Platform::Facebook, response).await?;
        if !finished.success {
            return Err(Self::rejected("finish phase did not report success"));
        }

        info!(post_id = job.post_id, video_id = %started.video_id, "[Facebook API] Reel published");
        Ok(PublishReceipt {
            remote_id: started.video_id,
        })
    }
}
