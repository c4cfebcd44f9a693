//! Instagram Reels through the Graph API content publishing flow.

use super::{PublishError, PublishJob, PublishReceipt, PublishResult, Publisher, PublisherSettings, read_json};
use crate::models::{credential::TokenData, platform::Platform};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

pub struct InstagramPublisher {
    http: reqwest::Client,
    graph_base: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct ContainerStatus {
    status_code: Option<String>,
    status: Option<String>,
}

impl InstagramPublisher {
    pub fn new(http: reqwest::Client, settings: &PublisherSettings) -> Self {
        Self {
            http,
            graph_base: settings.graph_base.trim_end_matches('/').to_string(),
            poll_interval: settings.container_poll_interval,
            poll_attempts: settings.container_poll_attempts,
        }
    }

    fn precondition(message: &str) -> PublishError {
        PublishError::Precondition {
            platform: Platform::Instagram,
            message: message.to_string(),
        }
    }

    /// Wait until the container has fetched and processed the video.
    async fn wait_for_container(&self, container_id: &str, access_token: &str) -> PublishResult<()> {
        for attempt in 1..=self.poll_attempts {
            let response = self
                .http
                .get(format!("{}/{}", self.graph_base, container_id))
                .query(&[("fields", "status_code,status"), ("access_token", access_token)])
                .send()
                .await?;
            let status: ContainerStatus = read_json(Platform::Instagram, response).await?;

            match status.status_code.as_deref() {
                Some("FINISHED") | Some("PUBLISHED") => return Ok(()),
                Some(code @ ("ERROR" | "EXPIRED")) => {
                    return Err(PublishError::Rejected {
                        platform: Platform::Instagram,
                        message: format!(
                            "container {} {}",
                            code,
                            status.status.unwrap_or_default()
                        )
                        .trim_end()
                        .to_string(),
                    });
                }
                other => {
                    debug!(
                        "[Instagram API] Container {} is {} (attempt {}/{})",
                        container_id,
                        other.unwrap_or("UNKNOWN"),
                        attempt,
                        self.poll_attempts
                    );
                }
            }
            if attempt < self.poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(PublishError::Timeout(Platform::Instagram))
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, job: &PublishJob, token: &TokenData) -> PublishResult<PublishReceipt> {
        let ig_user_id = token
            .extra_str("ig_user_id")
            .ok_or_else(|| Self::precondition("credentials carry no ig_user_id"))?;
        let video_url = job
            .video_url
            .as_deref()
            .ok_or_else(|| Self::precondition("a public media URL is required for Reels"))?;
        let access_token = token.access_token.as_str();

        info!(post_id = job.post_id, "[Instagram API] Uploading Reels: '{}'", job.title);
        let caption = job.caption();
        let response = self
            .http
            .post(format!("{}/{}/media", self.graph_base, ig_user_id))
            .form(&[
                ("media_type", "REELS"),
                ("video_url", video_url),
                ("caption", caption.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await?;
        let container: Created = read_json(Platform::Instagram, response).await?;

        self.wait_for_container(&container.id, access_token).await?;

        let response = self
            .http
            .post(format!("{}/{}/media_publish", self.graph_base, ig_user_id))
            .form(&[
                ("creation_id", container.id.as_str()),
                ("access_token", access_token),
            ])
            .send()
            .await?;
        let media: Created = read_json(Platform::Instagram, response).await?;

        info!(post_id = job.post_id, media_id = %media.id, "[Instagram API] Reel published");
        Ok(PublishReceipt { remote_id: media.id })
    }
}
