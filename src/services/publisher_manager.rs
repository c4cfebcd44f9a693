//! PublisherManager: runs one post through download, publish and cleanup.

use crate::{
    models::{
        platform::Platform,
        post::{DeliveryOutcome, PostStatus, ScheduledPost},
    },
    publishers::{PublishJob, PublisherRegistry},
    services::{
        credential_service::{CredentialError, CredentialService},
        post_service::{PostResult, PostService},
    },
    storage::{MediaSource, sigv4::encode_key, temp},
};
use chrono::Utc;
use std::{path::PathBuf, sync::Arc};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct PublisherManager {
    posts: PostService,
    credentials: CredentialService,
    media: Arc<dyn MediaSource>,
    publishers: PublisherRegistry,
    temp_dir: PathBuf,
    public_media_url: Option<String>,
}

impl PublisherManager {
    pub fn new(
        posts: PostService,
        credentials: CredentialService,
        media: Arc<dyn MediaSource>,
        publishers: PublisherRegistry,
        temp_dir: PathBuf,
        public_media_url: Option<String>,
    ) -> Self {
        Self {
            posts,
            credentials,
            media,
            publishers,
            temp_dir,
            public_media_url,
        }
    }

    /// Claim and publish one post. Returns the final status, or `None` when
    /// the post was not claimable (missing, not pending or not yet due).
    pub async fn process_post(&self, post_id: i64) -> PostResult<Option<PostStatus>> {
        let Some(post) = self.posts.claim(post_id, Utc::now()).await? else {
            debug!(post_id, "post not claimable, skipping");
            return Ok(None);
        };
        info!(">>> [Engine] Processing Post ID: {} | Title: '{}'", post.id, post.title);

        let (status, last_error) = match self.run(&post).await {
            Ok(result) => result,
            Err(err) => {
                error!(post_id, "processing failed: {}", err);
                (PostStatus::Error, Some(format!("internal error: {}", err)))
            }
        };
        self.posts.finish(post.id, status, last_error.as_deref()).await?;

        info!("<<< [Engine] Finished Post ID: {} with status: {}", post.id, status);
        Ok(Some(status))
    }

    async fn run(&self, post: &ScheduledPost) -> PostResult<(PostStatus, Option<String>)> {
        let delivered = self.posts.completed_platforms(post.id).await?;
        let remaining: Vec<Platform> = post
            .platforms
            .iter()
            .copied()
            .filter(|p| !delivered.contains(p))
            .collect();
        if remaining.is_empty() {
            return Ok((PostStatus::Completed, None));
        }
        if !delivered.is_empty() {
            info!(post_id = post.id, "skipping already delivered platforms: {:?}", delivered);
        }

        let path = temp::video_path(&self.temp_dir, post.id);
        let video_size = match self.media.download(&post.video_file_id, &path).await {
            Ok(size) => size,
            Err(err) => {
                warn!(post_id = post.id, "download of '{}' failed: {}", post.video_file_id, err);
                temp::cleanup(&path).await;
                return Ok((PostStatus::Error, Some(format!("download failed: {}", err))));
            }
        };

        let job = PublishJob {
            post_id: post.id,
            title: post.title.clone(),
            description: post.description.clone(),
            video_path: path.clone(),
            video_size,
            video_url: self.public_url(&post.video_file_id),
        };
        let result = self.publish_all(post, &remaining, &job).await;
        temp::cleanup(&path).await;
        let failures = result?;

        if failures.is_empty() {
            Ok((PostStatus::Completed, None))
        } else {
            Ok((PostStatus::Error, Some(failures.join("; "))))
        }
    }

    /// Publish to each platform in turn; one failing never stops the rest.
    async fn publish_all(
        &self,
        post: &ScheduledPost,
        platforms: &[Platform],
        job: &PublishJob,
    ) -> PostResult<Vec<String>> {
        let mut failures = Vec::new();
        for &platform in platforms {
            let outcome = self.deliver(post.client_id, platform, job).await;
            match &outcome {
                DeliveryOutcome::Delivered { remote_id } => {
                    info!(post_id = post.id, %platform, remote_id = %remote_id, "delivered");
                }
                DeliveryOutcome::Failed { error } => {
                    warn!(post_id = post.id, %platform, "delivery failed: {}", error);
                    failures.push(format!("{}: {}", platform, error));
                }
            }
            self.posts.record_delivery(post.id, platform, &outcome).await?;
        }
        Ok(failures)
    }

    async fn deliver(&self, client_id: i64, platform: Platform, job: &PublishJob) -> DeliveryOutcome {
        if platform.needs_public_url() && job.video_url.is_none() {
            return DeliveryOutcome::Failed {
                error: "no public media URL configured".into(),
            };
        }
        let token = match self.credentials.fresh_token(client_id, platform).await {
            Ok(token) => token,
            Err(CredentialError::NotFound { .. }) => {
                return DeliveryOutcome::Failed {
                    error: "no credentials".into(),
                };
            }
            Err(err) => return DeliveryOutcome::Failed { error: err.to_string() },
        };
        let publisher = match self.publishers.get(platform) {
            Ok(publisher) => publisher,
            Err(err) => return DeliveryOutcome::Failed { error: err.to_string() },
        };
        match publisher.publish(job, &token).await {
            Ok(receipt) => DeliveryOutcome::Delivered {
                remote_id: receipt.remote_id,
            },
            Err(err) => DeliveryOutcome::Failed { error: err.to_string() },
        }
    }

    fn public_url(&self, object_id: &str) -> Option<String> {
        self.public_media_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), encode_key(object_id)))
    }
}
