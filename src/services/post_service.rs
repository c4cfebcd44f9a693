//! PostService: the scheduled post queue.
//!
//! A post moves `pending` → `processing` → `completed` | `error`. The only
//! way into `processing` is [`PostService::claim`], a conditional update, so
//! a post is never published twice even when a tick and a nudge race.

use crate::{
    models::{
        platform::Platform,
        post::{DeliveryOutcome, DeliveryStatus, PostDelivery, PostStatus, ScheduledPost},
    },
    services::title::{DEFAULT_TITLE_LEN, smart_title},
    storage::ensure_key_safe,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use sqlx::{SqlitePool, types::Json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const MAX_TITLE_LEN: usize = 150;

const POST_COLUMNS: &str = "id, client_id, video_file_id, title, description, platforms, \
    scheduled_time, status, last_error, created_at, updated_at";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post {0} not found")]
    NotFound(i64),
    #[error("client {0} not found")]
    ClientNotFound(i64),
    #[error("{0}")]
    Validation(String),
    #[error("post {id} is {actual}; only {expected} posts can be {action}")]
    Conflict {
        id: i64,
        actual: PostStatus,
        expected: PostStatus,
        action: &'static str,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type PostResult<T> = Result<T, PostError>;

/// Request body for scheduling a post.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub client_id: i64,
    pub video_file_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub platforms: Vec<String>,
    /// RFC 3339; timestamps without an offset are taken as UTC.
    #[serde(deserialize_with = "utc_timestamp")]
    pub scheduled_time: DateTime<Utc>,
}

fn utc_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|_| serde::de::Error::custom(format!("invalid scheduled_time `{}`", raw)))
}

/// Parse, validate and de-duplicate the requested platforms.
fn parse_platforms(raw: &[String]) -> PostResult<Vec<Platform>> {
    if raw.is_empty() {
        return Err(PostError::Validation("platforms must not be empty".into()));
    }
    let mut platforms = Vec::with_capacity(raw.len());
    for name in raw {
        let platform = name
            .parse::<Platform>()
            .map_err(|err| PostError::Validation(err.to_string()))?;
        if !platforms.contains(&platform) {
            platforms.push(platform);
        }
    }
    Ok(platforms)
}

fn resolve_title(title: Option<&str>, description: Option<&str>) -> PostResult<String> {
    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) if title.chars().count() > MAX_TITLE_LEN => Err(PostError::Validation(
            "title must be at most 150 characters".into(),
        )),
        Some(title) => Ok(title.to_string()),
        None => Ok(smart_title(description.unwrap_or_default(), DEFAULT_TITLE_LEN)),
    }
}

#[derive(Clone)]
pub struct PostService {
    pub db: Arc<SqlitePool>,
}

impl PostService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Validate and queue a post as `pending`.
    pub async fn create_post(&self, new: &NewPost) -> PostResult<ScheduledPost> {
        let video_file_id = new.video_file_id.trim();
        ensure_key_safe(video_file_id).map_err(|_| {
            PostError::Validation(
                "video_file_id must be a relative object key of at most 255 bytes".into(),
            )
        })?;
        let platforms = parse_platforms(&new.platforms)?;
        let description = new
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        let title = resolve_title(new.title.as_deref(), description)?;

        let client: Option<i64> = sqlx::query_scalar("SELECT id FROM clients WHERE id = ?")
            .bind(new.client_id)
            .fetch_optional(&*self.db)
            .await?;
        if client.is_none() {
            return Err(PostError::ClientNotFound(new.client_id));
        }

        let now = Utc::now();
        let post = sqlx::query_as::<_, ScheduledPost>(&format!(
            "INSERT INTO scheduled_posts
                 (client_id, video_file_id, title, description, platforms, scheduled_time,
                  status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(new.client_id)
        .bind(video_file_id)
        .bind(&title)
        .bind(description)
        .bind(Json(&platforms))
        .bind(new.scheduled_time)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        info!(
            post_id = post.id,
            client_id = post.client_id,
            scheduled_time = %post.scheduled_time,
            "scheduled post '{}'",
            post.title
        );
        Ok(post)
    }

    async fn fetch(&self, id: i64) -> PostResult<ScheduledPost> {
        sqlx::query_as::<_, ScheduledPost>(&format!(
            "SELECT {} FROM scheduled_posts WHERE id = ?",
            POST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(PostError::NotFound(id))
    }

    /// Pending posts, earliest first.
    pub async fn list_pending(&self) -> PostResult<Vec<ScheduledPost>> {
        Ok(sqlx::query_as::<_, ScheduledPost>(&format!(
            "SELECT {} FROM scheduled_posts WHERE status = 'pending'
             ORDER BY scheduled_time, id",
            POST_COLUMNS
        ))
        .fetch_all(&*self.db)
        .await?)
    }

    /// A post and its per-platform delivery records.
    pub async fn get_post(&self, id: i64) -> PostResult<(ScheduledPost, Vec<PostDelivery>)> {
        let post = self.fetch(id).await?;
        let deliveries = sqlx::query_as::<_, PostDelivery>(
            "SELECT id, post_id, platform, status, remote_id, error, attempted_at
             FROM post_deliveries WHERE post_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&*self.db)
        .await?;
        Ok((post, deliveries))
    }

    /// Delete a post that has not started publishing.
    pub async fn cancel_post(&self, id: i64) -> PostResult<()> {
        let result = sqlx::query("DELETE FROM scheduled_posts WHERE id = ? AND status = 'pending'")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            let post = self.fetch(id).await?;
            return Err(PostError::Conflict {
                id,
                actual: post.status,
                expected: PostStatus::Pending,
                action: "cancelled",
            });
        }
        info!(post_id = id, "cancelled post");
        Ok(())
    }

    /// Put a failed post back in the queue. Platforms that already succeeded
    /// keep their delivery record and are skipped on the next run.
    pub async fn retry_post(&self, id: i64) -> PostResult<ScheduledPost> {
        let retried = sqlx::query_as::<_, ScheduledPost>(&format!(
            "UPDATE scheduled_posts SET status = 'pending', last_error = NULL, updated_at = ?
             WHERE id = ? AND status = 'error'
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        match retried {
            Some(post) => {
                info!(post_id = id, "post queued for retry");
                Ok(post)
            }
            None => {
                let post = self.fetch(id).await?;
                Err(PostError::Conflict {
                    id,
                    actual: post.status,
                    expected: PostStatus::Error,
                    action: "retried",
                })
            }
        }
    }

    /// Move a due `pending` post to `processing`. Returns `None` when the
    /// post is missing, not pending, or scheduled in the future.
    pub async fn claim(&self, id: i64, now: DateTime<Utc>) -> PostResult<Option<ScheduledPost>> {
        Ok(sqlx::query_as::<_, ScheduledPost>(&format!(
            "UPDATE scheduled_posts SET status = 'processing', updated_at = ?
             WHERE id = ? AND status = 'pending' AND scheduled_time <= ?
             RETURNING {}",
            POST_COLUMNS
        ))
        .bind(now)
        .bind(id)
        .bind(now)
        .fetch_optional(&*self.db)
        .await?)
    }

    pub async fn due_post_ids(&self, now: DateTime<Utc>) -> PostResult<Vec<i64>> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM scheduled_posts
             WHERE status = 'pending' AND scheduled_time <= ?
             ORDER BY scheduled_time, id",
        )
        .bind(now)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Record the final status of a run.
    pub async fn finish(&self, id: i64, status: PostStatus, last_error: Option<&str>) -> PostResult<()> {
        sqlx::query("UPDATE scheduled_posts SET status = ?, last_error = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(last_error)
            .bind(Utc::now())
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    /// Store the latest outcome for one platform, replacing earlier attempts.
    pub async fn record_delivery(
        &self,
        post_id: i64,
        platform: Platform,
        outcome: &DeliveryOutcome,
    ) -> PostResult<()> {
        let (status, remote_id, error) = match outcome {
            DeliveryOutcome::Delivered { remote_id } => {
                (DeliveryStatus::Completed, Some(remote_id.as_str()), None)
            }
            DeliveryOutcome::Failed { error } => (DeliveryStatus::Error, None, Some(error.as_str())),
        };
        sqlx::query(
            r#"
            INSERT INTO post_deliveries (post_id, platform, status, remote_id, error, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(post_id, platform) DO UPDATE SET
                status = excluded.status,
                remote_id = excluded.remote_id,
                error = excluded.error,
                attempted_at = excluded.attempted_at
            "#,
        )
        .bind(post_id)
        .bind(platform)
        .bind(status)
        .bind(remote_id)
        .bind(error)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn completed_platforms(&self, post_id: i64) -> PostResult<Vec<Platform>> {
        Ok(sqlx::query_scalar(
            "SELECT platform FROM post_deliveries WHERE post_id = ? AND status = 'completed'",
        )
        .bind(post_id)
        .fetch_all(&*self.db)
        .await?)
    }

    /// Return posts stranded in `processing` by a previous run to `pending`.
    pub async fn recover_interrupted(&self) -> PostResult<u64> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET status = 'pending', updated_at = ? WHERE status = 'processing'",
        )
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        let count = result.rows_affected();
        if count > 0 {
            warn!("[Recovery] Re-queued {} post(s) interrupted while processing", count);
        }
        Ok(count)
    }
}
