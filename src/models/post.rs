//! Represents a video scheduled for publication and its per-platform results.

use crate::models::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use std::fmt;

/// Lifecycle of a scheduled post.
///
/// `pending` → `processing` → `completed` | `error`. An `error` post can be
/// moved back to `pending` for a retry.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Processing => "processing",
            PostStatus::Completed => "completed",
            PostStatus::Error => "error",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A video publication request.
#[derive(Clone, FromRow, Debug)]
pub struct ScheduledPost {
    /// Database identifier.
    pub id: i64,

    /// Owning client.
    pub client_id: i64,

    /// Object key of the source video in the media store.
    pub video_file_id: String,

    /// Title used on every platform (at most 150 characters).
    pub title: String,

    /// Caption or description.
    pub description: Option<String>,

    /// Target platforms, without duplicates, in request order.
    pub platforms: Json<Vec<Platform>>,

    /// UTC time at or after which the post may be published.
    pub scheduled_time: DateTime<Utc>,

    pub status: PostStatus,

    /// Summary of the last failed run, cleared on retry.
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Completed,
    Error,
}

/// Outcome of publishing one post to one platform.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct PostDelivery {
    #[serde(skip)]
    pub id: i64,
    #[serde(skip)]
    pub post_id: i64,
    pub platform: Platform,
    pub status: DeliveryStatus,
    /// Identifier assigned by the platform (video id, publish id, ...).
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// What happened when a post was sent to one platform.
#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryOutcome {
    Delivered { remote_id: String },
    Failed { error: String },
}

/// Public view of a post, as returned when it is created or retried.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostResponse {
    pub id: i64,
    pub client_id: i64,
    pub title: String,
    pub platforms: Vec<Platform>,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&ScheduledPost> for PostResponse {
    fn from(post: &ScheduledPost) -> Self {
        Self {
            id: post.id,
            client_id: post.client_id,
            title: post.title.clone(),
            platforms: post.platforms.0.clone(),
            scheduled_time: post.scheduled_time,
            status: post.status,
            created_at: post.created_at,
        }
    }
}

/// A post with everything known about its publication.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: PostResponse,
    pub video_file_id: String,
    pub description: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub deliveries: Vec<PostDelivery>,
}

impl PostDetail {
    pub fn new(post: &ScheduledPost, deliveries: Vec<PostDelivery>) -> Self {
        Self {
            post: PostResponse::from(post),
            video_file_id: post.video_file_id.clone(),
            description: post.description.clone(),
            last_error: post.last_error.clone(),
            updated_at: post.updated_at,
            deliveries,
        }
    }
}
