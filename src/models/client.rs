//! Represents a tenant whose social accounts the engine publishes to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A client (tenant) of the publisher.
///
/// Every credential and scheduled post belongs to exactly one client and is
/// removed together with it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Client {
    /// Database identifier.
    pub id: i64,

    /// Display name, at most 150 characters.
    pub name: String,

    /// When this client was registered.
    pub created_at: DateTime<Utc>,
}
