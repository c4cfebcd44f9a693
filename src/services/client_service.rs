//! ClientService: registration and removal of publishing tenants.
//!
//! Deleting a client removes everything stored for it (credentials, posts,
//! deliveries, pending OAuth handshakes) through `ON DELETE CASCADE`.

use crate::models::client::Client;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const MAX_NAME_LEN: usize = 150;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client {0} not found")]
    NotFound(i64),
    #[error("client name {0}")]
    InvalidName(&'static str),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Clone)]
pub struct ClientService {
    pub db: Arc<SqlitePool>,
}

impl ClientService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn create_client(&self, name: &str) -> ClientResult<Client> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::InvalidName("must not be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ClientError::InvalidName("must be at most 150 characters"));
        }

        let client = sqlx::query_as::<_, Client>(
            "INSERT INTO clients (name, created_at) VALUES (?, ?)
             RETURNING id, name, created_at",
        )
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        info!(client_id = client.id, "registered client");
        Ok(client)
    }

    pub async fn get_client(&self, id: i64) -> ClientResult<Client> {
        sqlx::query_as::<_, Client>("SELECT id, name, created_at FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or(ClientError::NotFound(id))
    }

    pub async fn list_clients(&self) -> ClientResult<Vec<Client>> {
        Ok(
            sqlx::query_as::<_, Client>("SELECT id, name, created_at FROM clients ORDER BY id")
                .fetch_all(&*self.db)
                .await?,
        )
    }

    /// Remove a client and, by cascade, all of its data.
    pub async fn delete_client(&self, id: i64) -> ClientResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ClientError::NotFound(id));
        }
        info!(client_id = id, "deleted client and all associated data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::memory_pool;

    #[tokio::test]
    async fn create_and_fetch() {
        let service = ClientService::new(memory_pool().await);
        let created = service.create_client("  Acme Studio ").await.unwrap();
        assert_eq!(created.name, "Acme Studio");

        let fetched = service.get_client(created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(service.list_clients().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_blank_and_long_names() {
        let service = ClientService::new(memory_pool().await);
        assert!(matches!(
            service.create_client("   ").await,
            Err(ClientError::InvalidName(_))
        ));
        let long = "x".repeat(151);
        assert!(matches!(
            service.create_client(&long).await,
            Err(ClientError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn delete_cascades_to_owned_rows() {
        let pool = memory_pool().await;
        let service = ClientService::new(pool.clone());
        let client = service.create_client("Cascade").await.unwrap();

        sqlx::query(
            "INSERT INTO social_credentials (client_id, platform, token_data, updated_at)
             VALUES (?, 'youtube', '{\"access_token\":\"a\"}', ?)",
        )
        .bind(client.id)
        .bind(Utc::now())
        .execute(&*pool)
        .await
        .unwrap();

        let post_id: i64 = sqlx::query_scalar(
            "INSERT INTO scheduled_posts
                 (client_id, video_file_id, title, platforms, scheduled_time, status,
                  created_at, updated_at)
             VALUES (?, 'a.mp4', 'Launch', '[\"youtube\"]', ?, 'error', ?, ?)
             RETURNING id",
        )
        .bind(client.id)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&*pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO post_deliveries (post_id, platform, status, remote_id, attempted_at)
             VALUES (?, 'youtube', 'completed', 'yt-1', ?)",
        )
        .bind(post_id)
        .bind(Utc::now())
        .execute(&*pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO oauth_states (state, client_id, platform, created_at)
             VALUES ('pending-state', ?, 'tiktok', ?)",
        )
        .bind(client.id)
        .bind(Utc::now())
        .execute(&*pool)
        .await
        .unwrap();

        service.delete_client(client.id).await.unwrap();

        for table in ["social_credentials", "scheduled_posts", "post_deliveries", "oauth_states"] {
            let remaining: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&*pool)
                .await
                .unwrap();
            assert_eq!(remaining, 0, "{} rows survived the delete", table);
        }
        assert!(matches!(
            service.delete_client(client.id).await,
            Err(ClientError::NotFound(_))
        ));
    }
}
