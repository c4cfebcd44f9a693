use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod extract;
mod handlers;
mod models;
mod publishers;
mod routes;
mod services;
mod state;
mod storage;
#[cfg(test)]
mod test_support;

use config::{AppConfig, MediaConfig};
use publishers::{PublisherRegistry, PublisherSettings};
use services::{
    client_service::ClientService,
    credential_service::CredentialService,
    oauth_providers::OAuthProviders,
    oauth_service::OAuthService,
    post_service::PostService,
    publisher_manager::PublisherManager,
    scheduler::{Scheduler, SchedulerConfig},
};
use state::AppState;
use storage::{MediaSource, local::LocalMediaSource, s3::S3MediaSource};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting publisher engine with config: {:?}", cfg);

    // --- Ensure temp directory exists ---
    if !cfg.temp_dir.exists() {
        std::fs::create_dir_all(&cfg.temp_dir)
            .with_context(|| format!("creating temp directory {}", cfg.temp_dir.display()))?;
        tracing::info!("Created temp directory at {}", cfg.temp_dir.display());
    }

    // --- Initialize SQLite connection ---
    let db = db::connect(&cfg.database_url).await?;
    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize services ---
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;

    let media: Arc<dyn MediaSource> = match &cfg.media {
        MediaConfig::Local { dir } => Arc::new(LocalMediaSource::new(dir.clone())),
        MediaConfig::S3 {
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
        } => Arc::new(S3MediaSource::new(
            http.clone(),
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
        )),
    };
    tracing::info!("Reading media from {}", media.describe());
    if cfg.public_media_url.is_none() {
        tracing::warn!("EVO_PUBLISHER_PUBLIC_MEDIA_URL is not set; Instagram and Facebook posts will fail");
    }

    let providers = Arc::new(OAuthProviders::new(
        http.clone(),
        cfg.oauth_redirect_uri.clone(),
        &cfg.providers,
    ));
    let credentials = CredentialService::new(db.clone(), providers.clone());
    let posts = PostService::new(db.clone());
    let publisher_settings = PublisherSettings {
        youtube_privacy: cfg.youtube_privacy.clone(),
        tiktok_privacy: cfg.tiktok_privacy.clone(),
        ..Default::default()
    };
    let manager = PublisherManager::new(
        posts.clone(),
        credentials.clone(),
        media,
        PublisherRegistry::standard(http, &publisher_settings),
        cfg.temp_dir.clone(),
        cfg.public_media_url.clone(),
    );

    // --- Start scheduler ---
    posts
        .recover_interrupted()
        .await
        .context("re-queueing interrupted posts")?;
    let cancel = CancellationToken::new();
    let (dispatch, scheduler) = Scheduler::start(
        manager,
        posts.clone(),
        SchedulerConfig {
            poll_interval: cfg.poll_interval,
            max_concurrent_posts: cfg.max_concurrent_posts,
        },
        cancel.clone(),
    );

    // --- Build router ---
    let state = AppState {
        db: db.clone(),
        clients: ClientService::new(db.clone()),
        credentials: credentials.clone(),
        oauth: OAuthService::new(db.clone(), providers, credentials),
        posts,
        dispatch,
        temp_dir: cfg.temp_dir.clone(),
    };
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Stop scheduler ---
    cancel.cancel();
    if let Err(err) = scheduler.await {
        tracing::error!("Scheduler task ended abnormally: {}", err);
    }
    db.close().await;

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down gracefully");
}
