use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, fmt, path::PathBuf, time::Duration};

use crate::models::platform::Platform;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub temp_dir: PathBuf,
    pub poll_interval: Duration,
    pub max_concurrent_posts: usize,
    pub media: MediaConfig,
    /// Base URL under which video objects are publicly reachable; required
    /// for Instagram and Facebook, which fetch the video themselves.
    pub public_media_url: Option<String>,
    pub oauth_redirect_uri: String,
    pub providers: Vec<ProviderCredentials>,
    pub youtube_privacy: String,
    pub tiktok_privacy: String,
}

/// Where source videos are read from.
#[derive(Clone)]
pub enum MediaConfig {
    Local {
        dir: PathBuf,
    },
    S3 {
        endpoint: String,
        region: String,
        bucket: String,
        access_key: String,
        secret_key: String,
    },
}

/// OAuth application registered with a platform.
#[derive(Clone)]
pub struct ProviderCredentials {
    pub platform: Platform,
    pub client_id: String,
    pub client_secret: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Evo Omni Publisher Engine")]
pub struct Args {
    /// Host to bind to (overrides EVO_PUBLISHER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides EVO_PUBLISHER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides EVO_PUBLISHER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for videos while they are being published (overrides EVO_PUBLISHER_TEMP_DIR)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Seconds between scheduler runs (overrides EVO_PUBLISHER_POLL_INTERVAL_SECS)
    #[arg(long)]
    pub poll_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::from_env_with(args, |key| env::var(key))?, migrate))
    }

    /// Build the configuration from parsed args and an environment lookup.
    pub fn from_env_with<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |key: &str| -> Result<Option<String>> {
            match lookup(key) {
                Ok(value) if value.trim().is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };
        let parsed = |key: &str| -> Result<Option<u64>> {
            var(key)?
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .with_context(|| format!("parsing {} value `{}`", key, value))
                })
                .transpose()
        };

        // --- Environment fallback ---
        let env_host = var("EVO_PUBLISHER_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match parsed("EVO_PUBLISHER_PORT")? {
            Some(port) => u16::try_from(port).context("EVO_PUBLISHER_PORT out of range")?,
            None => 8000,
        };
        let env_db = var("EVO_PUBLISHER_DATABASE_URL")?
            .unwrap_or_else(|| "sqlite://./data/publisher.db".into());
        let env_temp = var("EVO_PUBLISHER_TEMP_DIR")?.unwrap_or_else(|| "/tmp/evo_videos".into());
        let env_interval = parsed("EVO_PUBLISHER_POLL_INTERVAL_SECS")?.unwrap_or(60);
        let max_concurrent_posts = parsed("EVO_PUBLISHER_MAX_CONCURRENT_POSTS")?.unwrap_or(2);

        let media = match var("EVO_PUBLISHER_MEDIA_BACKEND")?
            .unwrap_or_else(|| "local".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => MediaConfig::Local {
                dir: var("EVO_PUBLISHER_MEDIA_DIR")?
                    .unwrap_or_else(|| "./data/media".into())
                    .into(),
            },
            "s3" => {
                let required = |key: &str| -> Result<String> {
                    var(key)?.with_context(|| format!("{} is required for the s3 media backend", key))
                };
                MediaConfig::S3 {
                    endpoint: required("EVO_PUBLISHER_S3_ENDPOINT")?,
                    region: var("EVO_PUBLISHER_S3_REGION")?.unwrap_or_else(|| "us-east-1".into()),
                    bucket: required("EVO_PUBLISHER_S3_BUCKET")?,
                    access_key: required("EVO_PUBLISHER_S3_ACCESS_KEY")?,
                    secret_key: required("EVO_PUBLISHER_S3_SECRET_KEY")?,
                }
            }
            other => bail!("unknown EVO_PUBLISHER_MEDIA_BACKEND `{}` (expected local or s3)", other),
        };

        let mut providers = Vec::new();
        for platform in Platform::ALL {
            let prefix = format!("EVO_PUBLISHER_{}", platform.as_str().to_ascii_uppercase());
            let id = var(&format!("{}_CLIENT_ID", prefix))?;
            let secret = var(&format!("{}_CLIENT_SECRET", prefix))?;
            match (id, secret) {
                (Some(client_id), Some(client_secret)) => providers.push(ProviderCredentials {
                    platform,
                    client_id,
                    client_secret,
                }),
                (None, None) => {}
                _ => bail!("{}_CLIENT_ID and {}_CLIENT_SECRET must be set together", prefix, prefix),
            }
        }

        let poll_secs = args.poll_interval_secs.unwrap_or(env_interval);
        if poll_secs == 0 {
            bail!("poll interval must be at least one second");
        }

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            temp_dir: args.temp_dir.unwrap_or_else(|| env_temp.into()),
            poll_interval: Duration::from_secs(poll_secs),
            max_concurrent_posts: usize::try_from(max_concurrent_posts.max(1)).unwrap_or(1),
            media,
            public_media_url: var("EVO_PUBLISHER_PUBLIC_MEDIA_URL")?
                .map(|url| url.trim_end_matches('/').to_string()),
            oauth_redirect_uri: var("EVO_PUBLISHER_OAUTH_REDIRECT_URI")?
                .unwrap_or_else(|| "http://localhost:8000/auth/callback".into()),
            providers,
            youtube_privacy: var("EVO_PUBLISHER_YOUTUBE_PRIVACY")?.unwrap_or_else(|| "private".into()),
            tiktok_privacy: var("EVO_PUBLISHER_TIKTOK_PRIVACY")?.unwrap_or_else(|| "SELF_ONLY".into()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let media = match &self.media {
            MediaConfig::Local { dir } => format!("local({})", dir.display()),
            MediaConfig::S3 {
                endpoint, bucket, ..
            } => format!("s3({}/{})", endpoint, bucket),
        };
        let providers: Vec<&str> = self.providers.iter().map(|p| p.platform.as_str()).collect();
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("temp_dir", &self.temp_dir)
            .field("poll_interval", &self.poll_interval)
            .field("max_concurrent_posts", &self.max_concurrent_posts)
            .field("media", &media)
            .field("public_media_url", &self.public_media_url)
            .field("oauth_redirect_uri", &self.oauth_redirect_uri)
            .field("providers", &providers)
            .finish()
    }
}
