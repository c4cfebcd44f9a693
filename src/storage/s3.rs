//! Media source backed by an S3-compatible bucket (path-style addressing).

use super::{
    MediaSource, StorageError, StorageResult, ensure_key_safe,
    sigv4::{self, CanonicalRequest, Credentials, UNSIGNED_PAYLOAD},
    write_stream_atomically,
};
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use reqwest::{StatusCode, Url, header};
use std::{io, path::Path};
use tokio::fs;
use tracing::{debug, info};

pub struct S3MediaSource {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    credentials: Credentials,
}

impl S3MediaSource {
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        region: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            credentials: Credentials {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
                region: region.to_string(),
                service: "s3".into(),
            },
        }
    }

    fn object_path(&self, key: &str) -> String {
        format!("/{}/{}", sigv4::encode_key(&self.bucket), sigv4::encode_key(key))
    }
}

/// `host[:port]` exactly as the HTTP client will send it.
fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Single-part uploads carry the MD5 of the body as their ETag; multipart
/// ETags contain a `-` and are not digests.
fn md5_etag(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_matches('"');
    (trimmed.len() == 32 && trimmed.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| trimmed.to_ascii_lowercase())
}

#[async_trait]
impl MediaSource for S3MediaSource {
    async fn download(&self, object_id: &str, dest: &Path) -> StorageResult<u64> {
        ensure_key_safe(object_id)?;

        let path = self.object_path(object_id);
        let url = Url::parse(&format!("{}{}", self.endpoint, path)).map_err(|err| {
            StorageError::Io(io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))
        })?;
        let now = Utc::now();
        let amz_date = sigv4::amz_date(now);
        let request = CanonicalRequest {
            method: "GET",
            path: &path,
            query: "",
            headers: vec![
                ("host", host_header(&url)),
                ("x-amz-content-sha256", UNSIGNED_PAYLOAD.to_string()),
                ("x-amz-date", amz_date.clone()),
            ],
            payload_hash: UNSIGNED_PAYLOAD,
        };
        let authorization = sigv4::authorization(&self.credentials, &request, now);

        info!("[Storage] Downloading '{}' from {}", object_id, self.describe());
        let response = self
            .http
            .get(url)
            .header("x-amz-content-sha256", UNSIGNED_PAYLOAD)
            .header("x-amz-date", amz_date)
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(StorageError::ObjectNotFound(object_id.to_string())),
            status => {
                return Err(StorageError::UnexpectedStatus {
                    key: object_id.to_string(),
                    status: status.as_u16(),
                });
            }
        }

        let expected_md5 = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .and_then(md5_etag);

        let stream = response
            .bytes_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        let written = write_stream_atomically(dest, stream).await?;

        if let Some(expected) = expected_md5 {
            if expected != written.md5 {
                let _ = fs::remove_file(dest).await;
                return Err(StorageError::ChecksumMismatch {
                    key: object_id.to_string(),
                    expected,
                    actual: written.md5,
                });
            }
        }

        debug!("[Storage] Download complete: {} ({} bytes)", dest.display(), written.size_bytes);
        Ok(written.size_bytes)
    }

    fn describe(&self) -> String {
        format!("bucket {} at {}", self.bucket, self.endpoint)
    }
}
