//! Media sources the publisher downloads videos from.
//!
//! Every backend streams into a `.tmp-<uuid>` file beside the destination,
//! fsyncs it and renames it into place, so a destination path either holds a
//! complete download or nothing.

pub mod local;
pub mod s3;
pub mod sigv4;
pub mod temp;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::Path,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("object store returned HTTP {status} for `{key}`")]
    UnexpectedStatus { key: String, status: u16 },
    #[error("checksum mismatch for `{key}`: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A place source videos can be fetched from.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Copy `object_id` to `dest`, returning the number of bytes written.
    async fn download(&self, object_id: &str, dest: &Path) -> StorageResult<u64>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or overlong keys, keys that begin with `/`, contain `..`,
/// backslashes or control characters.
pub fn ensure_key_safe(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.starts_with('/') || key.contains("..") {
        return Err(StorageError::InvalidObjectKey);
    }
    if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
        return Err(StorageError::InvalidObjectKey);
    }
    Ok(())
}

/// Result of writing a stream to disk.
#[derive(Debug)]
pub struct WrittenFile {
    pub size_bytes: u64,
    /// Lowercase hex MD5 of the bytes written.
    pub md5: String,
}

/// Stream bytes into `dest` through a temporary sibling file.
///
/// The temporary file is removed on any error.
pub async fn write_stream_atomically<S>(dest: &Path, stream: S) -> StorageResult<WrittenFile>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let parent = dest.parent().map(Path::to_path_buf).ok_or_else(|| {
        StorageError::Io(io::Error::new(
            ErrorKind::Other,
            "destination path missing parent directory",
        ))
    })?;
    fs::create_dir_all(&parent).await?;
    let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

    match write_into(&tmp_path, stream).await {
        Ok(written) => {
            if let Err(err) = fs::rename(&tmp_path, dest).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
            Ok(written)
        }
        Err(err) => {
            let _ = fs::remove_file(&tmp_path).await;
            Err(err)
        }
    }
}

async fn write_into<S>(tmp_path: &Path, stream: S) -> StorageResult<WrittenFile>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(tmp_path).await?;
    let mut size_bytes: u64 = 0;
    let mut digest = Context::new();

    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as u64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok(WrittenFile {
        size_bytes,
        md5: format!("{:x}", digest.compute()),
    })
}
