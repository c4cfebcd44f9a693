//! Media source backed by a local directory.

use super::{MediaSource, StorageError, StorageResult, ensure_key_safe, write_stream_atomically};
use async_trait::async_trait;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;

pub struct LocalMediaSource {
    base_dir: PathBuf,
}

impl LocalMediaSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl MediaSource for LocalMediaSource {
    async fn download(&self, object_id: &str, dest: &Path) -> StorageResult<u64> {
        ensure_key_safe(object_id)?;
        let source = self.base_dir.join(object_id);
        let file = File::open(&source).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound(object_id.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;

        let written = write_stream_atomically(dest, ReaderStream::new(file)).await?;
        debug!(
            "copied {} ({} bytes) to {}",
            source.display(),
            written.size_bytes,
            dest.display()
        );
        Ok(written.size_bytes)
    }

    fn describe(&self) -> String {
        format!("local directory {}", self.base_dir.display())
    }
}
