//! Scratch files holding a video while it is being published.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::fs;
use tracing::{debug, warn};

pub fn video_path(temp_dir: &Path, post_id: i64) -> PathBuf {
    temp_dir.join(format!("video_{}.mp4", post_id))
}

/// Delete a temporary video; a missing file is not an error.
pub async fn cleanup(path: &Path) {
    match fs::remove_file(path).await {
        Ok(_) => debug!("[Cleanup] Deleted temporary file: {}", path.display()),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!("[Cleanup] Could not delete {}: {}", path.display(), err),
    }
}
