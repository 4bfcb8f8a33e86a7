use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::services::image_codec::DecodedImage;

/// Stores uploaded images below a root directory. Stored references are paths relative to
/// that root, which is also what `/media` serves.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the image under `folder` with a generated file name and returns its relative path.
    pub async fn save(&self, folder: &str, image: &DecodedImage) -> io::Result<String> {
        let relative = format!("{folder}/{}.{}", Uuid::new_v4().simple(), image.extension);
        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &image.bytes).await?;
        info!(path = %relative, size = image.bytes.len(), "Stored image.");
        Ok(relative)
    }

    /// Best effort: a file that cannot be removed is only logged.
    pub async fn remove(&self, relative: &str) {
        let path = self.root.join(relative);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(path = %relative, "Removed image."),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %relative, error = %e, "Failed to remove image."),
        }
    }
}

/// Public URL of a stored file.
pub fn media_url(public_url: &str, relative: &str) -> String {
    format!("{}/media/{}", public_url.trim_end_matches('/'), relative)
}
