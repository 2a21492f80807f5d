//! Local directory store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use url::Url;

use super::PodcastStore;
use crate::error::{DigestError, Result};

/// Copies episodes into a directory and links to them with `file://` URLs
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Store episodes in `dir`, created on first publish
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl PodcastStore for LocalStore {
    async fn publish(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(DigestError::file_not_found(path));
        }
        let file_name = path
            .file_name()
            .ok_or_else(|| DigestError::storage(format!("No file name in {}", path.display())))?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let target = tokio::fs::canonicalize(&self.dir).await?.join(file_name);
        tokio::fs::copy(path, &target).await?;
        info!("Copied episode to {}", target.display());

        let url = Url::from_file_path(&target)
            .map_err(|_| DigestError::storage(format!("Cannot build file URL for {}", target.display())))?;
        Ok(url.to_string())
    }
}
