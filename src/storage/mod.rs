//! Publishing finished episodes

mod azure;
mod local;

pub use azure::{content_type_for, parse_connection_string, AzureBlobStore, StorageAccount};
pub use local::LocalStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

/// Destination for finished episodes
#[async_trait]
pub trait PodcastStore: Send + Sync {
    /// Store the file at `path` and return a link listeners can open
    async fn publish(&self, path: &Path) -> Result<String>;
}

/// Publishes to a primary store and keeps best-effort copies elsewhere.
///
/// The primary store's link is returned; mirror failures are only logged.
pub struct MirroredStore {
    primary: Arc<dyn PodcastStore>,
    mirrors: Vec<Arc<dyn PodcastStore>>,
}

impl MirroredStore {
    /// Publish to `primary` and copy to every store in `mirrors`
    pub fn new(primary: Arc<dyn PodcastStore>, mirrors: Vec<Arc<dyn PodcastStore>>) -> Self {
        Self { primary, mirrors }
    }
}

#[async_trait]
impl PodcastStore for MirroredStore {
    async fn publish(&self, path: &Path) -> Result<String> {
        for mirror in &self.mirrors {
            if let Err(e) = mirror.publish(path).await {
                warn!("Could not keep a copy of {}: {}", path.display(), e);
            }
        }
        self.primary.publish(path).await
    }
}
