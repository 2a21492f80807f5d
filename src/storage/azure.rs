//! Azure Blob Storage publishing with read-only SAS links

use std::path::Path;

use async_trait::async_trait;
use azure_storage::shared_access_signature::service_sas::BlobSasPermissions;
use azure_storage::{prelude::*, ErrorKind};
use azure_storage_blobs::prelude::*;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::PodcastStore;
use crate::config::StorageConfig;
use crate::error::{DigestError, Result};

const PUBLIC_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Account credentials taken from a storage connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    /// Account name
    pub name: String,
    /// Shared account key
    pub key: String,
}

/// Parse `AccountName` and `AccountKey` out of a connection string.
///
/// Only the public Azure cloud is supported.
pub fn parse_connection_string(connection_string: &str) -> Result<StorageAccount> {
    let mut name = None;
    let mut key = None;

    for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((k, v)) = part.split_once('=') else {
            return Err(DigestError::storage("Malformed connection string"));
        };
        match k {
            "AccountName" => name = Some(v.to_string()),
            "AccountKey" => key = Some(v.to_string()),
            "EndpointSuffix" if v != PUBLIC_ENDPOINT_SUFFIX => {
                return Err(DigestError::storage(format!("Unsupported endpoint suffix: {}", v)));
            }
            _ => {}
        }
    }

    match (name, key) {
        (Some(name), Some(key)) if !name.is_empty() && !key.is_empty() => Ok(StorageAccount { name, key }),
        _ => Err(DigestError::storage("Connection string must contain AccountName and AccountKey")),
    }
}

/// MIME type stored with the uploaded blob
pub fn content_type_for(blob_name: &str) -> &'static str {
    if blob_name.to_lowercase().ends_with(".m4a") {
        "audio/mp4"
    } else {
        "application/octet-stream"
    }
}

/// Uploads episodes to an Azure Blob Storage container
pub struct AzureBlobStore {
    client: ClientBuilder,
    container: String,
    sas_expiry_days: u32,
}

impl AzureBlobStore {
    /// Create a store for `container` in the given account
    pub fn new(account: StorageAccount, container: impl Into<String>, sas_expiry_days: u32) -> Self {
        let credentials = StorageCredentials::access_key(&account.name, account.key);
        Self {
            client: ClientBuilder::new(&account.name, credentials),
            container: container.into(),
            sas_expiry_days,
        }
    }

    /// Create a store from configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let connection_string = config
            .connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| DigestError::Config("Azure Storage connection string is missing".into()))?;
        if config.container.trim().is_empty() {
            return Err(DigestError::Config("Azure Storage container name is missing".into()));
        }

        let account = parse_connection_string(connection_string)?;
        Ok(Self::new(account, config.container.clone(), config.sas_expiry_days))
    }

    async fn ensure_container(&self) -> Result<()> {
        match self.client.clone().container_client(self.container.as_str()).create().await {
            Ok(_) => {
                info!("Container '{}' created", self.container);
                Ok(())
            }
            Err(e) => {
                if let ErrorKind::HttpResponse { status, .. } = e.kind() {
                    if status.is_client_error() {
                        debug!("Container '{}' already exists", self.container);
                        return Ok(());
                    }
                }
                Err(DigestError::storage(format!(
                    "Failed to create or get container '{}': {}",
                    self.container, e
                )))
            }
        }
    }
}

#[async_trait]
impl PodcastStore for AzureBlobStore {
    async fn publish(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(DigestError::file_not_found(path));
        }
        let blob_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DigestError::storage(format!("No file name in {}", path.display())))?;

        info!("Attempting to upload '{}' to container '{}'", blob_name, self.container);
        self.ensure_container().await?;

        let data = tokio::fs::read(path).await?;
        let blob_client = self.client.clone().blob_client(self.container.as_str(), blob_name.as_str());
        blob_client
            .put_block_blob(data)
            .content_type(content_type_for(&blob_name))
            .await
            .map_err(|e| DigestError::storage(format!("Upload of '{}' failed: {}", blob_name, e)))?;
        info!("Successfully uploaded '{}' to container '{}'", blob_name, self.container);

        info!("Generating SAS URL for '{}' valid for {} days", blob_name, self.sas_expiry_days);
        let expiry = OffsetDateTime::now_utc() + time::Duration::days(i64::from(self.sas_expiry_days));
        let permissions = BlobSasPermissions { read: true, ..Default::default() };
        let sas = blob_client
            .shared_access_signature(permissions, expiry)
            .await
            .map_err(|e| DigestError::storage(format!("SAS generation failed: {}", e)))?;
        let url = blob_client
            .generate_signed_blob_url(&sas)
            .map_err(|e| DigestError::storage(format!("SAS URL generation failed: {}", e)))?;

        debug!("Generated SAS URL for '{}'", blob_name);
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_connection_string() {
        let account = parse_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=digest;AccountKey=c2VjcmV0PT0=;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(account, StorageAccount { name: "digest".into(), key: "c2VjcmV0PT0=".into() });
    }

    #[test]
    fn test_parse_connection_string_errors() {
        assert!(parse_connection_string("AccountName=digest").is_err());
        assert!(parse_connection_string("AccountName=;AccountKey=abc").is_err());
        assert!(parse_connection_string("AccountName=a;AccountKey=b;EndpointSuffix=core.chinacloudapi.cn").is_err());

        let err = parse_connection_string("AccountName=a;supersecret").unwrap_err();
        assert!(matches!(err, DigestError::Storage(_)));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("daily_digest_2024-01-01.m4a"), "audio/mp4");
        assert_eq!(content_type_for("EPISODE.M4A"), "audio/mp4");
        assert_eq!(content_type_for("notes.txt"), "application/octet-stream");
    }

    #[test]
    fn test_from_config_requires_settings() {
        let config = StorageConfig::default();
        assert!(matches!(AzureBlobStore::from_config(&config), Err(DigestError::Config(_))));

        let config = StorageConfig {
            connection_string: Some("AccountName=a;AccountKey=Yg==".into()),
            ..StorageConfig::default()
        };
        assert!(AzureBlobStore::from_config(&config).is_ok());
    }

    #[tokio::test]
    async fn test_publish_missing_file() {
        let store = AzureBlobStore::new(
            StorageAccount { name: "a".into(), key: "Yg==".into() },
            "podcast-audio",
            2,
        );
        let err = store.publish(Path::new("/nonexistent/x.m4a")).await.unwrap_err();
        assert!(matches!(err, DigestError::FileNotFound { .. }));
    }
}
