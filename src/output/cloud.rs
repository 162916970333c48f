//! Storage destinations (local directory, S3, R2, GCS, Azure)

use crate::error::{Error, Result};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::debug;

/// Storage destination parsed from an output URL
#[derive(Debug, Clone)]
pub struct CloudDestination {
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// URL scheme, for logging
    scheme: String,
}

/// `bucket/some/prefix/` → (`bucket`, `some/prefix`)
fn split_bucket(without_scheme: &str) -> (&str, String) {
    match without_scheme.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix.trim_matches('/').to_string()),
        None => (without_scheme, String::new()),
    }
}

impl CloudDestination {
    /// Parse a destination URL and create the matching object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3
    /// - `r2://bucket/path/` - Cloudflare R2 (S3-compatible)
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `/local/path/`, `./path/` or `file:///path` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(rest) = url.strip_prefix("s3://") {
            Self::s3(rest, "s3")
        } else if let Some(rest) = url.strip_prefix("r2://") {
            Self::s3(rest, "r2")
        } else if let Some(rest) = url.strip_prefix("gs://") {
            Self::gcs(rest)
        } else if let Some(rest) = url.strip_prefix("az://") {
            Self::azure(rest)
        } else {
            Self::local(url.strip_prefix("file://").unwrap_or(url))
        }
    }

    fn s3(rest: &str, scheme: &str) -> Result<Self> {
        let (bucket, prefix) = split_bucket(rest);
        if bucket.is_empty() {
            return Err(Error::invalid_value("output", format!("missing bucket in {scheme}:// URL")));
        }

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        // R2 endpoint: https://<account_id>.r2.cloudflarestorage.com
        if scheme == "r2" {
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create {scheme} client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: scheme.to_string(),
        })
    }

    fn gcs(rest: &str) -> Result<Self> {
        let (bucket, prefix) = split_bucket(rest);
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "gs".to_string(),
        })
    }

    fn azure(rest: &str) -> Result<Self> {
        let (container, prefix) = split_bucket(rest);
        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "az".to_string(),
        })
    }

    fn local(path: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: String::new(),
            scheme: "file".to_string(),
        })
    }

    /// Whether this is remote object storage
    pub fn is_cloud(&self) -> bool {
        self.scheme != "file"
    }

    /// Scheme (s3, r2, gs, az, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Write bytes under `relative_path`, returning the full location
    pub async fn write(&self, relative_path: &str, data: Bytes) -> Result<String> {
        let path = if self.prefix.is_empty() {
            ObjectPath::from(relative_path)
        } else {
            ObjectPath::from(format!("{}/{relative_path}", self.prefix))
        };

        let size = data.len();
        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| Error::output(format!("Failed to write {path}: {e}")))?;

        let location = format!("{}://{path}", self.scheme);
        debug!(location = %location, bytes = size, "Wrote object");
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_bucket() {
        assert_eq!(split_bucket("bucket/a/b/"), ("bucket", "a/b".to_string()));
        assert_eq!(split_bucket("bucket"), ("bucket", String::new()));
    }

    #[test]
    fn test_parse_local_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested/out");
        let dest = CloudDestination::parse(path.to_str().unwrap()).unwrap();
        assert_eq!(dest.scheme(), "file");
        assert!(!dest.is_cloud());
        assert!(path.is_dir());
    }

    #[test]
    fn test_parse_file_url() {
        let temp_dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", temp_dir.path().display());
        assert_eq!(CloudDestination::parse(&url).unwrap().scheme(), "file");
    }

    #[tokio::test]
    async fn test_local_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dest = CloudDestination::parse(temp_dir.path().to_str().unwrap()).unwrap();
        let location = dest
            .write("run/2024/1-of-1.json", Bytes::from_static(b"{}\n"))
            .await
            .unwrap();
        assert_eq!(location, "file://run/2024/1-of-1.json");
        let written = std::fs::read_to_string(temp_dir.path().join("run/2024/1-of-1.json")).unwrap();
        assert_eq!(written, "{}\n");
    }
}
