//! Blob stores for rendered artifacts.
//!
//! Keys are relative, `/`-separated paths such as `<job_id>/final_landscape.mp4`.
//! The value returned from `save` is the public reference recorded on the job:
//! a filesystem path for [`LocalBlobStore`], a presigned URL for [`R2BlobStore`].

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::client::R2Client;
use crate::error::{StorageError, StorageResult};

/// Default lifetime of presigned URLs.
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(86_400);

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `local_path` under `key` without producing a reference.
    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()>;

    /// Reference through which a stored object can be fetched.
    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    /// Store `local_path` under `key` and return its public reference.
    async fn save(&self, local_path: &Path, key: &str) -> StorageResult<String>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Reject keys that are empty or would escape the store root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') {
        return Err(StorageError::invalid_key(key));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Guess a content type from the key extension.
pub fn content_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("m4a") => "audio/mp4",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Stores blobs under a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let dest = self.path_for(key)?;
        if !tokio::fs::try_exists(local_path).await? {
            return Err(StorageError::not_found(local_path.display().to_string()));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &dest).await?;
        Ok(())
    }

    async fn presigned_url(&self, key: &str, _expires_in: Duration) -> StorageResult<String> {
        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::not_found(key));
        }
        Ok(path.display().to_string())
    }

    async fn save(&self, local_path: &Path, key: &str) -> StorageResult<String> {
        self.upload(local_path, key).await?;
        let stored = self.path_for(key)?;
        info!(key, path = %stored.display(), "Stored blob locally");
        Ok(stored.display().to_string())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Stores blobs in an R2 bucket and hands out presigned URLs.
#[derive(Clone)]
pub struct R2BlobStore {
    client: R2Client,
    url_expiry: Duration,
}

impl R2BlobStore {
    pub fn new(client: R2Client) -> Self {
        Self {
            client,
            url_expiry: DEFAULT_URL_EXPIRY,
        }
    }

    pub fn with_url_expiry(mut self, expiry: Duration) -> Self {
        self.url_expiry = expiry;
        self
    }
}

#[async_trait]
impl BlobStore for R2BlobStore {
    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.client
            .upload_file(local_path, key, content_type_for(key))
            .await
    }

    async fn presigned_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        validate_key(key)?;
        self.client.presign_get(key, expires_in).await
    }

    async fn save(&self, local_path: &Path, key: &str) -> StorageResult<String> {
        self.upload(local_path, key).await?;
        let url = self.presigned_url(key, self.url_expiry).await?;
        info!(key, bucket = self.client.bucket(), "Stored blob in R2");
        Ok(url)
    }

    fn name(&self) -> &'static str {
        "r2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("job-1/final_landscape.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("job-1/../../escape.mp4").is_err());
        assert!(validate_key("./job-1/a.mp4").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a/final_portrait.mp4"), "video/mp4");
        assert_eq!(content_type_for("a/music.m4a"), "audio/mp4");
        assert_eq!(content_type_for("a/blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_local_save_copies_and_returns_path() {
        let src_dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let src = src_dir.path().join("final_landscape.mp4");
        std::fs::write(&src, b"video").unwrap();

        let store = LocalBlobStore::new(root.path());
        let stored = store.save(&src, "job-1/final_landscape.mp4").await.unwrap();

        let expected = root.path().join("job-1/final_landscape.mp4");
        assert_eq!(stored, expected.display().to_string());
        assert_eq!(std::fs::read(&expected).unwrap(), b"video");

        let url = store
            .presigned_url("job-1/final_landscape.mp4", DEFAULT_URL_EXPIRY)
            .await
            .unwrap();
        assert_eq!(url, stored);
    }

    #[tokio::test]
    async fn test_local_missing_source_is_not_found() {
        let root = TempDir::new().unwrap();
        let store = LocalBlobStore::new(root.path());
        let err = store
            .save(Path::new("/nonexistent/video.mp4"), "job-1/a.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err = store
            .presigned_url("job-1/never.mp4", DEFAULT_URL_EXPIRY)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
