//! Cloud blob storage contract.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::storage_path::StoragePath;

/// Progress callback: `(bytes_done, total_bytes)`.
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob path: {0}")]
    InvalidPath(String),

    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob storage backend error: {0}")]
    Backend(String),
}

impl From<BlobError> for CoreError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(path) => CoreError::not_found("Blob", path),
            BlobError::InvalidPath(msg) => CoreError::Validation(msg),
            BlobError::Io(e) => CoreError::Internal(format!("blob I/O error: {e}")),
            BlobError::Backend(msg) => CoreError::Unavailable(format!("blob storage: {msg}")),
        }
    }
}

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Download `path` to `dest`, returning the number of bytes written.
    async fn download(
        &self,
        path: &StoragePath,
        dest: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<u64, BlobError>;

    /// Upload `local` to `path`, attaching `metadata` to the object.
    async fn upload(
        &self,
        local: &Path,
        path: &StoragePath,
        metadata: &HashMap<String, String>,
    ) -> Result<(), BlobError>;

    async fn exists(&self, path: &StoragePath) -> Result<bool, BlobError>;

    /// List blobs under an `account/container/prefix` folder.
    async fn list(&self, folder_prefix: &str) -> Result<Vec<StoragePath>, BlobError>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete(&self, path: &StoragePath) -> Result<(), BlobError>;
}

/// Split `account/container/prefix` into its parts. The prefix may be empty.
pub fn split_folder_prefix(folder_prefix: &str) -> Result<(&str, &str, &str), BlobError> {
    let mut parts = folder_prefix.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(account), Some(container), prefix) if !account.is_empty() && !container.is_empty() => {
            Ok((account, container, prefix.unwrap_or_default()))
        }
        _ => Err(BlobError::InvalidPath(format!(
            "folder prefix '{folder_prefix}' must be account/container/prefix"
        ))),
    }
}
