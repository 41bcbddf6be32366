//! [`BlobStorage`] over an S3-compatible object store.
//!
//! Storage paths map onto S3 as `container` → bucket and `blob` → key. The
//! account segment is fixed per provider instance; paths naming another
//! account are rejected.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use clipflow_core::blob::{split_folder_prefix, BlobError, BlobStorage, ProgressFn};
use clipflow_core::storage_path::StoragePath;
use tokio::io::AsyncWriteExt;

/// Connection settings for the S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3BlobConfig {
    /// Storage account this provider serves.
    pub account: String,
    /// Custom endpoint (e.g. MinIO or an Azure gateway); `None` for AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3BlobConfig {
    /// Load from environment variables.
    ///
    /// | Env Var                 | Default      |
    /// |-------------------------|--------------|
    /// | `S3_ENDPOINT`           | unset (AWS)  |
    /// | `S3_REGION`             | `us-east-1`  |
    /// | `AWS_ACCESS_KEY_ID`     | default chain|
    /// | `AWS_SECRET_ACCESS_KEY` | default chain|
    pub fn from_env(account: impl Into<String>) -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            account: account.into(),
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key_id: var("AWS_ACCESS_KEY_ID"),
            secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
        }
    }
}

pub struct S3BlobStorage {
    client: Client,
    account: String,
}

impl S3BlobStorage {
    /// Build a client. Explicit keys win; otherwise the default AWS
    /// credential chain is used.
    pub async fn new(config: S3BlobConfig) -> Self {
        let shared = aws_config::from_env()
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder.credentials_provider(Credentials::new(
                key,
                secret,
                None,
                None,
                "clipflow-static",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            account: config.account,
        }
    }

    fn location<'a>(&self, path: &'a StoragePath) -> Result<(&'a str, &'a str), BlobError> {
        if path.account() != self.account {
            return Err(BlobError::InvalidPath(format!(
                "path '{path}' is not in storage account '{}'",
                self.account
            )));
        }
        Ok((path.container(), path.blob()))
    }
}

fn backend(err: impl std::fmt::Display) -> BlobError {
    BlobError::Backend(err.to_string())
}

#[async_trait]
impl BlobStorage for S3BlobStorage {
    async fn download(
        &self,
        path: &StoragePath,
        dest: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<u64, BlobError> {
        let (bucket, key) = self.location(path)?;
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("NoSuchKey") || msg.contains("NotFound") {
                    BlobError::NotFound(path.to_string())
                } else {
                    backend(msg)
                }
            })?;

        let total = response.content_length().and_then(|n| u64::try_from(n).ok());
        let mut body = response.body;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = body.try_next().await.map_err(backend)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(report) = progress {
                report(written, total);
            }
        }
        file.flush().await?;

        Ok(written)
    }

    async fn upload(
        &self,
        local: &Path,
        path: &StoragePath,
        metadata: &HashMap<String, String>,
    ) -> Result<(), BlobError> {
        let (bucket, key) = self.location(path)?;
        let body = ByteStream::from_path(local).await.map_err(backend)?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("video/mp4")
            .set_metadata(Some(metadata.clone()))
            .body(body)
            .send()
            .await
            .map_err(backend)?;

        tracing::debug!(path = %path, "Uploaded blob");
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool, BlobError> {
        let (bucket, key) = self.location(path)?;
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("NotFound") || msg.contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(backend(msg))
                }
            }
        }
    }

    async fn list(&self, folder_prefix: &str) -> Result<Vec<StoragePath>, BlobError> {
        let (account, bucket, prefix) = split_folder_prefix(folder_prefix)?;
        if account != self.account {
            return Err(BlobError::InvalidPath(format!(
                "prefix '{folder_prefix}' is not in storage account '{}'",
                self.account
            )));
        }

        let mut paths = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(backend)?;

            for key in response.contents().iter().filter_map(|obj| obj.key()) {
                match StoragePath::new(account, bucket, key) {
                    Ok(path) => paths.push(path),
                    Err(e) => tracing::warn!(key, error = %e, "Skipping unaddressable blob key"),
                }
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(paths)
    }

    async fn delete(&self, path: &StoragePath) -> Result<(), BlobError> {
        let (bucket, key) = self.location(path)?;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }
}
