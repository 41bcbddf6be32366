#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use clipflow_api::auth::jwt::{generate_access_token, JwtConfig};
use clipflow_api::router::build_app_router;
use clipflow_api::state::AppState;
use clipflow_core::annotation_tool::{AnnotationTool, AnnotationToolError};
use clipflow_core::blob::{split_folder_prefix, BlobError, BlobStorage, ProgressFn};
use clipflow_core::config::PipelineConfig;
use clipflow_core::ffmpeg::FfmpegError;
use clipflow_core::fragments::ProjectParams;
use clipflow_core::media::{MediaInfo, MediaTool, TranscodeParams};
use clipflow_core::status::VideoStatus;
use clipflow_core::storage_path::StoragePath;
use clipflow_core::video::{NewSourceVideo, SourceVideo, VideoStore};
use clipflow_pipeline::memory::{MemoryJobQueue, MemoryKvStore, MemoryRecordStore};
use clipflow_pipeline::PipelineContext;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ACCOUNT: &str = "dronestore";

// ---------------------------------------------------------------------------
// Collaborator stubs
// ---------------------------------------------------------------------------

/// Blob storage that only tracks object names.
#[derive(Default)]
pub struct StubBlobStorage {
    objects: Mutex<HashSet<String>>,
}

impl StubBlobStorage {
    pub fn put(&self, path: &str) {
        self.objects.lock().unwrap().insert(path.to_string());
    }
}

#[async_trait]
impl BlobStorage for StubBlobStorage {
    async fn download(
        &self,
        path: &StoragePath,
        _dest: &Path,
        _progress: Option<&ProgressFn>,
    ) -> Result<u64, BlobError> {
        Err(BlobError::NotFound(path.to_string()))
    }

    async fn upload(
        &self,
        _local: &Path,
        path: &StoragePath,
        _metadata: &HashMap<String, String>,
    ) -> Result<(), BlobError> {
        self.put(&path.to_string());
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool, BlobError> {
        Ok(self.objects.lock().unwrap().contains(&path.to_string()))
    }

    async fn list(&self, folder_prefix: &str) -> Result<Vec<StoragePath>, BlobError> {
        split_folder_prefix(folder_prefix)?;
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|key| key.starts_with(folder_prefix))
            .map(|key| StoragePath::parse(key).map_err(|e| BlobError::InvalidPath(e.to_string())))
            .collect()
    }

    async fn delete(&self, path: &StoragePath) -> Result<(), BlobError> {
        self.objects.lock().unwrap().remove(&path.to_string());
        Ok(())
    }
}

/// The HTTP layer never runs media work inline.
pub struct UnusedMediaTool;

#[async_trait]
impl MediaTool for UnusedMediaTool {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
        Err(FfmpegError::MediaNotFound(path.display().to_string()))
    }

    async fn cut(&self, src: &Path, _dst: &Path, _start: &str, _end: &str) -> Result<(), FfmpegError> {
        Err(FfmpegError::MediaNotFound(src.display().to_string()))
    }

    async fn transcode(
        &self,
        src: &Path,
        _dst: &Path,
        _params: &TranscodeParams,
    ) -> Result<(), FfmpegError> {
        Err(FfmpegError::MediaNotFound(src.display().to_string()))
    }
}

pub struct UnusedAnnotationTool;

#[async_trait]
impl AnnotationTool for UnusedAnnotationTool {
    async fn create_task(
        &self,
        _name: &str,
        _file_path: &Path,
        _params: &ProjectParams,
    ) -> Result<Option<i64>, AnnotationToolError> {
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub records: Arc<MemoryRecordStore>,
    pub kv: Arc<MemoryKvStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub blobs: Arc<StubBlobStorage>,
    pub jwt: JwtConfig,
    _dir: TempDir,
}

/// Build the full router over in-memory stores, with the same middleware
/// stack as `main.rs`.
pub fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::new(ACCOUNT);
    config.media_root = dir.path().join("media");
    config.temp_dir = dir.path().join("tmp");
    config.lock_ttl = Duration::from_secs(60);

    let records = Arc::new(MemoryRecordStore::new());
    let kv = Arc::new(MemoryKvStore::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let blobs = Arc::new(StubBlobStorage::default());

    let ctx = PipelineContext {
        config: Arc::new(config),
        videos: records.clone(),
        clips: records.clone(),
        kv: kv.clone(),
        blobs: blobs.clone(),
        media: Arc::new(UnusedMediaTool),
        annotation: Arc::new(UnusedAnnotationTool),
        queue: queue.clone(),
    };
    let jwt = JwtConfig {
        secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
        access_token_expiry_mins: 15,
    };
    let state = AppState {
        ctx,
        jwt: Arc::new(jwt.clone()),
    };
    let router = build_app_router(
        state,
        &["http://localhost:5173".to_string()],
        Duration::from_secs(30),
    );

    TestApp {
        router,
        records,
        kv,
        queue,
        blobs,
        jwt,
        _dir: dir,
    }
}

impl TestApp {
    pub fn token(&self, user_id: i64, role: &str) -> String {
        generate_access_token(user_id, &format!("user{user_id}@example.com"), role, &self.jwt)
            .unwrap()
    }

    /// Insert a video directly into the record store.
    pub async fn seed_video(&self, file_name: &str, status: VideoStatus) -> SourceVideo {
        self.records
            .create(&NewSourceVideo {
                storage_path: StoragePath::new(ACCOUNT, "raw", file_name).unwrap(),
                status,
            })
            .await
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            Request::get(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, token: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            Request::delete(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
