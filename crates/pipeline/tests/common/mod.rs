#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipflow_core::annotation_tool::{AnnotationTool, AnnotationToolError};
use clipflow_core::blob::{split_folder_prefix, BlobError, BlobStorage, ProgressFn};
use clipflow_core::config::PipelineConfig;
use clipflow_core::ffmpeg::FfmpegError;
use clipflow_core::fragments::{FragmentRange, FragmentSubmission, ProjectFragments, ProjectParams};
use clipflow_core::media::{MediaInfo, MediaTool, TranscodeParams};
use clipflow_core::status::VideoStatus;
use clipflow_core::storage_path::StoragePath;
use clipflow_core::types::DbId;
use clipflow_core::video::{SourceVideo, VideoStore};
use clipflow_pipeline::memory::{MemoryJobQueue, MemoryKvStore, MemoryRecordStore};
use clipflow_pipeline::PipelineContext;
use tempfile::TempDir;

pub const ACCOUNT: &str = "dronestore";

// ---------------------------------------------------------------------------
// Blob storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBlobStorage {
    objects: Mutex<BTreeMap<String, (Vec<u8>, HashMap<String, String>)>>,
    failing_uploads: Mutex<HashSet<String>>,
    fail_downloads: AtomicBool,
}

impl FakeBlobStorage {
    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (bytes.to_vec(), HashMap::new()));
    }

    /// Uploads whose blob name contains `needle` fail.
    pub fn fail_uploads_matching(&self, needle: &str) {
        self.failing_uploads.lock().unwrap().insert(needle.to_string());
    }

    pub fn fail_downloads(&self) {
        self.fail_downloads.store(true, Ordering::SeqCst);
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn metadata(&self, path: &str) -> Option<HashMap<String, String>> {
        self.objects.lock().unwrap().get(path).map(|(_, meta)| meta.clone())
    }
}

#[async_trait]
impl BlobStorage for FakeBlobStorage {
    async fn download(
        &self,
        path: &StoragePath,
        dest: &Path,
        progress: Option<&ProgressFn>,
    ) -> Result<u64, BlobError> {
        if self.fail_downloads.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("connection reset".into()));
        }
        let bytes = self
            .objects
            .lock()
            .unwrap()
            .get(&path.to_string())
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| BlobError::NotFound(path.to_string()))?;
        tokio::fs::write(dest, &bytes).await?;
        let total = bytes.len() as u64;
        if let Some(progress) = progress {
            progress(total / 2, Some(total));
            progress(total, Some(total));
        }
        Ok(total)
    }

    async fn upload(
        &self,
        local: &Path,
        path: &StoragePath,
        metadata: &HashMap<String, String>,
    ) -> Result<(), BlobError> {
        let failing = self
            .failing_uploads
            .lock()
            .unwrap()
            .iter()
            .any(|needle| path.blob().contains(needle.as_str()));
        if failing {
            return Err(BlobError::Backend("upload rejected".into()));
        }
        let bytes = tokio::fs::read(local).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (bytes, metadata.clone()));
        Ok(())
    }

    async fn exists(&self, path: &StoragePath) -> Result<bool, BlobError> {
        Ok(self.objects.lock().unwrap().contains_key(&path.to_string()))
    }

    async fn list(&self, folder_prefix: &str) -> Result<Vec<StoragePath>, BlobError> {
        split_folder_prefix(folder_prefix)?;
        let objects = self.objects.lock().unwrap();
        objects
            .keys()
            .filter(|key| key.starts_with(folder_prefix))
            .map(|key| StoragePath::parse(key).map_err(|e| BlobError::InvalidPath(e.to_string())))
            .collect()
    }

    async fn delete(&self, path: &StoragePath) -> Result<(), BlobError> {
        self.objects.lock().unwrap().remove(&path.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Media tool
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMediaTool {
    fail_transcode: AtomicBool,
    failing_cuts: Mutex<HashSet<String>>,
    slow_cuts: Mutex<HashSet<String>>,
    panicking_cuts: Mutex<HashSet<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    cut_delay_ms: AtomicUsize,
}

impl FakeMediaTool {
    pub fn fail_transcode(&self) {
        self.fail_transcode.store(true, Ordering::SeqCst);
    }

    /// Cuts starting at `start` (`HH:MM:SS`) fail.
    pub fn fail_cut_at(&self, start: &str) {
        self.failing_cuts.lock().unwrap().insert(start.to_string());
    }

    /// Cuts starting at `start` never finish within a test.
    pub fn hang_cut_at(&self, start: &str) {
        self.slow_cuts.lock().unwrap().insert(start.to_string());
    }

    pub fn panic_cut_at(&self, start: &str) {
        self.panicking_cuts.lock().unwrap().insert(start.to_string());
    }

    pub fn set_cut_delay(&self, delay: Duration) {
        self.cut_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    /// Highest number of cuts observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTool for FakeMediaTool {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| FfmpegError::MediaNotFound(path.display().to_string()))?;
        Ok(MediaInfo {
            duration_secs: 120.0,
            width: 1920,
            height: 1080,
            fps: 30.0,
            size_bytes: meta.len() as i64,
            video_codec: Some("h264".into()),
            audio_codec: None,
        })
    }

    async fn cut(&self, src: &Path, dst: &Path, start: &str, end: &str) -> Result<(), FfmpegError> {
        if self.panicking_cuts.lock().unwrap().contains(start) {
            panic!("ffmpeg wrapper crashed at {start}");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let hang = self.slow_cuts.lock().unwrap().contains(start);
        let delay = if hang {
            Duration::from_secs(30)
        } else {
            Duration::from_millis(self.cut_delay_ms.load(Ordering::SeqCst) as u64)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_cuts.lock().unwrap().contains(start) {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "Invalid data found when processing input".into(),
            });
        }
        if tokio::fs::metadata(src).await.is_err() {
            return Err(FfmpegError::MediaNotFound(src.display().to_string()));
        }
        tokio::fs::write(dst, format!("clip {start}-{end}")).await?;
        Ok(())
    }

    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        _params: &TranscodeParams,
    ) -> Result<(), FfmpegError> {
        if self.fail_transcode.load(Ordering::SeqCst) {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: Some(1),
                stderr: "moov atom not found".into(),
            });
        }
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Annotation tool
// ---------------------------------------------------------------------------

pub struct FakeAnnotationTool {
    next_id: AtomicI64,
    silent: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<String>>,
}

impl Default for FakeAnnotationTool {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(100),
            silent: Mutex::default(),
            failing: Mutex::default(),
            created: Mutex::default(),
        }
    }
}

impl FakeAnnotationTool {
    /// Tasks whose name ends with `suffix` report no id.
    pub fn no_id_for(&self, suffix: &str) {
        self.silent.lock().unwrap().insert(suffix.to_string());
    }

    pub fn fail_for(&self, suffix: &str) {
        self.failing.lock().unwrap().insert(suffix.to_string());
    }
}

#[async_trait]
impl AnnotationTool for FakeAnnotationTool {
    async fn create_task(
        &self,
        name: &str,
        file_path: &Path,
        _params: &ProjectParams,
    ) -> Result<Option<i64>, AnnotationToolError> {
        assert!(file_path.exists(), "clip file must exist while the task is created");
        if self.failing.lock().unwrap().iter().any(|s| name.ends_with(s.as_str())) {
            return Err(AnnotationToolError::Failed {
                exit_code: 2,
                stderr: "401 Unauthorized".into(),
            });
        }
        if self.silent.lock().unwrap().iter().any(|s| name.ends_with(s.as_str())) {
            return Ok(None);
        }
        self.created.lock().unwrap().push(name.to_string());
        Ok(Some(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub dir: TempDir,
    pub config: Arc<PipelineConfig>,
    pub records: Arc<MemoryRecordStore>,
    pub kv: Arc<MemoryKvStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub blobs: Arc<FakeBlobStorage>,
    pub media: Arc<FakeMediaTool>,
    pub annotation: Arc<FakeAnnotationTool>,
    pub ctx: PipelineContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut PipelineConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new(ACCOUNT);
        config.media_root = dir.path().join("media");
        config.temp_dir = dir.path().join("tmp");
        config.lock_ttl = Duration::from_secs(60);
        config.clip_job_timeout = Duration::from_secs(10);
        customize(&mut config);
        let config = Arc::new(config);

        let records = Arc::new(MemoryRecordStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let blobs = Arc::new(FakeBlobStorage::default());
        let media = Arc::new(FakeMediaTool::default());
        let annotation = Arc::new(FakeAnnotationTool::default());

        let ctx = PipelineContext {
            config: config.clone(),
            videos: records.clone(),
            clips: records.clone(),
            kv: kv.clone(),
            blobs: blobs.clone(),
            media: media.clone(),
            annotation: annotation.clone(),
            queue: queue.clone(),
        };

        Self {
            dir,
            config,
            records,
            kv,
            queue,
            blobs,
            media,
            annotation,
            ctx,
        }
    }

    /// Execute queued jobs until the queue is empty, returning their results.
    pub async fn drain_jobs(&self) -> Vec<serde_json::Value> {
        let mut results = Vec::new();
        loop {
            let pending = self.queue.take_pending();
            if pending.is_empty() {
                return results;
            }
            for (id, job) in pending {
                match self.ctx.execute(&job).await {
                    Ok(value) => {
                        self.queue.finish(id, Ok(value.clone()));
                        results.push(value);
                    }
                    Err(e) => self.queue.finish(id, Err(e.to_string())),
                }
            }
        }
    }

    /// Upload a raw blob, register it and run its ingest job.
    pub async fn ready_video(&self, file_name: &str) -> SourceVideo {
        let path = format!("{ACCOUNT}/raw/{file_name}");
        self.blobs.put(&path, b"raw video bytes");
        let registration = self.ctx.workflow().register_video(&path).await.unwrap();
        self.drain_jobs().await;
        let video = self.video(registration.video.id).await;
        assert_eq!(video.status, VideoStatus::NotAnnotated);
        video
    }

    pub async fn video(&self, id: DbId) -> SourceVideo {
        VideoStore::get_by_id(self.records.as_ref(), id)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn media_path(&self, video: &SourceVideo) -> std::path::PathBuf {
        clipflow_core::storage_path::local_media_path(&self.config.media_root, &video.storage_path)
    }
}

pub fn params(project_id: DbId) -> ProjectParams {
    ProjectParams {
        project_id,
        overlap: 0,
        segment_size: 100,
        image_quality: 70,
    }
}

pub fn range(start: &str, end: &str) -> FragmentRange {
    FragmentRange {
        start: start.to_string(),
        end: end.to_string(),
    }
}

pub fn submission(projects: Vec<(DbId, Vec<FragmentRange>)>) -> FragmentSubmission {
    FragmentSubmission {
        skip: false,
        projects: projects
            .into_iter()
            .map(|(project_id, clips)| ProjectFragments {
                params: params(project_id),
                clips,
            })
            .collect(),
    }
}
