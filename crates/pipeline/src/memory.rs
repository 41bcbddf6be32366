//! In-process implementations of the store and queue contracts.
//!
//! Used by single-process deployments without Postgres and by tests. The
//! key-value store measures TTLs with [`tokio::time::Instant`], so tests can
//! drive expiry with a paused clock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clipflow_core::error::CoreError;
use clipflow_core::lock::{ExpiringKvStore, KvEntry, KvError};
use clipflow_core::queue::{JobHandle, JobQueue, JobState, JobStatusReport, PipelineJob};
use clipflow_core::status::{ClipStatus, VideoStatus};
use clipflow_core::storage_path::StoragePath;
use clipflow_core::types::DbId;
use clipflow_core::video::{
    Clip, ClipStore, ClipUpdate, NewClip, NewSourceVideo, SourceVideo, VideoStore, VideoUpdate,
};
use tokio::time::Instant;

fn poisoned<T>(_: T) -> CoreError {
    CoreError::Internal("in-memory store lock poisoned".into())
}

// ---------------------------------------------------------------------------
// Expiring key-value store
// ---------------------------------------------------------------------------

struct StoredValue {
    value: String,
    deadline: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline.is_none_or(|deadline| deadline > now)
    }

    fn entry(&self, now: Instant) -> KvEntry {
        KvEntry {
            value: self.value.clone(),
            ttl: self.deadline.map(|d| d.saturating_duration_since(now)),
        }
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, StoredValue>>,
    unavailable: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Write a key without TTL, bypassing the conditional write.
    pub async fn insert_persistent(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    deadline: None,
                },
            );
        }
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, StoredValue>, Instant) -> T,
    ) -> Result<T, KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("connection refused".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| KvError::Unavailable("store lock poisoned".into()))?;
        let now = Instant::now();
        entries.retain(|_, stored| stored.is_live(now));
        Ok(f(&mut entries, now))
    }
}

#[async_trait]
impl ExpiringKvStore for MemoryKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    deadline: Some(now + ttl),
                },
            );
            true
        })
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        self.with_entries(|entries, now| entries.get(key).map(|stored| stored.entry(now)))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<KvEntry>>, KvError> {
        self.with_entries(|entries, now| {
            keys.iter()
                .map(|key| entries.get(key).map(|stored| stored.entry(now)))
                .collect()
        })
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        self.with_entries(|entries, _| {
            if entries.get(key).is_some_and(|stored| stored.value == expected) {
                entries.remove(key);
                true
            } else {
                false
            }
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.with_entries(|entries, _| entries.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        self.with_entries(|entries, _| {
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            keys
        })
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.with_entries(|_, _| ())
    }
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Records {
    next_video_id: DbId,
    next_clip_id: DbId,
    videos: BTreeMap<DbId, SourceVideo>,
    clips: BTreeMap<DbId, Clip>,
}

/// Video and clip records sharing one state, so deleting a video cascades
/// to its clips like the Postgres foreign key does.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<Records>,
    unavailable: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut Records) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Unavailable("record store unreachable".into()));
        }
        let mut records = self.records.lock().map_err(poisoned)?;
        f(&mut records)
    }
}

#[async_trait]
impl VideoStore for MemoryRecordStore {
    async fn get_by_path(&self, path: &StoragePath) -> Result<Option<SourceVideo>, CoreError> {
        self.with_records(|r| {
            Ok(r.videos
                .values()
                .find(|video| &video.storage_path == path)
                .cloned())
        })
    }

    async fn get_by_id(&self, id: DbId) -> Result<Option<SourceVideo>, CoreError> {
        self.with_records(|r| Ok(r.videos.get(&id).cloned()))
    }

    async fn create(&self, input: &NewSourceVideo) -> Result<SourceVideo, CoreError> {
        self.with_records(|r| {
            if r.videos
                .values()
                .any(|video| video.storage_path == input.storage_path)
            {
                return Err(CoreError::Conflict(format!(
                    "A source video with path '{}' already exists",
                    input.storage_path
                )));
            }
            r.next_video_id += 1;
            let now = Utc::now();
            let video = SourceVideo {
                id: r.next_video_id,
                storage_path: input.storage_path.clone(),
                status: input.status,
                duration_secs: None,
                width: None,
                height: None,
                fps: None,
                size_bytes: None,
                clip_ids: Vec::new(),
                skip_annotation: false,
                created_at: now,
                updated_at: now,
            };
            r.videos.insert(video.id, video.clone());
            Ok(video)
        })
    }

    async fn update_fields(&self, id: DbId, update: &VideoUpdate) -> Result<bool, CoreError> {
        self.with_records(|r| {
            let Some(video) = r.videos.get_mut(&id) else {
                return Ok(false);
            };
            if update.expected_status.is_some_and(|expected| video.status != expected) {
                return Ok(false);
            }
            if let Some(status) = update.status {
                video.status = status;
            }
            if let Some(v) = update.duration_secs {
                video.duration_secs = Some(v);
            }
            if let Some(v) = update.width {
                video.width = Some(v);
            }
            if let Some(v) = update.height {
                video.height = Some(v);
            }
            if let Some(v) = update.fps {
                video.fps = Some(v);
            }
            if let Some(v) = update.size_bytes {
                video.size_bytes = Some(v);
            }
            if let Some(ids) = &update.clip_ids {
                video.clip_ids = ids.clone();
            }
            if let Some(skip) = update.skip_annotation {
                video.skip_annotation = skip;
            }
            video.updated_at = Utc::now();
            Ok(true)
        })
    }

    async fn list_all(&self, status: Option<VideoStatus>) -> Result<Vec<SourceVideo>, CoreError> {
        self.with_records(|r| {
            Ok(r.videos
                .values()
                .rev()
                .filter(|video| status.is_none_or(|s| video.status == s))
                .cloned()
                .collect())
        })
    }

    async fn delete(&self, id: DbId) -> Result<bool, CoreError> {
        self.with_records(|r| {
            let removed = r.videos.remove(&id).is_some();
            if removed {
                r.clips.retain(|_, clip| clip.source_video_id != id);
            }
            Ok(removed)
        })
    }

    async fn ping(&self) -> Result<(), CoreError> {
        self.with_records(|_| Ok(()))
    }
}

#[async_trait]
impl ClipStore for MemoryRecordStore {
    async fn get_by_id(&self, id: DbId) -> Result<Option<Clip>, CoreError> {
        self.with_records(|r| Ok(r.clips.get(&id).cloned()))
    }

    async fn list_by_source(&self, source_video_id: DbId) -> Result<Vec<Clip>, CoreError> {
        self.with_records(|r| {
            let mut clips: Vec<Clip> = r
                .clips
                .values()
                .filter(|clip| clip.source_video_id == source_video_id)
                .cloned()
                .collect();
            clips.sort_by_key(|clip| (clip.params.project_id, clip.clip_index));
            Ok(clips)
        })
    }

    async fn bulk_replace_for_source(
        &self,
        source_video_id: DbId,
        clips: &[NewClip],
    ) -> Result<Vec<Clip>, CoreError> {
        self.with_records(|r| {
            if !r.videos.contains_key(&source_video_id) {
                return Err(CoreError::not_found("SourceVideo", source_video_id));
            }
            let mut seen = std::collections::HashSet::new();
            for clip in clips {
                if !seen.insert((clip.params.project_id, clip.clip_index)) {
                    return Err(CoreError::Conflict(format!(
                        "Duplicate clip {} for project {}",
                        clip.clip_index, clip.params.project_id
                    )));
                }
            }

            r.clips.retain(|_, clip| clip.source_video_id != source_video_id);
            let now = Utc::now();
            let mut created = Vec::with_capacity(clips.len());
            for input in clips {
                r.next_clip_id += 1;
                let clip = Clip {
                    id: r.next_clip_id,
                    source_video_id,
                    clip_index: input.clip_index,
                    storage_path: input.storage_path.clone(),
                    start_offset_secs: input.start_offset_secs,
                    duration_secs: input.duration_secs,
                    params: input.params,
                    task_id: None,
                    status: ClipStatus::Pending,
                    fps: None,
                    width: None,
                    height: None,
                    size_bytes: None,
                    created_at: now,
                    updated_at: now,
                };
                r.clips.insert(clip.id, clip.clone());
                created.push(clip);
            }
            Ok(created)
        })
    }

    async fn update_fields(&self, id: DbId, update: &ClipUpdate) -> Result<bool, CoreError> {
        self.with_records(|r| {
            let Some(clip) = r.clips.get_mut(&id) else {
                return Ok(false);
            };
            if let Some(status) = update.status {
                clip.status = status;
            }
            if let Some(task_id) = update.task_id {
                clip.task_id = Some(task_id);
            }
            if let Some(v) = update.fps {
                clip.fps = Some(v);
            }
            if let Some(v) = update.width {
                clip.width = Some(v);
            }
            if let Some(v) = update.height {
                clip.height = Some(v);
            }
            if let Some(v) = update.size_bytes {
                clip.size_bytes = Some(v);
            }
            clip.updated_at = Utc::now();
            Ok(true)
        })
    }
}

// ---------------------------------------------------------------------------
// Job queue
// ---------------------------------------------------------------------------

struct QueuedJob {
    job: PipelineJob,
    state: JobState,
    attempts: i32,
    meta: serde_json::Value,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

/// FIFO job queue. Jobs stay pending until a caller takes them with
/// [`MemoryJobQueue::take_pending`] and reports back with
/// [`MemoryJobQueue::finish`].
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<BTreeMap<DbId, QueuedJob>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job ever enqueued, oldest first.
    pub fn enqueued(&self) -> Vec<PipelineJob> {
        self.jobs
            .lock()
            .map(|jobs| jobs.values().map(|queued| queued.job.clone()).collect())
            .unwrap_or_default()
    }

    /// Claim all pending jobs, marking them in progress.
    pub fn take_pending(&self) -> Vec<(DbId, PipelineJob)> {
        let Ok(mut jobs) = self.jobs.lock() else {
            return Vec::new();
        };
        let now = Utc::now();
        jobs.iter_mut()
            .filter(|(_, queued)| queued.state == JobState::Pending)
            .map(|(id, queued)| {
                queued.state = JobState::Progress;
                queued.attempts += 1;
                queued.updated_at = now;
                (*id, queued.job.clone())
            })
            .collect()
    }

    /// Record the result of a claimed job.
    pub fn finish(&self, job_id: DbId, result: Result<serde_json::Value, String>) {
        let Ok(mut jobs) = self.jobs.lock() else {
            return;
        };
        if let Some(queued) = jobs.get_mut(&job_id) {
            match result {
                Ok(meta) => {
                    queued.state = JobState::Success;
                    queued.meta = meta;
                }
                Err(error) => {
                    queued.state = JobState::Failure;
                    queued.meta = serde_json::json!({ "error": error });
                }
            }
            queued.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<JobHandle, CoreError> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        let id = jobs.keys().next_back().copied().unwrap_or(0) + 1;
        let now = Utc::now();
        jobs.insert(
            id,
            QueuedJob {
                job: job.clone(),
                state: JobState::Pending,
                attempts: 0,
                meta: serde_json::Value::Null,
                created_at: now,
                updated_at: now,
            },
        );
        tracing::debug!(job_id = id, kind = job.name(), "Job enqueued");
        Ok(JobHandle {
            id,
            name: job.name().to_string(),
        })
    }

    async fn status(&self, job_id: DbId) -> Result<Option<JobStatusReport>, CoreError> {
        let jobs = self.jobs.lock().map_err(poisoned)?;
        Ok(jobs.get(&job_id).map(|queued| JobStatusReport {
            id: job_id,
            name: queued.job.name().to_string(),
            state: queued.state,
            attempts: queued.attempts,
            meta: queued.meta.clone(),
            created_at: queued.created_at,
            updated_at: queued.updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clipflow_core::fragments::ProjectParams;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn kv_entries_expire() {
        let kv = MemoryKvStore::new();
        assert!(kv.set_if_absent("k", "v1", Duration::from_secs(5)).await.unwrap());
        assert!(!kv.set_if_absent("k", "v2", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(kv.get("k").await.unwrap().is_none());
        assert!(kv.set_if_absent("k", "v2", Duration::from_secs(5)).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().unwrap().value, "v2");
    }

    #[tokio::test]
    async fn kv_conditional_delete_checks_value() {
        let kv = MemoryKvStore::new();
        kv.set_if_absent("k", "mine", Duration::from_secs(5)).await.unwrap();
        assert!(!kv.delete_if_value("k", "theirs").await.unwrap());
        assert!(kv.delete_if_value("k", "mine").await.unwrap());
        assert!(!kv.delete("k").await.unwrap());
    }

    fn path(blob: &str) -> StoragePath {
        StoragePath::new("acct", "raw", blob).unwrap()
    }

    fn new_clip(project_id: DbId, clip_index: i32) -> NewClip {
        NewClip {
            clip_index,
            storage_path: StoragePath::new("acct", "clips", format!("v/{project_id}_{clip_index}.mp4"))
                .unwrap(),
            start_offset_secs: 0.0,
            duration_secs: 5.0,
            params: ProjectParams {
                project_id,
                overlap: 0,
                segment_size: 100,
                image_quality: 70,
            },
        }
    }

    #[tokio::test]
    async fn duplicate_paths_conflict() {
        let store = MemoryRecordStore::new();
        let input = NewSourceVideo {
            storage_path: path("a.mp4"),
            status: VideoStatus::Downloading,
        };
        store.create(&input).await.unwrap();
        assert_matches!(store.create(&input).await, Err(CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn status_transition_is_compare_and_set() {
        let store = MemoryRecordStore::new();
        let video = store
            .create(&NewSourceVideo {
                storage_path: path("a.mp4"),
                status: VideoStatus::NotAnnotated,
            })
            .await
            .unwrap();

        let stale = VideoUpdate::transition(VideoStatus::InProgress, VideoStatus::NotAnnotated);
        assert!(!VideoStore::update_fields(&store, video.id, &stale).await.unwrap());

        let fresh = VideoUpdate::transition(VideoStatus::NotAnnotated, VideoStatus::InProgress);
        assert!(VideoStore::update_fields(&store, video.id, &fresh).await.unwrap());
        let stored = VideoStore::get_by_id(&store, video.id).await.unwrap().unwrap();
        assert_eq!(stored.status, VideoStatus::InProgress);
    }

    #[tokio::test]
    async fn replace_and_cascade_delete() {
        let store = MemoryRecordStore::new();
        let video = store
            .create(&NewSourceVideo {
                storage_path: path("a.mp4"),
                status: VideoStatus::NotAnnotated,
            })
            .await
            .unwrap();

        store
            .bulk_replace_for_source(video.id, &[new_clip(2, 0), new_clip(1, 0)])
            .await
            .unwrap();
        let replaced = store
            .bulk_replace_for_source(video.id, &[new_clip(3, 0)])
            .await
            .unwrap();
        let listed = store.list_by_source(video.id).await.unwrap();
        assert_eq!(listed, replaced);

        assert!(VideoStore::delete(&store, video.id).await.unwrap());
        assert!(store.list_by_source(video.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_tracks_job_lifecycle() {
        let queue = MemoryJobQueue::new();
        let handle = queue
            .enqueue(&PipelineJob::ExtractClips { video_id: 4 })
            .await
            .unwrap();
        assert_eq!(handle.name, "extract_clips");

        let taken = queue.take_pending();
        assert_eq!(taken.len(), 1);
        assert!(queue.take_pending().is_empty());

        queue.finish(handle.id, Err("boom".into()));
        let report = queue.status(handle.id).await.unwrap().unwrap();
        assert_eq!(report.state, JobState::Failure);
        assert_eq!(report.meta["error"], "boom");
        assert_eq!(report.attempts, 1);
    }
}
