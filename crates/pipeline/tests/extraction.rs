mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use clipflow_core::error::CoreError;
use clipflow_core::lock::LockHolder;
use clipflow_core::outcome::{BatchStatus, ClipJobStatus};
use clipflow_core::status::{ClipStatus, VideoStatus};
use clipflow_core::video::{ClipStore, SourceVideo};
use common::{range, submission, Harness, ACCOUNT};

/// Ready video with three clips saved for project 7, starting at 0s, 10s
/// and 20s. Returns the video; the extraction job is still queued.
async fn video_with_three_clips(h: &Harness) -> SourceVideo {
    let video = h.ready_video("flight.mp4").await;
    let holder = LockHolder::new(1, "user1@example.com");
    let workflow = h.ctx.workflow();
    workflow.lock_video(video.id, &holder).await.unwrap();
    workflow
        .save_fragments(
            video.id,
            &holder,
            &submission(vec![(
                7,
                vec![
                    range("00:00:00", "00:00:05"),
                    range("00:00:10", "00:00:15"),
                    range("00:00:20", "00:00:25"),
                ],
            )]),
        )
        .await
        .unwrap();
    video
}

async fn clip_statuses(h: &Harness, video_id: i64) -> Vec<ClipStatus> {
    h.records
        .list_by_source(video_id)
        .await
        .unwrap()
        .into_iter()
        .map(|clip| clip.status)
        .collect()
}

#[tokio::test]
async fn full_success_cleans_up_source_and_records_clips() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();

    assert_eq!(summary.status, BatchStatus::Completed);
    assert_eq!(summary.tally.successful, 3);
    assert!(summary.source_deleted);
    assert!(!h.media_path(&video).exists());

    let stored = h.video(video.id).await;
    assert_eq!(stored.status, VideoStatus::Annotated);
    assert_eq!(stored.clip_ids.len(), 3);
    assert_eq!(clip_statuses(&h, video.id).await, vec![ClipStatus::Ready; 3]);

    let clips = h.records.list_by_source(video.id).await.unwrap();
    assert!(clips.iter().all(|c| c.task_id.is_some() && c.fps == Some(30.0)));

    let blob = format!("{ACCOUNT}/clips/flight/flight_7_001.mp4");
    let metadata = h.blobs.metadata(&blob).unwrap();
    assert_eq!(metadata["project_id"], "7");
    assert_eq!(metadata["start"], "00:00:10");

    // Scratch files never outlive their job.
    let leftovers = std::fs::read_dir(&h.config.temp_dir).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn one_failed_upload_keeps_source_for_retry() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    h.blobs.fail_uploads_matching("_001");

    let results = h.drain_jobs().await;
    let summary = results.last().unwrap();
    assert_eq!(summary["status"], "partial_success");
    assert_eq!(summary["tally"]["failed"], 1);
    assert_eq!(summary["source_deleted"], false);

    assert!(h.media_path(&video).exists());
    let stored = h.video(video.id).await;
    assert!(stored.clip_ids.is_empty());
    assert_eq!(stored.status, VideoStatus::Annotated);
    assert_eq!(
        clip_statuses(&h, video.id).await,
        vec![ClipStatus::Ready, ClipStatus::UploadFailed, ClipStatus::Ready]
    );
}

async fn task_ids(h: &Harness, video_id: i64) -> Vec<Option<i64>> {
    h.records
        .list_by_source(video_id)
        .await
        .unwrap()
        .into_iter()
        .map(|clip| clip.task_id)
        .collect()
}

#[tokio::test]
async fn rerun_after_completion_keeps_extracted_clips() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    let first = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(first.status, BatchStatus::Completed);
    let tasks = task_ids(&h, video.id).await;

    assert_matches!(
        h.ctx.workflow().retry_extraction(video.id).await,
        Err(CoreError::InvalidState(_))
    );

    // A redelivered job finds every clip done and leaves them as they are.
    let second = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(second.tally.successful, 3);
    assert!(!second.source_deleted);
    assert_eq!(clip_statuses(&h, video.id).await, vec![ClipStatus::Ready; 3]);
    assert_eq!(task_ids(&h, video.id).await, tasks);
    assert_eq!(h.annotation.created.lock().unwrap().len(), 3);
    assert_eq!(h.video(video.id).await.clip_ids.len(), 3);
}

#[tokio::test]
async fn retry_after_partial_failure_reruns_only_failed_clips() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    h.blobs.fail_uploads_matching("_001");
    let first = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(first.status, BatchStatus::PartialSuccess);
    let tasks = task_ids(&h, video.id).await;
    assert_eq!(h.annotation.created.lock().unwrap().len(), 2);

    let mut fixed = h.ctx.clone();
    fixed.blobs = Arc::new(common::FakeBlobStorage::default());
    fixed.workflow().retry_extraction(video.id).await.unwrap();
    let second = fixed.orchestrator().run(video.id).await.unwrap();

    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(second.tally.successful, 3);
    assert!(second.source_deleted);
    assert_eq!(clip_statuses(&h, video.id).await, vec![ClipStatus::Ready; 3]);

    let created = h.annotation.created.lock().unwrap().clone();
    assert_eq!(created.len(), 3);
    assert_eq!(created[2], "flight_7_001");
    let rerun = task_ids(&h, video.id).await;
    assert_eq!((rerun[0], rerun[2]), (tasks[0], tasks[2]));
    assert!(rerun[1].is_some());
    assert_eq!(h.video(video.id).await.clip_ids.len(), 3);
}

#[tokio::test]
async fn rerun_keeps_clips_without_task_as_partial() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    h.annotation.no_id_for("_002");
    h.ctx.orchestrator().run(video.id).await.unwrap();

    let again = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(again.tally.successful, 2);
    assert_eq!(again.tally.partial, 1);
    assert_eq!(again.outcomes[2].status, ClipJobStatus::PartialSuccess);
    assert_eq!(h.annotation.created.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_task_id_is_partial_but_usable() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    h.annotation.no_id_for("_002");
    h.annotation.fail_for("_000");

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();

    assert_eq!(summary.status, BatchStatus::Completed);
    assert_eq!(summary.tally.partial, 2);
    assert_eq!(summary.tally.successful, 1);
    assert_eq!(summary.outcomes[0].status, ClipJobStatus::PartialSuccess);
    assert!(summary.source_deleted);
    assert_eq!(
        clip_statuses(&h, video.id).await,
        vec![ClipStatus::TaskCreationFailed, ClipStatus::Ready, ClipStatus::TaskCreationFailed]
    );
    // The artifact was still uploaded.
    assert!(h.blobs.metadata(&format!("{ACCOUNT}/clips/flight/flight_7_002.mp4")).is_some());
}

#[tokio::test]
async fn cut_failure_is_recorded_on_the_clip() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    h.media.fail_cut_at("00:00:20");

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(summary.status, BatchStatus::PartialSuccess);
    assert_eq!(summary.outcomes[2].status, ClipJobStatus::Error);
    assert_eq!(clip_statuses(&h, video.id).await[2], ClipStatus::ClipCreationFailed);
}

#[tokio::test]
async fn every_clip_failing_is_still_partial_success() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    std::fs::remove_file(h.media_path(&video)).unwrap();

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(summary.status, BatchStatus::PartialSuccess);
    assert_eq!(summary.tally.failed, 3);
    assert_eq!(clip_statuses(&h, video.id).await, vec![ClipStatus::ClipCreationFailed; 3]);
}

#[tokio::test]
async fn panicking_clip_job_does_not_abort_the_batch() {
    let h = Harness::new();
    let video = video_with_three_clips(&h).await;
    h.media.panic_cut_at("00:00:10");

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(summary.tally.successful, 2);
    assert_eq!(summary.tally.failed, 1);
    assert!(summary.outcomes[1].message.contains("panicked"));
    assert_eq!(clip_statuses(&h, video.id).await[1], ClipStatus::ProcessingFailed);
}

#[tokio::test]
async fn hung_clip_job_times_out() {
    let h = Harness::with_config(|c| c.clip_job_timeout = Duration::from_millis(300));
    let video = video_with_three_clips(&h).await;
    h.media.hang_cut_at("00:00:00");

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(summary.tally.failed, 1);
    assert!(summary.outcomes[0].message.contains("timed out"));
    assert_eq!(clip_statuses(&h, video.id).await[0], ClipStatus::ProcessingFailed);
    assert!(h.media_path(&video).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_is_bounded() {
    let h = Harness::with_config(|c| c.extraction_concurrency = 2);
    let video = video_with_three_clips(&h).await;
    h.media.set_cut_delay(Duration::from_millis(100));

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(summary.status, BatchStatus::Completed);
    assert!(h.media.peak_concurrency() <= 2);
}

#[tokio::test]
async fn strict_mode_resolves_to_annotated_or_error() {
    let ok = Harness::with_config(|c| c.strict_annotation_status = true);
    let video = video_with_three_clips(&ok).await;
    assert_eq!(ok.video(video.id).await.status, VideoStatus::ProcessingClips);
    ok.drain_jobs().await;
    assert_eq!(ok.video(video.id).await.status, VideoStatus::Annotated);

    let failing = Harness::with_config(|c| c.strict_annotation_status = true);
    let video = video_with_three_clips(&failing).await;
    failing.blobs.fail_uploads_matching("_000");
    failing.drain_jobs().await;
    assert_eq!(failing.video(video.id).await.status, VideoStatus::AnnotationError);

    // A retry after fixing the cause completes the video.
    let mut fixed = failing.ctx.clone();
    fixed.blobs = std::sync::Arc::new(common::FakeBlobStorage::default());
    fixed.workflow().retry_extraction(video.id).await.unwrap();
    fixed.orchestrator().run(video.id).await.unwrap();
    assert_eq!(failing.video(video.id).await.status, VideoStatus::Annotated);
}

#[tokio::test]
async fn batch_without_clips_is_an_error() {
    let h = Harness::new();
    let video = h.ready_video("flight.mp4").await;
    let holder = LockHolder::new(1, "user1@example.com");
    h.ctx
        .workflow()
        .save_fragments(video.id, &holder, &submission(vec![(7, vec![])]))
        .await
        .unwrap();

    let summary = h.ctx.orchestrator().run(video.id).await.unwrap();
    assert_eq!(summary.status, BatchStatus::Error);
    assert_eq!(h.video(video.id).await.status, VideoStatus::AnnotationError);
}
