//! Media tooling contract: probe, cut and transcode.
//!
//! The production implementation shells out to ffmpeg/ffprobe
//! ([`crate::ffmpeg::FfmpegMediaTool`]); tests substitute fakes.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::ffmpeg::FfmpegError;

/// Technical metadata of a media file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub size_bytes: i64,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
}

/// Encoder settings for source conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeParams {
    pub codec: String,
    pub crf: u8,
    pub preset: String,
}

impl Default for TranscodeParams {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            crf: 23,
            preset: "medium".to_string(),
        }
    }
}

#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError>;

    /// Cut `[start, end)` of `src` into `dst`. Both bounds are `HH:MM:SS`.
    async fn cut(&self, src: &Path, dst: &Path, start: &str, end: &str) -> Result<(), FfmpegError>;

    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        params: &TranscodeParams,
    ) -> Result<(), FfmpegError>;
}
