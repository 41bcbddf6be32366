//! FFmpeg/FFprobe command wrappers backing [`MediaTool`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::media::{MediaInfo, MediaTool, TranscodeParams};

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
}

// ---------------------------------------------------------------------------
// Media tool
// ---------------------------------------------------------------------------

/// [`MediaTool`] that runs the `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegMediaTool {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
}

impl Default for FfmpegMediaTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegMediaTool {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    async fn run_ffmpeg(&self, args: Vec<std::ffi::OsString>) -> Result<(), FfmpegError> {
        let output = tokio::process::Command::new(&self.ffmpeg_bin)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), 2000),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaTool for FfmpegMediaTool {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
        ensure_exists(path)?;

        let output = tokio::process::Command::new(&self.ffprobe_bin)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let probe = serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))?;

        let mut info = media_info(&probe);
        if info.size_bytes == 0 {
            info.size_bytes = tokio::fs::metadata(path).await?.len() as i64;
        }
        Ok(info)
    }

    async fn cut(&self, src: &Path, dst: &Path, start: &str, end: &str) -> Result<(), FfmpegError> {
        ensure_exists(src)?;

        let mut args: Vec<std::ffi::OsString> = vec!["-y".into(), "-i".into(), src.into()];
        args.extend(
            ["-ss", start, "-to", end, "-c:v", "libx264", "-c:a", "aac", "-movflags", "+faststart"]
                .map(std::ffi::OsString::from),
        );
        args.push(dst.into());

        self.run_ffmpeg(args).await?;
        ensure_exists(dst)
    }

    async fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        params: &TranscodeParams,
    ) -> Result<(), FfmpegError> {
        ensure_exists(src)?;

        let crf = params.crf.to_string();
        let mut args: Vec<std::ffi::OsString> = vec!["-y".into(), "-i".into(), src.into()];
        args.extend(
            [
                "-c:v",
                params.codec.as_str(),
                "-crf",
                crf.as_str(),
                "-preset",
                params.preset.as_str(),
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
            ]
            .map(std::ffi::OsString::from),
        );
        args.push(dst.into());

        self.run_ffmpeg(args).await?;
        ensure_exists(dst)
    }
}

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if path.exists() {
        Ok(())
    } else {
        Err(FfmpegError::MediaNotFound(path.to_string_lossy().to_string()))
    }
}

/// Keep the last `max` bytes of tool output; ffmpeg puts the cause at the end.
fn tail(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    s[start..].to_string()
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn first_stream<'a>(probe: &'a FfprobeOutput, kind: &str) -> Option<&'a FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some(kind))
}

/// Collapse ffprobe output into [`MediaInfo`].
pub fn media_info(probe: &FfprobeOutput) -> MediaInfo {
    let (width, height) = parse_resolution(probe);
    MediaInfo {
        duration_secs: parse_duration(probe),
        width,
        height,
        fps: parse_framerate(probe),
        size_bytes: probe
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        video_codec: first_stream(probe, "video").and_then(|s| s.codec_name.clone()),
        audio_codec: first_stream(probe, "audio").and_then(|s| s.codec_name.clone()),
    }
}

/// Duration in seconds, from the container first and the video stream second.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            first_stream(probe, "video")
                .and_then(|s| s.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0)
}

/// Video framerate. `r_frame_rate` is a fraction like `"30/1"`.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_stream(probe, "video")
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_stream(probe, "video")
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}

fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.parse::<f64>().unwrap_or(0.0),
    }
}
