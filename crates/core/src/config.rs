use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::annotation_tool::AnnotationToolConfig;
use crate::error::CoreError;
use crate::fragments::DEFAULT_MIN_CLIP_DURATION_SECS;
use crate::lock::DEFAULT_LOCK_TTL_SECS;
use crate::media::TranscodeParams;

/// Immutable pipeline configuration, built once at startup and shared as
/// `Arc<PipelineConfig>` by every service that needs it.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Storage account every registered path must reference.
    pub storage_account: String,
    /// Container receiving derived clip artifacts.
    pub clip_container: String,
    /// Directory holding converted source media.
    pub media_root: PathBuf,
    /// Scratch directory for clip files while they are cut and uploaded.
    pub temp_dir: PathBuf,
    pub lock_ttl: Duration,
    pub min_clip_duration_secs: f64,
    /// Clip jobs run concurrently within one batch.
    pub extraction_concurrency: usize,
    pub clip_job_timeout: Duration,
    pub sweep_interval: Duration,
    /// When set, fragment save moves the video to `processing_clips` and the
    /// batch result decides `annotated` or `annotation_error`.
    pub strict_annotation_status: bool,
    pub annotation_tool: AnnotationToolConfig,
    pub transcode: TranscodeParams,
}

impl PipelineConfig {
    /// Defaults for everything except the storage account.
    pub fn new(storage_account: impl Into<String>) -> Self {
        Self {
            storage_account: storage_account.into(),
            clip_container: "clips".to_string(),
            media_root: PathBuf::from("./media"),
            temp_dir: std::env::temp_dir(),
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            min_clip_duration_secs: DEFAULT_MIN_CLIP_DURATION_SECS,
            extraction_concurrency: 4,
            clip_job_timeout: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(3600),
            strict_annotation_status: false,
            annotation_tool: AnnotationToolConfig::default(),
            transcode: TranscodeParams::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default          |
    /// |--------------------------------|------------------|
    /// | `STORAGE_ACCOUNT`              | required         |
    /// | `CLIP_CONTAINER`               | `clips`          |
    /// | `MEDIA_ROOT`                   | `./media`        |
    /// | `TEMP_DIR`                     | system temp dir  |
    /// | `LOCK_TTL_SECS`                | `3600`           |
    /// | `MIN_CLIP_DURATION_SECS`       | `1`              |
    /// | `EXTRACTION_CONCURRENCY`       | `4`              |
    /// | `CLIP_JOB_TIMEOUT_SECS`        | `1800`           |
    /// | `SWEEP_INTERVAL_SECS`          | `3600`           |
    /// | `STRICT_ANNOTATION_STATUS`     | `false`          |
    /// | `ANNOTATION_TOOL_BIN`          | `cvat-cli`       |
    /// | `ANNOTATION_TOOL_HOST`         | `localhost:8080` |
    /// | `ANNOTATION_TOOL_USER`         | unset            |
    /// | `ANNOTATION_TOOL_PASSWORD`     | unset            |
    /// | `ANNOTATION_TOOL_TIMEOUT_SECS` | `600`            |
    /// | `TRANSCODE_CODEC`              | `libx264`        |
    /// | `TRANSCODE_CRF`                | `23`             |
    /// | `TRANSCODE_PRESET`             | `medium`         |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let env = EnvReader { lookup: &lookup };

        let storage_account = env
            .string("STORAGE_ACCOUNT")
            .ok_or_else(|| CoreError::Validation("STORAGE_ACCOUNT must be set".into()))?;
        let defaults = Self::new(storage_account);
        let tool_defaults = AnnotationToolConfig::default();
        let transcode_defaults = TranscodeParams::default();

        let config = Self {
            clip_container: env.string("CLIP_CONTAINER").unwrap_or(defaults.clip_container),
            media_root: env.string("MEDIA_ROOT").map(PathBuf::from).unwrap_or(defaults.media_root),
            temp_dir: env.string("TEMP_DIR").map(PathBuf::from).unwrap_or(defaults.temp_dir),
            lock_ttl: Duration::from_secs(env.parse("LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS)?),
            min_clip_duration_secs: env
                .parse("MIN_CLIP_DURATION_SECS", DEFAULT_MIN_CLIP_DURATION_SECS)?,
            extraction_concurrency: env
                .parse("EXTRACTION_CONCURRENCY", defaults.extraction_concurrency)?,
            clip_job_timeout: Duration::from_secs(env.parse("CLIP_JOB_TIMEOUT_SECS", 1800)?),
            sweep_interval: Duration::from_secs(env.parse("SWEEP_INTERVAL_SECS", 3600)?),
            strict_annotation_status: env.parse("STRICT_ANNOTATION_STATUS", false)?,
            annotation_tool: AnnotationToolConfig {
                bin: env.string("ANNOTATION_TOOL_BIN").map(PathBuf::from).unwrap_or(tool_defaults.bin),
                host: env.string("ANNOTATION_TOOL_HOST").unwrap_or(tool_defaults.host),
                user: env.string("ANNOTATION_TOOL_USER"),
                password: env.string("ANNOTATION_TOOL_PASSWORD"),
                timeout: Duration::from_secs(env.parse("ANNOTATION_TOOL_TIMEOUT_SECS", 600)?),
            },
            transcode: TranscodeParams {
                codec: env.string("TRANSCODE_CODEC").unwrap_or(transcode_defaults.codec),
                crf: env.parse("TRANSCODE_CRF", transcode_defaults.crf)?,
                preset: env.string("TRANSCODE_PRESET").unwrap_or(transcode_defaults.preset),
            },
            storage_account: defaults.storage_account,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.lock_ttl.is_zero() {
            return Err(CoreError::Validation("LOCK_TTL_SECS must be positive".into()));
        }
        if self.extraction_concurrency == 0 {
            return Err(CoreError::Validation(
                "EXTRACTION_CONCURRENCY must be at least 1".into(),
            ));
        }
        if !self.min_clip_duration_secs.is_finite() || self.min_clip_duration_secs < 0.0 {
            return Err(CoreError::Validation(
                "MIN_CLIP_DURATION_SECS must be a non-negative number".into(),
            ));
        }
        Ok(())
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    /// Non-empty trimmed value of `key`.
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, CoreError> {
        match self.string(key) {
            Some(raw) => raw
                .parse()
                .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: '{raw}'"))),
            None => Ok(default),
        }
    }
}
