//! External annotation tool: task creation for uploaded clips.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::fragments::ProjectParams;
use crate::subprocess::{run_command, SubprocessError};

/// Matches "Created task ID: 42", "created task id 42" and similar.
static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)created\s+task(?:\s+id)?\s*[:=]?\s*(\d+)").expect("valid task id regex")
});

#[derive(Debug, thiserror::Error)]
pub enum AnnotationToolError {
    #[error("annotation tool process error: {0}")]
    Process(#[from] SubprocessError),

    #[error("annotation tool exited with code {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },
}

/// Task creation in the external annotation tool.
#[async_trait]
pub trait AnnotationTool: Send + Sync {
    /// Create a task for `file_path`. `Ok(None)` means the tool ran but
    /// reported no task id.
    async fn create_task(
        &self,
        name: &str,
        file_path: &Path,
        params: &ProjectParams,
    ) -> Result<Option<i64>, AnnotationToolError>;
}

/// Connection settings for the annotation tool CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationToolConfig {
    pub bin: PathBuf,
    pub host: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for AnnotationToolConfig {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("cvat-cli"),
            host: "localhost:8080".to_string(),
            user: None,
            password: None,
            timeout: Duration::from_secs(600),
        }
    }
}

/// [`AnnotationTool`] backed by the vendor command-line client.
#[derive(Debug, Clone)]
pub struct CliAnnotationTool {
    config: AnnotationToolConfig,
}

impl CliAnnotationTool {
    pub fn new(config: AnnotationToolConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, name: &str, file_path: &Path, params: &ProjectParams) -> Command {
        let mut cmd = Command::new(&self.config.bin);
        cmd.arg("--server-host").arg(&self.config.host);
        if let (Some(user), Some(password)) = (&self.config.user, &self.config.password) {
            cmd.arg("--auth").arg(format!("{user}:{password}"));
        }
        cmd.args(["task", "create", name, "local"])
            .arg(file_path)
            .arg("--project_id")
            .arg(params.project_id.to_string())
            .arg("--overlap")
            .arg(params.overlap.to_string())
            .arg("--segment_size")
            .arg(params.segment_size.to_string())
            .arg("--image_quality")
            .arg(params.image_quality.to_string());
        cmd
    }
}

#[async_trait]
impl AnnotationTool for CliAnnotationTool {
    async fn create_task(
        &self,
        name: &str,
        file_path: &Path,
        params: &ProjectParams,
    ) -> Result<Option<i64>, AnnotationToolError> {
        let mut cmd = self.build_command(name, file_path, params);
        let output = run_command(&mut cmd, self.config.timeout).await?;

        if !output.success() {
            return Err(AnnotationToolError::Failed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let task_id = parse_task_id(&output.stdout).or_else(|| parse_task_id(&output.stderr));
        tracing::debug!(
            task_name = name,
            task_id = ?task_id,
            duration_ms = output.duration_ms,
            "Annotation tool finished",
        );
        Ok(task_id)
    }
}

/// Extract the task id from CLI output. A bare integer line also counts.
pub fn parse_task_id(output: &str) -> Option<i64> {
    if let Some(caps) = TASK_ID_RE.captures(output) {
        return caps.get(1).and_then(|m| m.as_str().parse().ok());
    }
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_task_id_variants() {
        assert_eq!(parse_task_id("Created task ID: 42"), Some(42));
        assert_eq!(parse_task_id("uploading...\ncreated task id 7\ndone"), Some(7));
        assert_eq!(parse_task_id("Created task 19"), Some(19));
        assert_eq!(parse_task_id("\n1234\n"), Some(1234));
        assert_eq!(parse_task_id("Task creation failed"), None);
        assert_eq!(parse_task_id(""), None);
    }

    #[test]
    fn command_includes_project_params() {
        let tool = CliAnnotationTool::new(AnnotationToolConfig {
            user: Some("bot".into()),
            password: Some("secret".into()),
            ..AnnotationToolConfig::default()
        });
        let params = ProjectParams {
            project_id: 12,
            overlap: 5,
            segment_size: 300,
            image_quality: 70,
        };
        let cmd = tool.build_command("flight_12_000", Path::new("/tmp/clip_1.mp4"), &params);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["--auth", "bot:secret"]));
        assert!(args.windows(2).any(|w| w == ["--project_id", "12"]));
        assert!(args.windows(2).any(|w| w == ["--segment_size", "300"]));
        assert!(args.contains(&"/tmp/clip_1.mp4".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_binary_surfaces_process_error() {
        let tool = CliAnnotationTool::new(AnnotationToolConfig {
            bin: PathBuf::from("/nonexistent/annotation-cli"),
            ..AnnotationToolConfig::default()
        });
        let params = ProjectParams {
            project_id: 1,
            overlap: 0,
            segment_size: 100,
            image_quality: 70,
        };
        let err = tool
            .create_task("t", Path::new("/tmp/x.mp4"), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotationToolError::Process(_)));
    }
}
