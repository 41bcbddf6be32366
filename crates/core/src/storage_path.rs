//! External blob storage paths and the local file layout derived from them.
//!
//! A storage path has three parts, `account/container/blob-path`. Users may
//! also paste the full blob URL (`https://{account}.blob.core.windows.net/...`),
//! which normalizes to the same three parts.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Storage account names: 3-24 lowercase letters or digits.
static ACCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]{3,24}$").expect("valid account regex"));

/// Container names: 3-63 chars, lowercase letters, digits and inner hyphens.
static CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").expect("valid container regex")
});

/// Host suffix of blob URLs.
const BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// Extension of every locally converted source file and every derived clip.
pub const MEDIA_EXTENSION: &str = "mp4";

/// A validated `account/container/blob-path` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoragePath {
    account: String,
    container: String,
    blob: String,
}

impl StoragePath {
    /// Build a path from already-separated parts, validating each one.
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        blob: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let path = Self {
            account: account.into(),
            container: container.into(),
            blob: blob.into(),
        };
        path.validate()?;
        Ok(path)
    }

    /// Parse either the `account/container/blob` form or a blob URL.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation("Storage path must not be empty".into()));
        }

        let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);

        let normalized = match without_query
            .strip_prefix("https://")
            .or_else(|| without_query.strip_prefix("http://"))
        {
            Some(rest) => {
                let (host, path) = rest.split_once('/').ok_or_else(|| {
                    CoreError::Validation(format!("Storage URL has no container: '{trimmed}'"))
                })?;
                let account = host.strip_suffix(BLOB_HOST_SUFFIX).ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Storage URL host must end with '{BLOB_HOST_SUFFIX}', got '{host}'"
                    ))
                })?;
                format!("{account}/{path}")
            }
            None => without_query.trim_start_matches('/').to_string(),
        };

        let mut parts = normalized.splitn(3, '/');
        let account = parts.next().unwrap_or_default();
        let container = parts.next().unwrap_or_default();
        let blob = parts.next().unwrap_or_default();

        Self::new(account, container, blob)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if !ACCOUNT_RE.is_match(&self.account) {
            return Err(CoreError::Validation(format!(
                "Invalid storage account '{}': expected 3-24 lowercase letters or digits",
                self.account
            )));
        }
        if !CONTAINER_RE.is_match(&self.container) {
            return Err(CoreError::Validation(format!(
                "Invalid container '{}': expected 3-63 lowercase letters, digits or hyphens",
                self.container
            )));
        }
        if self.blob.is_empty() || self.blob.ends_with('/') {
            return Err(CoreError::Validation(format!(
                "Storage path '{}/{}' must name a blob",
                self.account, self.container
            )));
        }
        if self.blob.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(CoreError::Validation(format!(
                "Blob path '{}' contains empty or parent segments",
                self.blob
            )));
        }
        Ok(())
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn blob(&self) -> &str {
        &self.blob
    }

    /// Reject paths that reference a different storage account.
    pub fn ensure_account(&self, expected: &str) -> Result<(), CoreError> {
        if self.account == expected {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Storage path must reference account '{expected}', got '{}'",
                self.account
            )))
        }
    }

    /// Last segment of the blob path, e.g. `flight_07.MOV`.
    pub fn file_name(&self) -> &str {
        self.blob.rsplit('/').next().unwrap_or(&self.blob)
    }

    /// File name without its extension, e.g. `flight_07`.
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }

    /// Lowercased extension of the blob, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
                Some(ext.to_ascii_lowercase())
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for StoragePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.blob)
    }
}

impl TryFrom<String> for StoragePath {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StoragePath> for String {
    fn from(value: StoragePath) -> Self {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Derived locations
// ---------------------------------------------------------------------------

/// Local path of the converted source media, derived from the blob file name.
pub fn local_media_path(media_root: &Path, source: &StoragePath) -> PathBuf {
    media_root.join(format!("{}.{MEDIA_EXTENSION}", source.file_stem()))
}

/// Local path the raw download lands at before conversion.
pub fn download_path(media_root: &Path, source: &StoragePath) -> PathBuf {
    let ext = source.extension().unwrap_or_else(|| "bin".to_string());
    media_root.join(format!("{}.download.{ext}", source.file_stem()))
}

/// Blob folder holding every clip derived from `source`.
pub fn clip_folder_prefix(source: &StoragePath, clip_container: &str) -> String {
    format!("{}/{clip_container}/{}/", source.account(), source.file_stem())
}

/// Pre-assigned blob path of one derived clip.
pub fn derived_clip_path(
    source: &StoragePath,
    clip_container: &str,
    project_id: DbId,
    clip_index: i32,
) -> Result<StoragePath, CoreError> {
    StoragePath::new(
        source.account(),
        clip_container,
        format!(
            "{}/{}_{project_id}_{clip_index:03}.{MEDIA_EXTENSION}",
            source.file_stem(),
            source.file_stem()
        ),
    )
}

/// Local scratch path for a clip while it is being cut and uploaded.
pub fn temp_clip_path(temp_dir: &Path, clip_id: DbId) -> PathBuf {
    temp_dir.join(format!("clip_{clip_id}.{MEDIA_EXTENSION}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_three_part_path() {
        let path = StoragePath::parse("dronestore/raw/2026/site-a/flight_07.MOV").unwrap();
        assert_eq!(path.account(), "dronestore");
        assert_eq!(path.container(), "raw");
        assert_eq!(path.blob(), "2026/site-a/flight_07.MOV");
        assert_eq!(path.to_string(), "dronestore/raw/2026/site-a/flight_07.MOV");
    }

    #[test]
    fn parses_blob_url() {
        let path = StoragePath::parse(
            "https://dronestore.blob.core.windows.net/raw/flight_07.mp4?sv=2024&sig=abc",
        )
        .unwrap();
        assert_eq!(path.to_string(), "dronestore/raw/flight_07.mp4");
    }

    #[test]
    fn rejects_foreign_url_host() {
        assert_matches!(
            StoragePath::parse("https://example.com/raw/flight.mp4"),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_missing_parts() {
        assert!(StoragePath::parse("").is_err());
        assert!(StoragePath::parse("dronestore").is_err());
        assert!(StoragePath::parse("dronestore/raw").is_err());
        assert!(StoragePath::parse("dronestore/raw/").is_err());
        assert!(StoragePath::parse("dronestore/raw/a//b.mp4").is_err());
        assert!(StoragePath::parse("dronestore/raw/../secret.mp4").is_err());
    }

    #[test]
    fn rejects_bad_account_and_container() {
        assert!(StoragePath::parse("Drone_Store/raw/a.mp4").is_err());
        assert!(StoragePath::parse("dronestore/-raw/a.mp4").is_err());
    }

    #[test]
    fn ensure_account_mismatch() {
        let path = StoragePath::parse("otherstore/raw/a.mp4").unwrap();
        assert!(path.ensure_account("otherstore").is_ok());
        assert_matches!(
            path.ensure_account("dronestore"),
            Err(CoreError::Validation(msg)) if msg.contains("dronestore")
        );
    }

    #[test]
    fn file_name_stem_extension() {
        let path = StoragePath::parse("dronestore/raw/site/flight_07.MOV").unwrap();
        assert_eq!(path.file_name(), "flight_07.MOV");
        assert_eq!(path.file_stem(), "flight_07");
        assert_eq!(path.extension().as_deref(), Some("mov"));

        let bare = StoragePath::parse("dronestore/raw/README").unwrap();
        assert_eq!(bare.file_stem(), "README");
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn local_paths_are_deterministic() {
        let path = StoragePath::parse("dronestore/raw/site/flight_07.MOV").unwrap();
        let root = Path::new("/srv/media");
        assert_eq!(
            local_media_path(root, &path),
            PathBuf::from("/srv/media/flight_07.mp4")
        );
        assert_eq!(
            download_path(root, &path),
            PathBuf::from("/srv/media/flight_07.download.mov")
        );
        assert_eq!(
            temp_clip_path(Path::new("/tmp"), 12),
            PathBuf::from("/tmp/clip_12.mp4")
        );
    }

    #[test]
    fn derived_clip_paths_share_a_folder() {
        let source = StoragePath::parse("dronestore/raw/site/flight_07.MOV").unwrap();
        let clip = derived_clip_path(&source, "clips", 31, 2).unwrap();
        assert_eq!(clip.to_string(), "dronestore/clips/flight_07/flight_07_31_002.mp4");
        assert!(clip
            .to_string()
            .starts_with(&clip_folder_prefix(&source, "clips")));
    }

    #[test]
    fn serde_uses_string_form() {
        let path = StoragePath::parse("dronestore/raw/a.mp4").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"dronestore/raw/a.mp4\"");
        let back: StoragePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<StoragePath>("\"nope\"").is_err());
    }
}
