//! Video lock lease types and the expiring key-value store contract.
//!
//! A lock lives only in the key-value store under `video_lock:{video_id}`
//! with a JSON [`LockPayload`] and a TTL. The record store never holds lock
//! state, so the two can drift; the maintenance sweep repairs that drift.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Prefix shared by every lock key.
pub const LOCK_KEY_PREFIX: &str = "video_lock:";

/// Default lease duration (1 hour).
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// Build the key-value store key for a video's lock.
pub fn lock_key(video_id: DbId) -> String {
    format!("{LOCK_KEY_PREFIX}{video_id}")
}

/// Recover the video id from a lock key, if it is one.
pub fn video_id_from_key(key: &str) -> Option<DbId> {
    key.strip_prefix(LOCK_KEY_PREFIX)?.parse().ok()
}

// ---------------------------------------------------------------------------
// Payload and outcomes
// ---------------------------------------------------------------------------

/// Who is asking for (or holding) a lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub user_id: DbId,
    /// Human-readable identity, usually the user's email.
    pub label: String,
}

impl LockHolder {
    pub fn new(user_id: DbId, label: impl Into<String>) -> Self {
        Self {
            user_id,
            label: label.into(),
        }
    }
}

/// JSON value stored under a lock key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPayload {
    pub holder_id: DbId,
    pub holder_label: String,
    pub acquired_at: Timestamp,
}

/// Current holder of a lock, as reported to a denied caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolderInfo {
    pub holder_id: DbId,
    pub holder_label: String,
    pub acquired_at: Timestamp,
}

impl From<LockPayload> for LockHolderInfo {
    fn from(payload: LockPayload) -> Self {
        Self {
            holder_id: payload.holder_id,
            holder_label: payload.holder_label,
            acquired_at: payload.acquired_at,
        }
    }
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A new lease was created.
    Granted { expires_at: Timestamp },
    /// The caller already held the lease; its remaining TTL is unchanged.
    AlreadyHeld {
        acquired_at: Timestamp,
        expires_at: Timestamp,
    },
    /// Someone else holds the lease.
    Denied(LockHolderInfo),
}

/// Result of a release attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// No lease exists for the video.
    NotHeld,
    /// A lease exists but belongs to someone else.
    NotOwner(LockHolderInfo),
}

/// Snapshot of a video's lock for status and list views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub video_id: DbId,
    pub locked: bool,
    pub holder_id: Option<DbId>,
    pub holder_label: Option<String>,
    pub acquired_at: Option<Timestamp>,
    /// Whole seconds left on the lease; `None` when unlocked or persistent.
    pub ttl_remaining_secs: Option<u64>,
}

impl LockStatus {
    pub fn unlocked(video_id: DbId) -> Self {
        Self {
            video_id,
            locked: false,
            holder_id: None,
            holder_label: None,
            acquired_at: None,
            ttl_remaining_secs: None,
        }
    }

    pub fn held(video_id: DbId, payload: LockPayload, ttl: Option<Duration>) -> Self {
        Self {
            video_id,
            locked: true,
            holder_id: Some(payload.holder_id),
            holder_label: Some(payload.holder_label),
            acquired_at: Some(payload.acquired_at),
            ttl_remaining_secs: ttl.map(|d| d.as_secs()),
        }
    }
}

// ---------------------------------------------------------------------------
// Key-value store contract
// ---------------------------------------------------------------------------

/// Errors surfaced by an expiring key-value store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
}

impl From<KvError> for crate::error::CoreError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::Unavailable(msg) => {
                Self::Unavailable(format!("lock service unavailable: {msg}"))
            }
        }
    }
}

/// A live key with its remaining lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: String,
    /// `None` means the key never expires (an anomaly for lock keys).
    pub ttl: Option<Duration>,
}

/// Shared, expiring key-value store used as the cross-process coordination
/// substrate. Expired keys must be invisible to every read.
#[async_trait]
pub trait ExpiringKvStore: Send + Sync {
    /// Set `key` only if no live value exists. Returns `true` if set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, KvError>;

    /// Read a live key with its remaining TTL.
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError>;

    /// Read many keys in one round trip, preserving input order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<KvEntry>>, KvError>;

    /// Delete `key` only if its live value equals `expected`.
    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool, KvError>;

    /// Delete `key` unconditionally. Returns `true` if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// List live keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), KvError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn lock_key_round_trip() {
        assert_eq!(lock_key(17), "video_lock:17");
        assert_eq!(video_id_from_key("video_lock:17"), Some(17));
        assert_eq!(video_id_from_key("video_lock:abc"), None);
        assert_eq!(video_id_from_key("session:17"), None);
    }

    #[test]
    fn payload_json_shape() {
        let payload = LockPayload {
            holder_id: 3,
            holder_label: "u3@example.com".into(),
            acquired_at: chrono::Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["holder_id"], 3);
        assert_eq!(value["holder_label"], "u3@example.com");
        assert!(value["acquired_at"].as_str().unwrap().starts_with("2026-01-02T03:04:05"));
    }

    #[test]
    fn status_constructors() {
        let unlocked = LockStatus::unlocked(4);
        assert!(!unlocked.locked);
        assert!(unlocked.holder_id.is_none());

        let payload = LockPayload {
            holder_id: 9,
            holder_label: "nine".into(),
            acquired_at: chrono::Utc::now(),
        };
        let held = LockStatus::held(4, payload, Some(Duration::from_millis(90_500)));
        assert!(held.locked);
        assert_eq!(held.holder_id, Some(9));
        assert_eq!(held.ttl_remaining_secs, Some(90));
    }

    #[test]
    fn kv_error_maps_to_unavailable() {
        let err: crate::error::CoreError = KvError::Unavailable("refused".into()).into();
        assert!(err.is_unavailable());
        assert!(err.to_string().contains("lock service unavailable"));
    }
}
