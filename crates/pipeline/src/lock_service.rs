//! Exclusive, expiring per-video locks on top of an [`ExpiringKvStore`].
//!
//! Every mutation is a single conditional store operation, so two processes
//! racing for the same video can never both be granted. Ownership is decided
//! by comparing the stored payload's `holder_id` with the caller's id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clipflow_core::error::CoreError;
use clipflow_core::lock::{
    lock_key, AcquireOutcome, ExpiringKvStore, KvEntry, LockHolder, LockPayload, LockStatus,
    ReleaseOutcome, LOCK_KEY_PREFIX,
};
use clipflow_core::types::DbId;

/// Attempts made when the key disappears between a failed set and the read.
const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct LockService {
    kv: Arc<dyn ExpiringKvStore>,
    ttl: Duration,
}

impl LockService {
    pub fn new(kv: Arc<dyn ExpiringKvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lease for `video_id`.
    ///
    /// Re-acquiring a lease you already hold succeeds without touching its
    /// TTL. A lease held by someone else is reported as
    /// [`AcquireOutcome::Denied`] with the holder's identity.
    pub async fn acquire(
        &self,
        video_id: DbId,
        holder: &LockHolder,
    ) -> Result<AcquireOutcome, CoreError> {
        let key = lock_key(video_id);

        for _ in 0..ACQUIRE_ATTEMPTS {
            let now = Utc::now();
            let payload = LockPayload {
                holder_id: holder.user_id,
                holder_label: holder.label.clone(),
                acquired_at: now,
            };
            let value = serde_json::to_string(&payload)
                .map_err(|e| CoreError::Internal(format!("lock payload encoding: {e}")))?;

            if self.kv.set_if_absent(&key, &value, self.ttl).await? {
                tracing::info!(video_id, holder_id = holder.user_id, "Video lock acquired");
                return Ok(AcquireOutcome::Granted {
                    expires_at: now + self.ttl,
                });
            }

            let Some(entry) = self.kv.get(&key).await? else {
                // Expired between the two calls.
                continue;
            };

            match decode(&key, &entry) {
                Some(current) if current.holder_id == holder.user_id => {
                    let remaining = entry.ttl.unwrap_or(Duration::ZERO);
                    return Ok(AcquireOutcome::AlreadyHeld {
                        acquired_at: current.acquired_at,
                        expires_at: now + remaining,
                    });
                }
                Some(current) => {
                    tracing::debug!(
                        video_id,
                        requested_by = holder.user_id,
                        held_by = current.holder_id,
                        "Video lock denied"
                    );
                    return Ok(AcquireOutcome::Denied(current.into()));
                }
                None => {
                    // Unreadable payload: clear exactly that value and retry.
                    self.kv.delete_if_value(&key, &entry.value).await?;
                }
            }
        }

        Err(CoreError::Unavailable(format!(
            "lock for video {video_id} kept changing while being acquired"
        )))
    }

    /// Release the lease for `video_id` if `holder_id` owns it.
    ///
    /// The delete is conditional on the exact stored value, so a lease that
    /// expired and was re-taken by someone else in between is left alone.
    pub async fn release(
        &self,
        video_id: DbId,
        holder_id: DbId,
    ) -> Result<ReleaseOutcome, CoreError> {
        let key = lock_key(video_id);

        let Some(entry) = self.kv.get(&key).await? else {
            return Ok(ReleaseOutcome::NotHeld);
        };
        let Some(current) = decode(&key, &entry) else {
            return Ok(ReleaseOutcome::NotHeld);
        };
        if current.holder_id != holder_id {
            return Ok(ReleaseOutcome::NotOwner(current.into()));
        }

        if self.kv.delete_if_value(&key, &entry.value).await? {
            tracing::info!(video_id, holder_id, "Video lock released");
            Ok(ReleaseOutcome::Released)
        } else {
            Ok(ReleaseOutcome::NotHeld)
        }
    }

    pub async fn status(&self, video_id: DbId) -> Result<LockStatus, CoreError> {
        let key = lock_key(video_id);
        let entry = self.kv.get(&key).await?;
        Ok(to_status(video_id, &key, entry))
    }

    /// Lock status of many videos in one store round trip.
    pub async fn batch_status(
        &self,
        video_ids: &[DbId],
    ) -> Result<HashMap<DbId, LockStatus>, CoreError> {
        if video_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let keys: Vec<String> = video_ids.iter().map(|id| lock_key(*id)).collect();
        let entries = self.kv.get_many(&keys).await?;

        Ok(video_ids
            .iter()
            .zip(keys.iter().zip(entries))
            .map(|(id, (key, entry))| (*id, to_status(*id, key, entry)))
            .collect())
    }

    /// Delete lock keys that carry no TTL or an unreadable payload.
    ///
    /// Leases with a TTL expire on their own; this only cleans up anomalies
    /// left by manual edits or interrupted writers. Returns the number of
    /// keys removed.
    pub async fn sweep_expired(&self) -> Result<usize, CoreError> {
        let keys = self.kv.scan_prefix(LOCK_KEY_PREFIX).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let entries = self.kv.get_many(&keys).await?;

        let mut removed = 0;
        for (key, entry) in keys.iter().zip(entries) {
            let Some(entry) = entry else { continue };
            let persistent = entry.ttl.is_none();
            let unreadable = decode(key, &entry).is_none();
            if (persistent || unreadable) && self.kv.delete_if_value(key, &entry.value).await? {
                tracing::warn!(key = %key, persistent, unreadable, "Removed anomalous lock key");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drop the lease for one video regardless of holder.
    pub async fn force_release(&self, video_id: DbId) -> Result<bool, CoreError> {
        let removed = self.kv.delete(&lock_key(video_id)).await?;
        if removed {
            tracing::warn!(video_id, "Video lock force-released");
        }
        Ok(removed)
    }

    /// Drop every lease. Administrative escape hatch.
    pub async fn force_release_all(&self, requested_by: DbId) -> Result<usize, CoreError> {
        let keys = self.kv.scan_prefix(LOCK_KEY_PREFIX).await?;
        let mut removed = 0;
        for key in &keys {
            if self.kv.delete(key).await? {
                removed += 1;
            }
        }
        tracing::warn!(removed, user_id = requested_by, "All video locks force-released");
        Ok(removed)
    }

    pub async fn ping(&self) -> Result<(), CoreError> {
        Ok(self.kv.ping().await?)
    }
}

fn decode(key: &str, entry: &KvEntry) -> Option<LockPayload> {
    match serde_json::from_str(&entry.value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Unreadable lock payload");
            None
        }
    }
}

fn to_status(video_id: DbId, key: &str, entry: Option<KvEntry>) -> LockStatus {
    match entry {
        Some(entry) => match decode(key, &entry) {
            Some(payload) => LockStatus::held(video_id, payload, entry.ttl),
            None => LockStatus::unlocked(video_id),
        },
        None => LockStatus::unlocked(video_id),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::memory::MemoryKvStore;

    fn service(kv: &Arc<MemoryKvStore>) -> LockService {
        LockService::new(kv.clone(), Duration::from_secs(60))
    }

    fn alice() -> LockHolder {
        LockHolder::new(1, "alice@example.com")
    }

    fn bob() -> LockHolder {
        LockHolder::new(2, "bob@example.com")
    }

    #[tokio::test]
    async fn second_holder_is_denied_with_identity() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);

        assert_matches!(locks.acquire(10, &alice()).await.unwrap(), AcquireOutcome::Granted { .. });
        let denied = locks.acquire(10, &bob()).await.unwrap();
        assert_matches!(denied, AcquireOutcome::Denied(info) if info.holder_id == 1
            && info.holder_label == "alice@example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn reacquire_keeps_the_original_lease() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);

        let AcquireOutcome::Granted { .. } = locks.acquire(10, &alice()).await.unwrap() else {
            panic!("expected a new lease");
        };
        let first = locks.status(10).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_matches!(locks.acquire(10, &alice()).await.unwrap(), AcquireOutcome::AlreadyHeld { .. });

        let after = locks.status(10).await.unwrap();
        assert_eq!(after.acquired_at, first.acquired_at);
        assert_eq!(after.ttl_remaining_secs, Some(40));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lease_can_be_taken_by_anyone() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);

        locks.acquire(10, &alice()).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(!locks.status(10).await.unwrap().locked);
        assert_matches!(locks.acquire(10, &bob()).await.unwrap(), AcquireOutcome::Granted { .. });
    }

    #[tokio::test]
    async fn release_distinguishes_missing_and_foreign_locks() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);

        assert_eq!(locks.release(10, 1).await.unwrap(), ReleaseOutcome::NotHeld);

        locks.acquire(10, &alice()).await.unwrap();
        assert_matches!(locks.release(10, 2).await.unwrap(), ReleaseOutcome::NotOwner(info) if info.holder_id == 1);
        assert!(locks.status(10).await.unwrap().locked);

        assert_eq!(locks.release(10, 1).await.unwrap(), ReleaseOutcome::Released);
        assert!(!locks.status(10).await.unwrap().locked);
    }

    #[tokio::test]
    async fn batch_status_preserves_ids() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);
        locks.acquire(2, &bob()).await.unwrap();

        let statuses = locks.batch_status(&[1, 2, 3]).await.unwrap();
        assert_eq!(statuses.len(), 3);
        assert!(!statuses[&1].locked);
        assert_eq!(statuses[&2].holder_id, Some(2));
        assert!(!statuses[&3].locked);
        assert!(locks.batch_status(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_removes_persistent_and_corrupt_keys_only() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);

        locks.acquire(1, &alice()).await.unwrap();
        let stale = serde_json::to_string(&LockPayload {
            holder_id: 2,
            holder_label: "bob@example.com".into(),
            acquired_at: Utc::now(),
        })
        .unwrap();
        kv.insert_persistent(&lock_key(2), &stale).await;
        kv.insert_persistent(&lock_key(3), "not json").await;
        kv.insert_persistent("session:9", "unrelated").await;

        assert_eq!(locks.sweep_expired().await.unwrap(), 2);
        assert!(locks.status(1).await.unwrap().locked);
        assert!(!locks.status(2).await.unwrap().locked);
        assert!(kv.get("session:9").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn corrupt_payload_is_replaced_on_acquire() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);
        kv.insert_persistent(&lock_key(5), "{broken").await;

        assert_matches!(locks.acquire(5, &bob()).await.unwrap(), AcquireOutcome::Granted { .. });
        assert_eq!(locks.status(5).await.unwrap().holder_id, Some(2));
    }

    #[tokio::test]
    async fn force_release_all_clears_every_lease() {
        let kv = Arc::new(MemoryKvStore::new());
        let locks = service(&kv);
        locks.acquire(1, &alice()).await.unwrap();
        locks.acquire(2, &bob()).await.unwrap();

        assert_eq!(locks.force_release_all(9).await.unwrap(), 2);
        assert!(!locks.status(1).await.unwrap().locked);
        assert!(!locks.force_release(2).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_store_surfaces_as_unavailable() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set_available(false);
        let locks = service(&kv);

        let err = locks.acquire(1, &alice()).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(locks.ping().await.unwrap_err().is_unavailable());
    }
}
