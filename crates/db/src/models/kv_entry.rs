use std::time::Duration;

use clipflow_core::lock::KvEntry;
use sqlx::FromRow;

/// A live row from `kv_entries` with its remaining lifetime in milliseconds.
#[derive(Debug, Clone, FromRow)]
pub struct KvEntryRow {
    pub key: String,
    pub value: String,
    /// `NULL` when the entry has no expiry.
    pub ttl_ms: Option<i64>,
}

impl From<KvEntryRow> for KvEntry {
    fn from(row: KvEntryRow) -> Self {
        Self {
            value: row.value,
            ttl: row
                .ttl_ms
                .map(|ms| Duration::from_millis(u64::try_from(ms).unwrap_or(0))),
        }
    }
}
