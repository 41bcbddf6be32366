//! Repository for `kv_entries`, the expiring key-value table behind lock
//! leases.
//!
//! Expired rows stay in the table until overwritten or purged, so every read
//! filters on liveness. Prefix matching uses `left()` rather than `LIKE`
//! because lock keys contain `_`.

use std::time::Duration;

use sqlx::PgPool;

use crate::models::kv_entry::KvEntryRow;

/// Row is live: no expiry, or expiry in the future.
const LIVE: &str = "(expires_at IS NULL OR expires_at > NOW())";

/// Remaining TTL in whole milliseconds, `NULL` for persistent rows.
const SELECT_COLUMNS: &str =
    "key, value, (EXTRACT(EPOCH FROM (expires_at - NOW())) * 1000)::BIGINT AS ttl_ms";

pub struct KvEntryRepo;

impl KvEntryRepo {
    /// Insert `key` unless a live row exists. Returns `true` if written.
    ///
    /// A single statement, so two concurrent callers can never both win.
    pub async fn set_if_absent(
        pool: &PgPool,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, sqlx::Error> {
        let written = sqlx::query_scalar::<_, String>(
            "INSERT INTO kv_entries (key, value, expires_at, updated_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3), NOW()) \
             ON CONFLICT (key) DO UPDATE \
                 SET value = EXCLUDED.value, \
                     expires_at = EXCLUDED.expires_at, \
                     updated_at = NOW() \
                 WHERE kv_entries.expires_at IS NOT NULL \
                   AND kv_entries.expires_at <= NOW() \
             RETURNING key",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .fetch_optional(pool)
        .await?;
        Ok(written.is_some())
    }

    pub async fn get(pool: &PgPool, key: &str) -> Result<Option<KvEntryRow>, sqlx::Error> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM kv_entries WHERE key = $1 AND {LIVE}");
        sqlx::query_as::<_, KvEntryRow>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Fetch all live rows among `keys` in one query.
    pub async fn get_many(pool: &PgPool, keys: &[String]) -> Result<Vec<KvEntryRow>, sqlx::Error> {
        let query =
            format!("SELECT {SELECT_COLUMNS} FROM kv_entries WHERE key = ANY($1) AND {LIVE}");
        sqlx::query_as::<_, KvEntryRow>(&query)
            .bind(keys)
            .fetch_all(pool)
            .await
    }

    /// Delete `key` only if its live value matches `expected`.
    pub async fn delete_if_value(
        pool: &PgPool,
        key: &str,
        expected: &str,
    ) -> Result<bool, sqlx::Error> {
        let query = format!("DELETE FROM kv_entries WHERE key = $1 AND value = $2 AND {LIVE}");
        let result = sqlx::query(&query)
            .bind(key)
            .bind(expected)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete `key` if it is live. Expired leftovers are removed silently.
    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let live = sqlx::query_scalar::<_, bool>(
            "DELETE FROM kv_entries WHERE key = $1 \
             RETURNING (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;
        Ok(live.unwrap_or(false))
    }

    /// Live keys starting with `prefix`.
    pub async fn scan_prefix(pool: &PgPool, prefix: &str) -> Result<Vec<String>, sqlx::Error> {
        let query = format!(
            "SELECT key FROM kv_entries \
             WHERE left(key, char_length($1)) = $1 AND {LIVE} \
             ORDER BY key"
        );
        sqlx::query_scalar::<_, String>(&query)
            .bind(prefix)
            .fetch_all(pool)
            .await
    }

    /// Physically remove expired rows. Returns the number removed.
    pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
