/// Record ids: BIGSERIAL in Postgres, sequential in the in-memory stores.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
