use clipflow_core::error::CoreError;

/// PostgreSQL unique violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Map a sqlx error onto the domain taxonomy.
///
/// - Unique violations on `uq_` constraints become [`CoreError::Conflict`].
/// - Connection, pool and I/O failures become [`CoreError::Unavailable`] so
///   callers never mistake an outage for "not found".
/// - Everything else is [`CoreError::Internal`].
pub fn map_db_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            CoreError::Conflict(format!(
                "Duplicate value violates unique constraint: {constraint}"
            ))
        }
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => {
            tracing::error!(error = %err, "Database unreachable");
            CoreError::Unavailable(format!("record store: {err}"))
        }
        _ => {
            tracing::error!(error = %err, "Database error");
            CoreError::Internal(format!("database error: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn pool_timeout_is_unavailable() {
        assert!(map_db_error(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(map_db_error(sqlx::Error::PoolClosed).is_unavailable());
    }

    #[test]
    fn io_error_is_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(map_db_error(sqlx::Error::Io(io)).is_unavailable());
    }

    #[test]
    fn row_not_found_is_internal() {
        assert_matches!(map_db_error(sqlx::Error::RowNotFound), CoreError::Internal(_));
    }
}
