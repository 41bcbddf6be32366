use crate::lock::LockHolderInfo;

/// Domain error shared by every service in the workspace.
///
/// Variants are deliberately coarse so callers can branch on the category
/// ("fix your input" vs "try again later" vs "infrastructure is down")
/// without string matching.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lock acquisition was denied because another holder owns the lease.
    #[error("Video is locked by {} (user {}) since {}", .0.holder_label, .0.holder_id, .0.acquired_at)]
    LockHeld(LockHolderInfo),

    /// The requested transition is not legal from the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A backing service (lock store, record store, queue) is unreachable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::NotFound`] with any displayable id.
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` for errors caused by unreachable infrastructure.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn not_found_formats_entity_and_id() {
        let err = CoreError::not_found("SourceVideo", 42);
        assert_eq!(err.to_string(), "Entity not found: SourceVideo with id 42");
    }

    #[test]
    fn lock_held_names_the_holder() {
        let acquired_at = chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let err = CoreError::LockHeld(LockHolderInfo {
            holder_id: 7,
            holder_label: "ann@example.com".to_string(),
            acquired_at,
        });
        let msg = err.to_string();
        assert!(msg.contains("ann@example.com"));
        assert!(msg.contains("user 7"));
        assert!(msg.contains("2026-03-01"));
    }

    #[test]
    fn only_unavailable_is_unavailable() {
        assert!(CoreError::Unavailable("kv down".into()).is_unavailable());
        assert!(!CoreError::Internal("boom".into()).is_unavailable());
    }
}
