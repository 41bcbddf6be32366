//! Well-known role name constants.
//!
//! These must match the `role` claim issued alongside user credentials.

pub const ROLE_SUPER_ADMIN: &str = "super_admin";
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_ANNOTATOR: &str = "annotator";

/// Roles allowed to register, delete and maintain videos.
pub fn is_admin(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_SUPER_ADMIN
}

/// Roles allowed to lock videos and submit fragments.
pub fn can_annotate(role: &str) -> bool {
    is_admin(role) || role == ROLE_ANNOTATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_is_admin() {
        assert!(is_admin(ROLE_SUPER_ADMIN));
        assert!(is_admin(ROLE_ADMIN));
        assert!(!is_admin(ROLE_ANNOTATOR));
    }

    #[test]
    fn every_known_role_can_annotate() {
        assert!(can_annotate(ROLE_SUPER_ADMIN));
        assert!(can_annotate(ROLE_ADMIN));
        assert!(can_annotate(ROLE_ANNOTATOR));
        assert!(!can_annotate("viewer"));
        assert!(!can_annotate(""));
    }
}
