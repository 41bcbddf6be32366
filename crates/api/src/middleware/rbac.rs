//! Role-gated extractors wrapping [`AuthUser`].
//!
//! - [`RequireAnnotator`]: locking, unlocking and fragment save.
//! - [`RequireAdmin`]: registration, deletion, retries and sweeps.
//! - [`RequireSuperAdmin`]: force-releasing every lock.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use clipflow_core::error::CoreError;
use clipflow_core::roles::{can_annotate, is_admin, ROLE_SUPER_ADMIN};

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

async fn authorize(
    parts: &mut Parts,
    state: &AppState,
    allowed: fn(&str) -> bool,
    required: &str,
) -> Result<AuthUser, AppError> {
    let user = AuthUser::from_request_parts(parts, state).await?;
    if !allowed(&user.role) {
        tracing::debug!(user_id = user.user_id, role = %user.role, required, "Role check failed");
        return Err(CoreError::Forbidden(format!("{required} role required")).into());
    }
    Ok(user)
}

pub struct RequireAnnotator(pub AuthUser);

impl FromRequestParts<AppState> for RequireAnnotator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        authorize(parts, state, can_annotate, "Annotator").await.map(Self)
    }
}

pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        authorize(parts, state, is_admin, "Admin").await.map(Self)
    }
}

pub struct RequireSuperAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireSuperAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        authorize(parts, state, |role| role == ROLE_SUPER_ADMIN, "Super admin").await.map(Self)
    }
}
