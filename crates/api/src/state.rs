use std::sync::Arc;

use clipflow_pipeline::{PipelineContext, VideoWorkflow};

use crate::auth::jwt::JwtConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone: the pipeline context is a bundle of `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub ctx: PipelineContext,
    pub jwt: Arc<JwtConfig>,
}

impl AppState {
    pub fn workflow(&self) -> VideoWorkflow {
        self.ctx.workflow()
    }
}
