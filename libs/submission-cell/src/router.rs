use std::sync::Arc;

use axum::{routing::post, Router};

use crate::handlers::submit;
use crate::models::SubmissionState;

/// Public submission surface. The route path is configuration-driven
/// (`ROUTES` env override); everything else about the route is fixed.
pub fn create_submission_router(state: Arc<SubmissionState>) -> Router {
    let path = state.config.routes.submissions_path.clone();
    Router::new().route(&path, post(submit)).with_state(state)
}
