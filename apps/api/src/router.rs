use std::sync::Arc;

use axum::{routing::get, Router};
use tracing::warn;

use blocklist_cell::create_blocklist_router;
use shared_config::AppConfig;
use shared_utils::ErfidConfig;
use submission_cell::{create_submission_router, SubmissionState};

pub fn create_router(config: Arc<AppConfig>) -> Router {
    // The erfid configuration is process-wide; a bad ERFID_CONFIG override
    // falls back to the uuid default rather than refusing to boot
    let erfid = ErfidConfig::from_options(&config.erfid).unwrap_or_else(|e| {
        warn!("Invalid erfid configuration, using defaults: {}", e);
        ErfidConfig::default()
    });

    let submission_state = Arc::new(SubmissionState::new(Arc::clone(&config), erfid));

    Router::new()
        .route("/", get(|| async { "Registration gateway is running!" }))
        .merge(create_submission_router(submission_state))
        .nest("/security/blocklist", create_blocklist_router(config))
}
