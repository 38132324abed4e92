use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::operator_auth;

use crate::handlers::*;

/// Operator-only blocklist surface. Everything here requires the static
/// operator key.
pub fn create_blocklist_router(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/cleanup", post(cleanup_expired))
        .layer(middleware::from_fn_with_state(config.clone(), operator_auth))
        .with_state(config)
}
