use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::services::store::BlocklistStore;

#[axum::debug_handler]
pub async fn get_stats(State(config): State<Arc<AppConfig>>) -> Result<Json<Value>, AppError> {
    let store = BlocklistStore::new(Arc::new(SupabaseClient::new(&config)));

    let stats = store
        .stats()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!(stats)))
}

#[axum::debug_handler]
pub async fn cleanup_expired(State(config): State<Arc<AppConfig>>) -> Result<Json<Value>, AppError> {
    let store = BlocklistStore::new(Arc::new(SupabaseClient::new(&config)));

    let deleted = store
        .cleanup_expired()
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(json!({ "deleted": deleted })))
}
