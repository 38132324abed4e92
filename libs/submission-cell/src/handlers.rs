use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use shared_utils::extractor::extract_request_metadata;

use crate::models::SubmissionState;
use crate::services::pipeline::SubmissionPipeline;

/// POST handler for the submission route. Metadata extraction and erfid
/// generation happen here, before the pipeline runs, so even the earliest
/// rejection carries the request id.
#[axum::debug_handler]
pub async fn submit(
    State(state): State<Arc<SubmissionState>>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let metadata = extract_request_metadata(&headers);
    let erfid = state.erfid.generate();
    let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());

    let routes = state
        .routes
        .get_or_load(|| state.config.routes.clone());

    let pipeline = SubmissionPipeline::new(Arc::clone(&state.config));
    match pipeline
        .submit(&metadata, &erfid, payload, &routes, api_key)
        .await
    {
        Ok(response) => {
            let mut response = (StatusCode::CREATED, Json(json!(response))).into_response();
            if let Ok(value) = HeaderValue::from_str(&erfid) {
                response.headers_mut().insert("x-request-id", value);
            }
            response
        }
        Err(err) => err.into_response_with_erfid(&erfid),
    }
}
