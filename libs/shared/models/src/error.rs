use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Token replay: {0}")]
    TokenReused(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("CAPTCHA verification failed: {0}")]
    CaptchaFailed(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: u64,
        expires_at: DateTime<Utc>,
    },

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::TokenReused(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::CaptchaFailed(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used in the `error` field of responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::TokenReused(_) => "token_reused",
            AppError::Auth(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::CaptchaFailed(_) => "captcha_failed",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::RateLimit { .. } => "rate_limited",
            AppError::ExternalService(_) => "external_service_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::TokenReused(m)
            | AppError::Auth(m)
            | AppError::Forbidden(m)
            | AppError::CaptchaFailed(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::ExternalService(m)
            | AppError::Database(m)
            | AppError::Internal(m) => m.clone(),
            AppError::RateLimit { message, .. } => message.clone(),
        }
    }

    /// Response shaping with the request-tracking id attached. Every
    /// submission-path response goes through here so the erfid lands in both
    /// the body and the `X-Request-Id` header.
    pub fn into_response_with_erfid(self, erfid: &str) -> Response {
        let mut response = self.build_response(Some(erfid));
        if let Ok(value) = HeaderValue::from_str(erfid) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }

    fn build_response(&self, erfid: Option<&str>) -> Response {
        let status = self.status();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, message);
        } else {
            tracing::warn!("Error: {}: {}", status, message);
        }

        let mut body = json!({
            "error": self.code(),
            "message": message,
        });
        if let Some(erfid) = erfid {
            body["erfid"] = json!(erfid);
        }

        if let AppError::RateLimit {
            retry_after,
            expires_at,
            ..
        } = self
        {
            body["retryAfter"] = json!(retry_after);
            body["expiresAt"] = json!(expires_at.to_rfc3339());

            let mut response = (status, Json(body)).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.build_response(None)
    }
}
