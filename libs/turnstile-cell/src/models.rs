use serde::Deserialize;

/// Raw siteverify response shape.
/// https://developers.cloudflare.com/turnstile/get-started/server-side-validation/
#[derive(Debug, Clone, Deserialize)]
pub struct SiteverifyResponse {
    pub success: bool,
    pub challenge_ts: Option<String>,
    pub hostname: Option<String>,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
    pub action: Option<String>,
    pub cdata: Option<String>,
    #[serde(default)]
    pub metadata: Option<SiteverifyMetadata>,
}

/// Enterprise-only metadata block; `ephemeral_id` is absent on other plans.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteverifyMetadata {
    pub ephemeral_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Wrong secret or widget configuration; pages the operator.
    Configuration,
    /// The visitor's token was bad, expired, or already consumed.
    Token,
    /// Malformed verification request.
    Request,
    /// Turnstile itself failed; retryable.
    Upstream,
}

/// Operator-facing expansion of a siteverify error code.
#[derive(Debug, Clone)]
pub struct TurnstileErrorInfo {
    pub code: String,
    pub category: ErrorCategory,
    pub title: &'static str,
    /// Safe to show to the visitor.
    pub user_message: &'static str,
    pub debug_message: &'static str,
    pub action: &'static str,
}

/// Result of one verification attempt. The raw token never leaves the
/// adapter; only its SHA-256 hash is carried forward.
#[derive(Debug, Clone)]
pub struct TurnstileOutcome {
    pub valid: bool,
    pub token_hash: String,
    /// Set when invalid: "api_request_failed" or "verification_failed".
    pub reason: Option<String>,
    pub error_codes: Vec<String>,
    pub errors: Vec<TurnstileErrorInfo>,
    /// Any error in the configuration category; surfaces to alerting.
    pub config_error: bool,
    pub challenge_ts: Option<String>,
    pub hostname: Option<String>,
    pub action: Option<String>,
    pub ephemeral_id: Option<String>,
    /// True when the outcome was fabricated by the testing bypass.
    pub mocked: bool,
}
