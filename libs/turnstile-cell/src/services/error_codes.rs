use crate::models::{ErrorCategory, TurnstileErrorInfo};

/// Expand a siteverify error code into its operator guidance. Unknown codes
/// fall through to a generic token failure so new upstream codes degrade
/// gracefully.
pub fn lookup(code: &str) -> TurnstileErrorInfo {
    let (category, title, user_message, debug_message, action) = match code {
        "missing-input-secret" => (
            ErrorCategory::Configuration,
            "Missing secret key",
            "Verification is temporarily unavailable.",
            "The secret key was not passed to siteverify.",
            "Check TURNSTILE_SECRET_KEY in the environment.",
        ),
        "invalid-input-secret" => (
            ErrorCategory::Configuration,
            "Invalid secret key",
            "Verification is temporarily unavailable.",
            "The secret key was rejected by siteverify.",
            "Rotate the widget secret and update TURNSTILE_SECRET_KEY.",
        ),
        "missing-input-response" => (
            ErrorCategory::Token,
            "Missing token",
            "Please complete the verification challenge.",
            "No token was supplied in the verification request.",
            "The form should not submit before the widget resolves.",
        ),
        "invalid-input-response" => (
            ErrorCategory::Token,
            "Invalid token",
            "Verification failed. Please refresh and try again.",
            "The token is malformed or did not originate from this widget.",
            "Confirm the widget sitekey matches the configured secret.",
        ),
        "timeout-or-duplicate" => (
            ErrorCategory::Token,
            "Expired or replayed token",
            "Verification expired. Please try again.",
            "The token already expired or has already been consumed.",
            "No action needed unless the rate is abnormal.",
        ),
        "invalid-widget-id" => (
            ErrorCategory::Configuration,
            "Invalid widget id",
            "Verification is temporarily unavailable.",
            "The token was issued by a widget this secret does not own.",
            "Check the widget/secret pairing in the dashboard.",
        ),
        "invalid-parsed-secret" => (
            ErrorCategory::Configuration,
            "Malformed secret key",
            "Verification is temporarily unavailable.",
            "The secret key could not be parsed.",
            "Re-copy the secret from the dashboard.",
        ),
        "bad-request" => (
            ErrorCategory::Request,
            "Malformed request",
            "Verification failed. Please try again.",
            "The verification request was rejected as malformed.",
            "Inspect the siteverify payload for missing fields.",
        ),
        "internal-error" => (
            ErrorCategory::Upstream,
            "Upstream error",
            "Verification is temporarily unavailable. Please retry.",
            "Siteverify reported an internal error.",
            "Retry; escalate if sustained.",
        ),
        _ => (
            ErrorCategory::Token,
            "Verification failed",
            "Verification failed. Please refresh and try again.",
            "Unrecognized siteverify error code.",
            "Check release notes for new error codes.",
        ),
    };

    TurnstileErrorInfo {
        code: code.to_string(),
        category,
        title,
        user_message,
        debug_message,
        action,
    }
}
