use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shared_config::{AppConfig, RoutesConfig};
use shared_utils::{ConfigCache, ErfidConfig};

/// Router state for the submission surface. The route-config cache and the
/// erfid configuration are process-wide, owned here by the composition
/// root rather than hidden in module globals.
pub struct SubmissionState {
    pub config: Arc<AppConfig>,
    pub routes: Arc<ConfigCache<RoutesConfig>>,
    pub erfid: ErfidConfig,
}

impl SubmissionState {
    pub fn new(config: Arc<AppConfig>, erfid: ErfidConfig) -> Self {
        Self {
            config,
            routes: Arc::new(ConfigCache::with_default_ttl()),
            erfid,
        }
    }
}

/// The typed shape of a mapped submission payload, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub turnstile_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub street2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Address {
    pub fn any_field_set(&self) -> bool {
        [
            &self.street,
            &self.street2,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .any(|f| f.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
    }
}

/// Validated and normalized submission fields: email lowercased and
/// HTML-stripped, phone in E.164, date of birth parsed.
#[derive(Debug, Clone)]
pub struct CleanSubmission {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub date_of_birth: Option<NaiveDate>,
    pub turnstile_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub success: bool,
    pub submission_id: i64,
    pub erfid: String,
    pub message: String,
}

/// Everything persisted for one CAPTCHA verification attempt.
#[derive(Debug, Clone, Default)]
pub struct ValidationEventRecord {
    pub erfid: String,
    pub token_hash: Option<String>,
    pub success: bool,
    pub allowed: bool,
    pub block_reason: Option<String>,
    pub detection_type: Option<String>,
    pub challenge_ts: Option<String>,
    pub hostname: Option<String>,
    pub action: Option<String>,
    pub ephemeral_id: Option<String>,
    pub submission_id: Option<i64>,
    pub risk_score: Option<f64>,
    pub risk_breakdown: Option<Value>,
    pub email_signals: Option<Value>,
    pub testing_bypass: bool,
}

/// A rejection that happened before any CAPTCHA verification, so it never
/// links to a submission.
#[derive(Debug, Clone, Default)]
pub struct FraudBlockRecord {
    pub erfid: String,
    pub block_reason: String,
    pub detection_type: Option<String>,
    pub risk_score: Option<f64>,
    pub risk_breakdown: Option<Value>,
    pub testing_bypass: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_detects_any_set_field() {
        let empty = Address::default();
        assert!(!empty.any_field_set());

        let with_city = Address {
            city: Some("Dublin".to_string()),
            ..Default::default()
        };
        assert!(with_city.any_field_set());

        let whitespace_only = Address {
            street: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(!whitespace_only.any_field_set());
    }

    #[test]
    fn payload_accepts_camel_case() {
        let payload: SubmissionPayload = serde_json::from_str(
            r#"{"firstName": "Alice", "lastName": "Murphy",
                "email": "ALICE@Example.com", "turnstileToken": "tok"}"#,
        )
        .unwrap();
        assert_eq!(payload.first_name, "Alice");
        assert_eq!(payload.turnstile_token.as_deref(), Some("tok"));
        assert!(payload.phone.is_none());
    }
}
