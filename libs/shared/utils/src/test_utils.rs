use std::sync::Arc;

use serde_json::{json, Value};

use shared_config::{AppConfig, ErfidOptions, FraudConfig, RoutesConfig};
use shared_models::metadata::RequestMetadata;

use crate::fingerprint::header_fingerprint;

pub struct TestConfig {
    pub supabase_url: String,
    pub turnstile_siteverify_url: String,
    pub email_reputation_url: String,
    pub operator_api_key: String,
    pub allow_testing_bypass: bool,
    pub fraud: FraudConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            turnstile_siteverify_url: "http://localhost:54322/siteverify".to_string(),
            email_reputation_url: "http://localhost:54323/validate".to_string(),
            operator_api_key: "test-operator-key".to_string(),
            allow_testing_bypass: false,
            fraud: FraudConfig::default(),
        }
    }
}

impl TestConfig {
    /// Point the persistence and upstream clients at mock servers.
    pub fn with_mock_urls(supabase: &str, siteverify: &str, reputation: &str) -> Self {
        Self {
            supabase_url: supabase.to_string(),
            turnstile_siteverify_url: siteverify.to_string(),
            email_reputation_url: reputation.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_service_key: "test-service-key".to_string(),
            turnstile_secret_key: "test-turnstile-secret".to_string(),
            turnstile_siteverify_url: self.turnstile_siteverify_url.clone(),
            operator_api_key: self.operator_api_key.clone(),
            allow_testing_bypass: self.allow_testing_bypass,
            allowed_origins: vec!["https://forms.example.com".to_string()],
            environment: "test".to_string(),
            email_reputation_url: self.email_reputation_url.clone(),
            email_reputation_key: "test-reputation-key".to_string(),
            fraud: self.fraud.clone(),
            erfid: ErfidOptions::default(),
            routes: RoutesConfig::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Metadata for a plain browser request from `ip`.
pub fn test_metadata(ip: &str) -> RequestMetadata {
    let mut headers = std::collections::BTreeMap::new();
    headers.insert("accept".to_string(), "application/json".to_string());
    headers.insert(
        "user-agent".to_string(),
        "Mozilla/5.0 (X11; Linux x86_64) TestBrowser/1.0".to_string(),
    );
    let fingerprint = header_fingerprint(&headers);

    RequestMetadata {
        remote_ip: ip.to_string(),
        country: Some("IE".to_string()),
        asn: Some(64512),
        as_organization: Some("Test Carrier".to_string()),
        user_agent: headers.get("user-agent").cloned(),
        ja4: Some("t13d1516h2_8daaf6152771_b0da82dd1658".to_string()),
        header_fingerprint: fingerprint,
        headers,
        ..Default::default()
    }
}

/// A well-formed registration payload accepted by the default field map.
pub fn test_submission_payload(email: &str) -> Value {
    json!({
        "firstName": "Alice",
        "lastName": "Murphy",
        "email": email,
        "phone": "+353871234567",
        "turnstileToken": "XXXX.DUMMY.TOKEN.XXXX",
    })
}

/// PostgREST-style row for a stored blocklist entry.
pub fn blocklist_entry_row(id: i64, remote_ip: &str, expires_at: &str) -> Value {
    json!({
        "id": id,
        "email": null,
        "ephemeral_id": null,
        "remote_ip": remote_ip,
        "ja4": null,
        "reason": "risk threshold exceeded",
        "confidence": "medium",
        "detection_type": "ephemeral_id_fraud",
        "blocked_at": "2025-01-01 00:00:00",
        "expires_at": expires_at,
        "submission_count": 1,
        "risk_score": 75.0,
        "risk_breakdown": null,
        "detection_metadata": null,
        "erfid": "erf_test"
    })
}
