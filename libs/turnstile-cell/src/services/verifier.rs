use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_utils::hashing::sha256_hex;

use crate::models::{ErrorCategory, SiteverifyResponse, TurnstileOutcome};
use crate::services::error_codes;

/// Client for the Turnstile siteverify endpoint. Holds the widget secret;
/// tokens pass through and only their hash survives.
pub struct TurnstileVerifier {
    client: Client,
    secret_key: String,
    siteverify_url: String,
}

impl TurnstileVerifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.turnstile_secret_key.clone(),
            siteverify_url: config.turnstile_siteverify_url.clone(),
        }
    }

    /// SHA-256 of the raw token, hex encoded. This is the only form of the
    /// token that is ever persisted or compared.
    pub fn hash_token(token: &str) -> String {
        sha256_hex(token)
    }

    /// Verify a token with the upstream. Upstream transport failures come
    /// back as an invalid outcome with reason `api_request_failed`; callers
    /// translate that to a 503, not a fraud signal.
    pub async fn verify(&self, token: &str, remote_ip: &str) -> TurnstileOutcome {
        let token_hash = Self::hash_token(token);

        debug!("Verifying Turnstile token (hash {})", &token_hash[..16]);

        let request_body = json!({
            "secret": self.secret_key,
            "response": token,
            "remoteip": remote_ip,
        });

        let response = match self
            .client
            .post(&self.siteverify_url)
            .json(&request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Siteverify request failed: {}", e);
                return Self::transport_failure(token_hash);
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to read siteverify response: {}", e);
                return Self::transport_failure(token_hash);
            }
        };

        if !status.is_success() {
            error!("Siteverify returned {}: {}", status, body);
            return Self::transport_failure(token_hash);
        }

        let parsed: SiteverifyResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Failed to parse siteverify response: {} - {}", e, body);
                return Self::transport_failure(token_hash);
            }
        };

        let ephemeral_id = parsed.metadata.and_then(|m| m.ephemeral_id);

        if parsed.success {
            debug!("Turnstile verification succeeded");
            return TurnstileOutcome {
                valid: true,
                token_hash,
                reason: None,
                error_codes: Vec::new(),
                errors: Vec::new(),
                config_error: false,
                challenge_ts: parsed.challenge_ts,
                hostname: parsed.hostname,
                action: parsed.action,
                ephemeral_id,
                mocked: false,
            };
        }

        let errors: Vec<_> = parsed
            .error_codes
            .iter()
            .map(|code| error_codes::lookup(code))
            .collect();
        let config_error = errors
            .iter()
            .any(|e| e.category == ErrorCategory::Configuration);

        if config_error {
            // Misconfiguration blocks every visitor; page the operator.
            error!(
                "Turnstile configuration error: {:?}",
                parsed.error_codes
            );
        } else {
            warn!("Turnstile verification failed: {:?}", parsed.error_codes);
        }

        TurnstileOutcome {
            valid: false,
            token_hash,
            reason: Some("verification_failed".to_string()),
            error_codes: parsed.error_codes,
            errors,
            config_error,
            challenge_ts: parsed.challenge_ts,
            hostname: parsed.hostname,
            action: parsed.action,
            ephemeral_id,
            mocked: false,
        }
    }

    /// Fabricated success used by the testing bypass. The ephemeral id is
    /// unique per call so downstream counters behave like a fresh visitor.
    pub fn mock_success(token: &str) -> TurnstileOutcome {
        let ephemeral_id = format!("test-{}", Uuid::new_v4());
        info!("Testing bypass active, fabricated ephemeral id {}", ephemeral_id);
        TurnstileOutcome {
            valid: true,
            token_hash: Self::hash_token(token),
            reason: None,
            error_codes: Vec::new(),
            errors: Vec::new(),
            config_error: false,
            challenge_ts: None,
            hostname: None,
            action: Some("testing_bypass".to_string()),
            ephemeral_id: Some(ephemeral_id),
            mocked: true,
        }
    }

    fn transport_failure(token_hash: String) -> TurnstileOutcome {
        TurnstileOutcome {
            valid: false,
            token_hash,
            reason: Some("api_request_failed".to_string()),
            error_codes: Vec::new(),
            errors: Vec::new(),
            config_error: false,
            challenge_ts: None,
            hostname: None,
            action: None,
            ephemeral_id: None,
            mocked: false,
        }
    }
}
