use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_models::metadata::RequestMetadata;
use shared_utils::hashing::sha256_hex;

use crate::models::{EmailDecision, EmailFraudSignal};

/// Client for the external email-reputation service. Fails open: any
/// transport or contract problem degrades to an absent signal plus a
/// warning, never a block.
pub struct EmailReputationClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ReputationResponse {
    valid: Option<bool>,
    /// Provider-native risk in [0, 1].
    risk_score: Option<f64>,
    decision: Option<EmailDecision>,
    #[serde(default)]
    signals: Vec<String>,
}

impl EmailReputationClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.email_reputation_url.clone(),
            api_key: config.email_reputation_key.clone(),
        }
    }

    pub async fn validate(&self, email: &str, metadata: &RequestMetadata) -> EmailFraudSignal {
        if self.base_url.is_empty() {
            return EmailFraudSignal::unavailable(None);
        }

        // Emails never reach a log line in cleartext
        let email_hash = sha256_hex(email);

        let request_body = json!({
            "email": email,
            "consumer": "registration-gateway",
            "flow": "submission",
            "headers": Self::header_bundle(metadata),
        });

        let response = match self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Email reputation request failed for {}: {}", &email_hash[..16], e);
                return EmailFraudSignal::unavailable(Some(
                    "email reputation service unavailable".to_string(),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Email reputation returned {} for {}",
                status,
                &email_hash[..16]
            );
            return EmailFraudSignal::unavailable(Some(
                "email reputation service unavailable".to_string(),
            ));
        }

        let parsed: ReputationResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Email reputation parse failure: {}", e);
                return EmailFraudSignal::unavailable(Some(
                    "email reputation response malformed".to_string(),
                ));
            }
        };

        // Provider scores in [0, 1]; the engine consumes 0..100
        let risk_score = parsed.risk_score.map(|s| (s * 100.0).clamp(0.0, 100.0));

        debug!(
            email = &email_hash[..16],
            risk_score = ?risk_score,
            decision = ?parsed.decision,
            "email reputation collected"
        );

        let mut warnings = Vec::new();
        match parsed.decision {
            Some(EmailDecision::Block) => {
                warnings.push("email reputation verdict: block".to_string())
            }
            Some(EmailDecision::Warn) => {
                warnings.push("email reputation verdict: warn".to_string())
            }
            _ => {}
        }

        EmailFraudSignal {
            available: true,
            valid: parsed.valid,
            risk_score,
            decision: parsed.decision,
            signals: parsed.signals,
            warnings,
        }
    }

    /// Curated request context forwarded to the provider: geography,
    /// network, bot management, and client hints. Cookie and authorization
    /// material never appears here (already stripped upstream).
    fn header_bundle(metadata: &RequestMetadata) -> serde_json::Value {
        json!({
            "remote_ip": metadata.remote_ip,
            "country": metadata.country,
            "region": metadata.region,
            "city": metadata.city,
            "timezone": metadata.timezone,
            "continent": metadata.continent,
            "asn": metadata.asn,
            "as_organization": metadata.as_organization,
            "bot_score": metadata.bot_score,
            "verified_bot": metadata.verified_bot,
            "ja3_hash": metadata.ja3_hash,
            "ja4": metadata.ja4,
            "user_agent": metadata.user_agent,
            "sec_ch_ua": metadata.sec_ch_ua,
            "sec_ch_ua_mobile": metadata.sec_ch_ua_mobile,
            "sec_ch_ua_platform": metadata.sec_ch_ua_platform,
        })
    }
}
