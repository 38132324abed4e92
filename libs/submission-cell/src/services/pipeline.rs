use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use blocklist_cell::models::{AddBlockParams, Confidence};
use blocklist_cell::services::policy;
use blocklist_cell::BlocklistStore;
use scoring_cell::{score, BlockTrigger, RiskBreakdown, RiskInputs};
use shared_config::{AppConfig, RoutesConfig};
use shared_database::SupabaseClient;
use shared_models::error::AppError;
use shared_models::metadata::RequestMetadata;
use signal_cell::models::{FingerprintDetection, SignalBundle};
use signal_cell::SignalCollectors;
use turnstile_cell::{TurnstileOutcome, TurnstileVerifier};

use crate::models::{
    join_field_errors, CleanSubmission, FraudBlockRecord, SubmissionPayload, SubmissionResponse,
    ValidationEventRecord,
};
use crate::services::store::{StoreError, SubmissionStore};
use crate::services::{fields, reasons, schema};

/// The per-submission decision pipeline: definitive checks, concurrent
/// signal collection, holistic decision, persistence.
pub struct SubmissionPipeline {
    config: Arc<AppConfig>,
    blocklist: BlocklistStore,
    signals: SignalCollectors,
    verifier: TurnstileVerifier,
    store: SubmissionStore,
}

impl SubmissionPipeline {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(&config));
        Self::with_supabase(config, supabase)
    }

    pub fn with_supabase(config: Arc<AppConfig>, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            blocklist: BlocklistStore::new(Arc::clone(&supabase)),
            signals: SignalCollectors::new(&config, Arc::clone(&supabase)),
            verifier: TurnstileVerifier::new(&config),
            store: SubmissionStore::new(supabase),
            config,
        }
    }

    /// Single entry point. Metadata and erfid are extracted by the handler
    /// before any work happens; every persisted row carries them.
    pub async fn submit(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        raw_payload: Value,
        routes: &RoutesConfig,
        api_key: Option<&str>,
    ) -> Result<SubmissionResponse, AppError> {
        let bypass = self.config.testing_bypass_enabled(api_key);

        // **Step 1: Field mapping + schema validation**
        let clean = self.validate_payload(&raw_payload, routes, bypass)?;

        info!(
            erfid = erfid,
            remote_ip = metadata.remote_ip.as_str(),
            bypass = bypass,
            "processing submission"
        );

        // **Step 2: Pre-validation blocklist check**
        self.pre_blocklist_check(metadata, erfid, &clean, bypass)
            .await?;

        // **Step 3: Token replay check + CAPTCHA verification**
        let outcome = self
            .verify_captcha(metadata, erfid, &clean, bypass)
            .await?;
        let ephemeral_id = outcome.ephemeral_id.clone();

        // **Step 4: Concurrent signal collection**
        let bundle = self
            .signals
            .collect_all(metadata, &clean.email, ephemeral_id.as_deref())
            .await;

        // **Step 5: Duplicate-email branch**
        self.duplicate_email_check(metadata, erfid, &clean, &outcome, &bundle, bypass)
            .await?;

        // **Step 6: Holistic risk decision**
        let trigger = self.determine_trigger(&bundle);
        let inputs = build_inputs(&bundle, trigger);
        let breakdown = score(&inputs, &self.config.fraud);

        if breakdown.total >= self.config.fraud.block_threshold {
            // Weighted base alone can cross the threshold without any
            // single check firing; attribute the block to the largest
            // contributor
            let trigger = trigger.unwrap_or_else(|| dominant_trigger(&breakdown));
            return Err(self
                .block_submission(metadata, erfid, &clean, &outcome, &bundle, breakdown, trigger, bypass)
                .await);
        }

        // **Step 7: Create the submission and its validation event**
        self.create_submission(metadata, erfid, &clean, &raw_payload, &outcome, &bundle, breakdown, bypass)
            .await
    }

    fn validate_payload(
        &self,
        raw_payload: &Value,
        routes: &RoutesConfig,
        bypass: bool,
    ) -> Result<CleanSubmission, AppError> {
        let mapped = fields::extract_fields(raw_payload, &routes.fields)
            .map_err(|errors| AppError::Validation(join_field_errors(&errors)))?;
        let payload: SubmissionPayload = serde_json::from_value(mapped)
            .map_err(|e| AppError::Validation(format!("malformed payload: {e}")))?;
        schema::validate(payload, &self.config.fraud.default_country_prefix, bypass)
            .map_err(|errors| AppError::Validation(join_field_errors(&errors)))
    }

    /// A standing block rejects before any CAPTCHA spend. The rejection is
    /// recorded as a fraud block, never as a validation event.
    async fn pre_blocklist_check(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        clean: &CleanSubmission,
        bypass: bool,
    ) -> Result<(), AppError> {
        let check = self
            .blocklist
            .check(
                None,
                &metadata.remote_ip,
                metadata.ja4.as_deref(),
                Some(&clean.email),
            )
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !check.blocked {
            return Ok(());
        }

        let entry = check.entry.as_ref();
        let detection_type = entry.and_then(|e| e.detection_type.clone());
        let message =
            reasons::block_reason_for_detection(detection_type.as_deref(), check.retry_after);

        let record = FraudBlockRecord {
            erfid: erfid.to_string(),
            block_reason: check.reason.clone().unwrap_or_else(|| "blocklisted".to_string()),
            detection_type,
            risk_score: entry.and_then(|e| e.risk_score),
            risk_breakdown: entry.and_then(|e| e.risk_breakdown.clone()),
            testing_bypass: bypass,
        };
        if let Err(e) = self.store.insert_fraud_block(&record, metadata).await {
            error!("Failed to record pre-validation block: {}", e);
        }

        Err(AppError::RateLimit {
            message,
            retry_after: check.retry_after,
            expires_at: check
                .expires_at
                .unwrap_or_else(|| Utc::now() + Duration::seconds(check.retry_after as i64)),
        })
    }

    /// Replay detection runs against stored validation events before the
    /// upstream is consulted; the bypass replaces the upstream with a
    /// mocked success carrying a fresh ephemeral id.
    async fn verify_captcha(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        clean: &CleanSubmission,
        bypass: bool,
    ) -> Result<TurnstileOutcome, AppError> {
        if bypass {
            let token = clean.turnstile_token.as_deref().unwrap_or("testing-bypass");
            return Ok(TurnstileVerifier::mock_success(token));
        }

        let token = clean
            .turnstile_token
            .as_deref()
            .ok_or_else(|| AppError::Validation("turnstileToken: is required".to_string()))?;
        let token_hash = TurnstileVerifier::hash_token(token);

        let seen = self
            .store
            .token_seen(&token_hash)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if seen {
            warn!(erfid = erfid, "token replay detected");
            let breakdown = score(
                &RiskInputs {
                    token_replay: true,
                    ..Default::default()
                },
                &self.config.fraud,
            );
            let record = ValidationEventRecord {
                erfid: erfid.to_string(),
                token_hash: Some(token_hash),
                success: false,
                allowed: false,
                block_reason: Some("token_replay".to_string()),
                detection_type: Some("token_replay_protection".to_string()),
                risk_score: Some(breakdown.total),
                risk_breakdown: serde_json::to_value(&breakdown).ok(),
                testing_bypass: bypass,
                ..Default::default()
            };
            if let Err(e) = self.store.insert_validation_event(&record, metadata).await {
                error!("Failed to record replay event: {}", e);
            }
            return Err(AppError::TokenReused(
                "Token replay attack detected.".to_string(),
            ));
        }

        let outcome = self.verifier.verify(token, &metadata.remote_ip).await;

        if outcome.valid {
            return Ok(outcome);
        }

        if outcome.reason.as_deref() == Some("api_request_failed") {
            // Upstream outage is not a fraud signal
            let record = ValidationEventRecord {
                erfid: erfid.to_string(),
                token_hash: Some(outcome.token_hash.clone()),
                success: false,
                allowed: false,
                block_reason: Some("api_request_failed".to_string()),
                testing_bypass: bypass,
                ..Default::default()
            };
            if let Err(e) = self.store.insert_validation_event(&record, metadata).await {
                error!("Failed to record siteverify outage: {}", e);
            }
            return Err(AppError::ExternalService(
                "CAPTCHA verification is temporarily unavailable.".to_string(),
            ));
        }

        let breakdown = score(
            &RiskInputs {
                block_trigger: Some(BlockTrigger::TurnstileFailed),
                ..Default::default()
            },
            &self.config.fraud,
        );
        let record = ValidationEventRecord {
            erfid: erfid.to_string(),
            token_hash: Some(outcome.token_hash.clone()),
            success: false,
            allowed: false,
            block_reason: outcome.reason.clone(),
            detection_type: Some(BlockTrigger::TurnstileFailed.as_str().to_string()),
            challenge_ts: outcome.challenge_ts.clone(),
            hostname: outcome.hostname.clone(),
            action: outcome.action.clone(),
            ephemeral_id: outcome.ephemeral_id.clone(),
            risk_score: Some(breakdown.total),
            risk_breakdown: serde_json::to_value(&breakdown).ok(),
            testing_bypass: bypass,
            ..Default::default()
        };
        if let Err(e) = self.store.insert_validation_event(&record, metadata).await {
            error!("Failed to record failed verification: {}", e);
        }

        let message = outcome
            .errors
            .first()
            .map(|e| e.user_message.to_string())
            .unwrap_or_else(|| "Verification failed. Please refresh and try again.".to_string());
        Err(AppError::CaptchaFailed(message))
    }

    /// First and second duplicate attempts conflict (409) and leave a
    /// low-confidence tracking entry; the third inside 24h escalates to a
    /// progressive-timeout block (429).
    async fn duplicate_email_check(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        clean: &CleanSubmission,
        outcome: &TurnstileOutcome,
        bundle: &SignalBundle,
        bypass: bool,
    ) -> Result<(), AppError> {
        let exists = self
            .store
            .email_exists(&clean.email)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if !exists {
            return Ok(());
        }

        let prior_offenses = self
            .blocklist
            .duplicate_email_offenses(&clean.email, &metadata.remote_ip)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        let occurrence = prior_offenses + 1;

        let inputs = build_inputs(bundle, Some(BlockTrigger::DuplicateEmail));
        let mut breakdown = score(&inputs, &self.config.fraud);

        if occurrence >= 3 {
            // Repeat offender: the decision is a real block now
            breakdown.total = breakdown.total.max(self.config.fraud.block_threshold);
            let expires_in = policy::block_duration_with(
                &self.config.fraud.timeout_schedule,
                occurrence,
            );
            let message = reasons::block_reason(BlockTrigger::DuplicateEmail, expires_in);

            self.add_block(
                metadata,
                erfid,
                Some(&clean.email),
                outcome.ephemeral_id.as_deref(),
                &message,
                Confidence::High,
                "duplicate_email",
                expires_in,
                &breakdown,
                bundle,
            )
            .await?;

            self.record_rejection(
                metadata,
                erfid,
                outcome,
                &breakdown,
                bundle,
                "duplicate_email",
                &message,
                bypass,
            )
            .await;

            return Err(AppError::RateLimit {
                message,
                retry_after: expires_in,
                expires_at: Utc::now() + Duration::seconds(expires_in as i64),
            });
        }

        // Tracking entry so the third attempt can be recognized. The store
        // keeps low-confidence duplicate_email rows out of standing-block
        // lookups, so the next attempt still reaches this branch
        let message = "This email address has already been registered.".to_string();
        self.add_block(
            metadata,
            erfid,
            Some(&clean.email),
            outcome.ephemeral_id.as_deref(),
            &message,
            Confidence::Low,
            "duplicate_email",
            86400,
            &breakdown,
            bundle,
        )
        .await?;

        self.record_rejection(
            metadata,
            erfid,
            outcome,
            &breakdown,
            bundle,
            "duplicate_email",
            &message,
            bypass,
        )
        .await;

        Err(AppError::Conflict(message))
    }

    /// Primary-cause election across the collected signals. Order follows
    /// signal strength: a reputation verdict outranks the session
    /// counters, which outrank the fingerprint heuristics.
    fn determine_trigger(&self, bundle: &SignalBundle) -> Option<BlockTrigger> {
        let thresholds = &self.config.fraud.ephemeral_id;

        if bundle.email.is_block() {
            return Some(BlockTrigger::EmailFraud);
        }
        if bundle.ephemeral.submission_count >= thresholds.submission_threshold {
            return Some(BlockTrigger::EphemeralIdFraud);
        }
        if bundle.ephemeral.validation_count >= thresholds.validation_block_threshold {
            return Some(BlockTrigger::ValidationFrequency);
        }
        if bundle.ephemeral.unique_ip_count > thresholds.ip_diversity_threshold {
            return Some(BlockTrigger::IpDiversity);
        }
        if bundle.ja4.detection.is_some() {
            return Some(BlockTrigger::Ja4SessionHopping);
        }
        bundle.fingerprint.primary.map(|primary| match primary {
            FingerprintDetection::HeaderFingerprint => BlockTrigger::HeaderFingerprint,
            FingerprintDetection::TlsAnomaly => BlockTrigger::TlsAnomaly,
            FingerprintDetection::LatencyMismatch => BlockTrigger::LatencyMismatch,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn block_submission(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        clean: &CleanSubmission,
        outcome: &TurnstileOutcome,
        bundle: &SignalBundle,
        breakdown: RiskBreakdown,
        trigger: BlockTrigger,
        bypass: bool,
    ) -> AppError {
        let offense_count = match self
            .blocklist
            .offense_count(
                Some(&clean.email),
                outcome.ephemeral_id.as_deref(),
                Some(&metadata.remote_ip),
            )
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!("Offense count unavailable, using first bucket: {}", e);
                1
            }
        };
        let expires_in =
            policy::block_duration_with(&self.config.fraud.timeout_schedule, offense_count);
        let detection_type = detection_label(trigger, bundle);
        let message = reasons::block_reason(trigger, expires_in);
        let confidence = confidence_for(breakdown.total, self.config.fraud.block_threshold);

        info!(
            erfid = erfid,
            total = breakdown.total,
            trigger = trigger.as_str(),
            detection = detection_type.as_str(),
            offense = offense_count,
            "submission blocked"
        );

        if let Err(e) = self
            .add_block(
                metadata,
                erfid,
                Some(&clean.email),
                outcome.ephemeral_id.as_deref(),
                &message,
                confidence,
                &detection_type,
                expires_in,
                &breakdown,
                bundle,
            )
            .await
        {
            return e;
        }

        self.record_rejection(
            metadata,
            erfid,
            outcome,
            &breakdown,
            bundle,
            &detection_type,
            &message,
            bypass,
        )
        .await;

        AppError::RateLimit {
            message,
            retry_after: expires_in,
            expires_at: Utc::now() + Duration::seconds(expires_in as i64),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_submission(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        clean: &CleanSubmission,
        raw_payload: &Value,
        outcome: &TurnstileOutcome,
        bundle: &SignalBundle,
        breakdown: RiskBreakdown,
        bypass: bool,
    ) -> Result<SubmissionResponse, AppError> {
        let email_signals = serde_json::to_value(&bundle.email).ok();

        let submission_id = match self
            .store
            .insert_submission(
                clean,
                metadata,
                raw_payload,
                erfid,
                outcome.ephemeral_id.as_deref(),
                &breakdown,
                email_signals.clone(),
                bypass,
            )
            .await
        {
            Ok(id) => id,
            Err(StoreError::DuplicateEmail) => {
                // Concurrent first writer won the unique index
                return Err(AppError::Conflict(
                    "This email address has already been registered.".to_string(),
                ));
            }
            Err(StoreError::Database(e)) => return Err(AppError::Database(e.to_string())),
        };

        let record = ValidationEventRecord {
            erfid: erfid.to_string(),
            token_hash: Some(outcome.token_hash.clone()),
            success: true,
            allowed: true,
            challenge_ts: outcome.challenge_ts.clone(),
            hostname: outcome.hostname.clone(),
            action: outcome.action.clone(),
            ephemeral_id: outcome.ephemeral_id.clone(),
            submission_id: Some(submission_id),
            risk_score: Some(breakdown.total),
            risk_breakdown: serde_json::to_value(&breakdown).ok(),
            email_signals,
            testing_bypass: bypass,
            ..Default::default()
        };
        if let Err(e) = self.store.insert_validation_event(&record, metadata).await {
            error!("Failed to record accepted validation: {}", e);
        }

        info!(
            erfid = erfid,
            submission_id = submission_id,
            total = breakdown.total,
            "submission accepted"
        );

        Ok(SubmissionResponse {
            success: true,
            submission_id,
            erfid: erfid.to_string(),
            message: "Submission received.".to_string(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_block(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        email: Option<&str>,
        ephemeral_id: Option<&str>,
        reason: &str,
        confidence: Confidence,
        detection_type: &str,
        expires_in: u64,
        breakdown: &RiskBreakdown,
        bundle: &SignalBundle,
    ) -> Result<(), AppError> {
        self.blocklist
            .add(AddBlockParams {
                email: email.map(str::to_string),
                ephemeral_id: ephemeral_id.map(str::to_string),
                remote_ip: Some(metadata.remote_ip.clone()),
                ja4: metadata.ja4.clone(),
                reason: reason.to_string(),
                confidence,
                detection_type: Some(detection_type.to_string()),
                expires_in,
                risk_score: Some(breakdown.total),
                risk_breakdown: serde_json::to_value(breakdown).ok(),
                detection_metadata: Some(json!({ "warnings": bundle.warnings() })),
                erfid: Some(erfid.to_string()),
            })
            .await
            .map(|_| ())
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Validation-event write for a rejected submission. The decision
    /// already stands; a failed write is logged, not surfaced.
    #[allow(clippy::too_many_arguments)]
    async fn record_rejection(
        &self,
        metadata: &RequestMetadata,
        erfid: &str,
        outcome: &TurnstileOutcome,
        breakdown: &RiskBreakdown,
        bundle: &SignalBundle,
        detection_type: &str,
        reason: &str,
        bypass: bool,
    ) {
        let record = ValidationEventRecord {
            erfid: erfid.to_string(),
            token_hash: Some(outcome.token_hash.clone()),
            success: outcome.valid,
            allowed: false,
            block_reason: Some(reason.to_string()),
            detection_type: Some(detection_type.to_string()),
            challenge_ts: outcome.challenge_ts.clone(),
            hostname: outcome.hostname.clone(),
            action: outcome.action.clone(),
            ephemeral_id: outcome.ephemeral_id.clone(),
            submission_id: None,
            risk_score: Some(breakdown.total),
            risk_breakdown: serde_json::to_value(breakdown).ok(),
            email_signals: serde_json::to_value(&bundle.email).ok(),
            testing_bypass: bypass,
        };
        if let Err(e) = self.store.insert_validation_event(&record, metadata).await {
            error!("Failed to record rejected validation: {}", e);
        }
    }
}

fn build_inputs(bundle: &SignalBundle, trigger: Option<BlockTrigger>) -> RiskInputs {
    RiskInputs {
        token_replay: false,
        email_risk_score: bundle.email.risk_score,
        ephemeral_id_count: bundle.ephemeral.submission_count,
        validation_count: bundle.ephemeral.validation_count,
        unique_ip_count: bundle.ephemeral.unique_ip_count,
        ja4_raw_score: bundle.ja4.raw_score,
        ip_rate_score: bundle.ip_rate.score,
        header_fingerprint_score: bundle.fingerprint.header_reuse.score,
        tls_anomaly_score: bundle.fingerprint.tls_anomaly.score,
        latency_mismatch_score: bundle.fingerprint.latency.score,
        block_trigger: trigger,
    }
}

/// Primary detection label persisted with blocks and analytics rows. JA4
/// blocks carry the specific layer that fired.
fn detection_label(trigger: BlockTrigger, bundle: &SignalBundle) -> String {
    match trigger {
        BlockTrigger::Ja4SessionHopping => bundle
            .ja4
            .detection
            .map(|d| d.as_str().to_string())
            .unwrap_or_else(|| trigger.as_str().to_string()),
        BlockTrigger::TokenReplay => "token_replay_protection".to_string(),
        _ => trigger.as_str().to_string(),
    }
}

/// Largest-contribution component among those that may stand alone as a
/// block cause. The ip-rate and fingerprint components are excluded: the
/// former is never a standalone trigger, the latter carry their own
/// trigger when they fire.
fn dominant_trigger(breakdown: &RiskBreakdown) -> BlockTrigger {
    let candidates = [
        (breakdown.email_fraud.contribution, BlockTrigger::EmailFraud),
        (breakdown.ephemeral_id.contribution, BlockTrigger::EphemeralIdFraud),
        (
            breakdown.validation_frequency.contribution,
            BlockTrigger::ValidationFrequency,
        ),
        (breakdown.ip_diversity.contribution, BlockTrigger::IpDiversity),
        (
            breakdown.ja4_session_hopping.contribution,
            BlockTrigger::Ja4SessionHopping,
        ),
    ];
    candidates
        .iter()
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, trigger)| *trigger)
        .unwrap_or(BlockTrigger::EphemeralIdFraud)
}

fn confidence_for(total: f64, block_threshold: f64) -> Confidence {
    if total >= block_threshold + 25.0 {
        Confidence::High
    } else if total >= block_threshold + 10.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_tiers_from_total() {
        assert_eq!(confidence_for(85.0, 60.0), Confidence::High);
        assert_eq!(confidence_for(72.0, 60.0), Confidence::Medium);
        assert_eq!(confidence_for(61.0, 60.0), Confidence::Low);
    }
}
