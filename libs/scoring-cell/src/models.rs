use serde::{Deserialize, Serialize};

/// The single primary cause that pushed a submission over the block
/// threshold. Drives the user-visible block copy and the floor applied to
/// the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockTrigger {
    TokenReplay,
    EphemeralIdFraud,
    Ja4SessionHopping,
    IpDiversity,
    ValidationFrequency,
    DuplicateEmail,
    TurnstileFailed,
    EmailFraud,
    HeaderFingerprint,
    TlsAnomaly,
    LatencyMismatch,
}

impl BlockTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTrigger::TokenReplay => "token_replay",
            BlockTrigger::EphemeralIdFraud => "ephemeral_id_fraud",
            BlockTrigger::Ja4SessionHopping => "ja4_session_hopping",
            BlockTrigger::IpDiversity => "ip_diversity",
            BlockTrigger::ValidationFrequency => "validation_frequency",
            BlockTrigger::DuplicateEmail => "duplicate_email",
            BlockTrigger::TurnstileFailed => "turnstile_failed",
            BlockTrigger::EmailFraud => "email_fraud",
            BlockTrigger::HeaderFingerprint => "header_fingerprint",
            BlockTrigger::TlsAnomaly => "tls_anomaly",
            BlockTrigger::LatencyMismatch => "latency_mismatch",
        }
    }

    /// Minimum total a triggered submission scores, relative to the block
    /// threshold. Token replay is absolute and handled before floors apply.
    pub fn floor(&self, block_threshold: f64) -> f64 {
        match self {
            BlockTrigger::TokenReplay => 100.0,
            BlockTrigger::IpDiversity => block_threshold + 10.0,
            BlockTrigger::Ja4SessionHopping
            | BlockTrigger::HeaderFingerprint
            | BlockTrigger::TlsAnomaly
            | BlockTrigger::LatencyMismatch => block_threshold + 5.0,
            BlockTrigger::EphemeralIdFraud
            | BlockTrigger::ValidationFrequency
            | BlockTrigger::EmailFraud => block_threshold,
            BlockTrigger::TurnstileFailed => block_threshold - 5.0,
            BlockTrigger::DuplicateEmail => block_threshold - 10.0,
        }
    }
}

/// Everything the engine needs, already collected. Counts follow the
/// collectors' "+1 for the current attempt" convention.
#[derive(Debug, Clone, Default)]
pub struct RiskInputs {
    pub token_replay: bool,
    /// Reputation-service score scaled to 0..100; absent when the service
    /// was unavailable or skipped.
    pub email_risk_score: Option<f64>,
    pub ephemeral_id_count: i64,
    pub validation_count: i64,
    pub unique_ip_count: i64,
    /// Composite JA4 session-hopping score, 0..230.
    pub ja4_raw_score: u32,
    pub ip_rate_score: f64,
    pub header_fingerprint_score: f64,
    pub tls_anomaly_score: f64,
    pub latency_mismatch_score: f64,
    pub block_trigger: Option<BlockTrigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentScore {
    /// Normalized component score, 0..100.
    pub score: f64,
    pub weight: f64,
    /// `score * weight`, the component's share of the weighted base.
    pub contribution: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f64>,
    pub reason: String,
}

impl ComponentScore {
    pub fn new(score: f64, weight: f64, reason: impl Into<String>) -> Self {
        Self {
            score,
            weight,
            contribution: score * weight,
            raw_score: None,
            reason: reason.into(),
        }
    }

    pub fn with_raw(mut self, raw: f64) -> Self {
        self.raw_score = Some(raw);
        self
    }
}

/// Full per-component picture persisted with every submission and
/// validation event. Totals are kept to one decimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskBreakdown {
    pub token_replay: ComponentScore,
    pub email_fraud: ComponentScore,
    pub ephemeral_id: ComponentScore,
    pub validation_frequency: ComponentScore,
    pub ip_diversity: ComponentScore,
    pub ja4_session_hopping: ComponentScore,
    pub ip_rate: ComponentScore,
    pub header_fingerprint: ComponentScore,
    pub tls_anomaly: ComponentScore,
    pub latency_mismatch: ComponentScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_trigger: Option<BlockTrigger>,
    pub total: f64,
}
