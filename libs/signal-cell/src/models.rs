use serde::{Deserialize, Serialize};

/// Reputation-service verdict for an email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailDecision {
    Allow,
    Warn,
    Block,
}

/// Email-fraud signal. `risk_score` is already scaled to 0..100. When the
/// reputation service is unreachable the signal is absent, never zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailFraudSignal {
    pub available: bool,
    pub valid: Option<bool>,
    pub risk_score: Option<f64>,
    pub decision: Option<EmailDecision>,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl EmailFraudSignal {
    pub fn unavailable(warning: Option<String>) -> Self {
        Self {
            available: false,
            warnings: warning.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_block(&self) -> bool {
        self.decision == Some(EmailDecision::Block)
    }
}

/// Counters around the CAPTCHA ephemeral id. Counts include the current
/// attempt (the "+1" convention), so a first-time visitor scores 1/1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralIdSignal {
    pub ephemeral_id: Option<String>,
    pub submission_count: i64,
    pub validation_count: i64,
    pub unique_ip_count: i64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl EphemeralIdSignal {
    pub fn neutral(ephemeral_id: Option<String>) -> Self {
        Self {
            ephemeral_id,
            submission_count: 1,
            validation_count: 1,
            unique_ip_count: 1,
            warnings: Vec::new(),
        }
    }
}

/// Which JA4 analysis layer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ja4DetectionType {
    Ja4IpClustering,
    Ja4RapidGlobal,
    Ja4ExtendedGlobal,
}

impl Ja4DetectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ja4DetectionType::Ja4IpClustering => "ja4_ip_clustering",
            Ja4DetectionType::Ja4RapidGlobal => "ja4_rapid_global",
            Ja4DetectionType::Ja4ExtendedGlobal => "ja4_extended_global",
        }
    }
}

/// One windowed view over the events sharing a JA4 fingerprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ja4Analysis {
    /// Distinct ephemeral ids observed, current attempt included.
    pub ephemeral_id_count: i64,
    pub submission_count: i64,
    /// Minutes between the oldest and newest matched event.
    pub time_span_minutes: f64,
    pub avg_ips_quantile_1h: Option<f64>,
    pub avg_reqs_quantile_1h: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ja4Signal {
    /// Composite session-hopping score, 0..230.
    pub raw_score: u32,
    pub detection: Option<Ja4DetectionType>,
    pub ip_clustering: Ja4Analysis,
    pub rapid_global: Ja4Analysis,
    pub extended_global: Ja4Analysis,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Ja4Signal {
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// Stepwise submission-rate signal for the remote IP. Never a standalone
/// block trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpRateSignal {
    /// Submissions in the window, current attempt included.
    pub submission_count: i64,
    pub score: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl IpRateSignal {
    pub fn neutral() -> Self {
        Self {
            submission_count: 1,
            score: 0.0,
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderReuseCheck {
    pub score: f64,
    pub submission_count: i64,
    pub distinct_ip_count: i64,
    pub distinct_ja4_count: i64,
    pub triggered: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsAnomalyCheck {
    pub score: f64,
    pub ja4_observations: i64,
    pub pair_observations: i64,
    pub triggered: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyCheck {
    pub score: f64,
    pub claimed_mobile: bool,
    pub rtt_ms: Option<u32>,
    pub device_type: Option<String>,
    pub datacenter_asn: bool,
    pub triggered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintDetection {
    HeaderFingerprint,
    TlsAnomaly,
    LatencyMismatch,
}

impl FingerprintDetection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintDetection::HeaderFingerprint => "header_fingerprint",
            FingerprintDetection::TlsAnomaly => "tls_anomaly",
            FingerprintDetection::LatencyMismatch => "latency_mismatch",
        }
    }
}

/// The three fingerprint sub-checks plus the elected primary trigger. At
/// most one primary survives so a single detection type can be attached to
/// the submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FingerprintSignal {
    pub header_reuse: HeaderReuseCheck,
    pub tls_anomaly: TlsAnomalyCheck,
    pub latency: LatencyCheck,
    pub primary: Option<FingerprintDetection>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FingerprintSignal {
    pub fn neutral() -> Self {
        Self::default()
    }
}

/// Everything the scoring engine consumes, produced by one concurrent
/// collection pass.
#[derive(Debug, Clone)]
pub struct SignalBundle {
    pub email: EmailFraudSignal,
    pub ephemeral: EphemeralIdSignal,
    pub ja4: Ja4Signal,
    pub ip_rate: IpRateSignal,
    pub fingerprint: FingerprintSignal,
}

impl SignalBundle {
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        warnings.extend(self.email.warnings.iter().cloned());
        warnings.extend(self.ephemeral.warnings.iter().cloned());
        warnings.extend(self.ja4.warnings.iter().cloned());
        warnings.extend(self.ip_rate.warnings.iter().cloned());
        warnings.extend(self.fingerprint.warnings.iter().cloned());
        warnings
    }
}
