use serde::Deserialize;

/// Tunables for the risk pipeline. Every section deserializes over its
/// defaults so the `FRAUD_CONFIG` env override can be partial.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FraudConfig {
    pub block_threshold: f64,
    pub weights: ScoringWeights,
    pub ephemeral_id: EphemeralIdConfig,
    pub ja4: Ja4Config,
    pub ip_rate: IpRateConfig,
    pub fingerprint: FingerprintConfig,
    /// Progressive block durations in seconds, indexed by offense count.
    pub timeout_schedule: Vec<u64>,
    pub default_country_prefix: String,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            block_threshold: 60.0,
            weights: ScoringWeights::default(),
            ephemeral_id: EphemeralIdConfig::default(),
            ja4: Ja4Config::default(),
            ip_rate: IpRateConfig::default(),
            fingerprint: FingerprintConfig::default(),
            timeout_schedule: vec![3600, 14400, 28800, 43200, 86400],
            default_country_prefix: "+1".to_string(),
        }
    }
}

/// Component weights. The six primary weights sum to 1.0; the ip-rate and
/// fingerprint components default to 0.0 and act through block-trigger
/// floors unless a deployment assigns them real weight.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringWeights {
    pub token_replay: f64,
    pub email_fraud: f64,
    pub ephemeral_id: f64,
    pub validation_frequency: f64,
    pub ip_diversity: f64,
    pub ja4_session_hopping: f64,
    pub ip_rate: f64,
    pub header_fingerprint: f64,
    pub tls_anomaly: f64,
    pub latency_mismatch: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            token_replay: 0.35,
            email_fraud: 0.17,
            ephemeral_id: 0.18,
            validation_frequency: 0.13,
            ip_diversity: 0.09,
            ja4_session_hopping: 0.08,
            ip_rate: 0.0,
            header_fingerprint: 0.0,
            tls_anomaly: 0.0,
            latency_mismatch: 0.0,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.token_replay
            + self.email_fraud
            + self.ephemeral_id
            + self.validation_frequency
            + self.ip_diversity
            + self.ja4_session_hopping
            + self.ip_rate
            + self.header_fingerprint
            + self.tls_anomaly
            + self.latency_mismatch
    }

    /// The weight table must stay normalized; a sum above 1.0 would let the
    /// weighted base exceed 100.
    pub fn validate(&self) -> Result<(), String> {
        let sum = self.sum();
        if sum > 1.0 + 1e-9 {
            return Err(format!("scoring weights sum to {sum}, must be <= 1.0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EphemeralIdConfig {
    pub submission_threshold: i64,
    pub validation_warn_threshold: i64,
    pub validation_block_threshold: i64,
    pub ip_diversity_threshold: i64,
}

impl Default for EphemeralIdConfig {
    fn default() -> Self {
        Self {
            submission_threshold: 2,
            validation_warn_threshold: 2,
            validation_block_threshold: 3,
            ip_diversity_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Ja4Config {
    pub cluster_window_minutes: i64,
    pub rapid_global_window_minutes: i64,
    pub extended_global_window_minutes: i64,
    pub velocity_threshold_minutes: i64,
    pub ips_quantile_threshold: f64,
    pub reqs_quantile_threshold: f64,
}

impl Default for Ja4Config {
    fn default() -> Self {
        Self {
            cluster_window_minutes: 60,
            rapid_global_window_minutes: 5,
            extended_global_window_minutes: 60,
            velocity_threshold_minutes: 10,
            ips_quantile_threshold: 0.95,
            reqs_quantile_threshold: 0.99,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IpRateConfig {
    pub window_seconds: i64,
}

impl Default for IpRateConfig {
    fn default() -> Self {
        Self {
            window_seconds: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FingerprintConfig {
    pub window_minutes: i64,
    pub min_submissions: i64,
    pub min_distinct_ips: i64,
    pub min_distinct_ja4: i64,
    pub baseline_hours: i64,
    pub min_ja4_observations: i64,
    pub mobile_rtt_threshold_ms: u32,
    pub datacenter_asns: Vec<u32>,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            min_submissions: 2,
            min_distinct_ips: 2,
            min_distinct_ja4: 2,
            baseline_hours: 24,
            min_ja4_observations: 5,
            mobile_rtt_threshold_ms: 10,
            datacenter_asns: vec![
                13335, // Cloudflare
                14061, // DigitalOcean
                16509, // Amazon
                14618, // Amazon
                15169, // Google
                8075,  // Microsoft
                20473, // Vultr
                63949, // Linode
                24940, // Hetzner
                16276, // OVH
            ],
        }
    }
}
