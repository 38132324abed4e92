use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::FingerprintConfig;
use shared_database::{sql_timestamp, window_start, SupabaseClient};
use shared_models::metadata::RequestMetadata;

use crate::models::{
    FingerprintDetection, FingerprintSignal, HeaderReuseCheck, LatencyCheck, TlsAnomalyCheck,
};

const HEADER_REUSE_SCORE: f64 = 100.0;
const TLS_ANOMALY_SCORE: f64 = 80.0;
const LATENCY_MISMATCH_SCORE: f64 = 80.0;

/// Sentinel buckets for baseline dimensions that are absent on a request.
const ANY_BUCKET: &str = "ANY";
const NO_ASN: i64 = -1;

#[derive(Debug, Default, Deserialize)]
struct ReuseRow {
    remote_ip: Option<String>,
    ja4: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BaselineRow {
    id: Option<i64>,
    #[serde(default)]
    hit_count: i64,
}

/// Three independent anomaly checks over the request fingerprint. Clean
/// observations teach the baselines; threshold crossings trigger.
pub struct FingerprintCollector {
    supabase: Arc<SupabaseClient>,
    config: FingerprintConfig,
}

impl FingerprintCollector {
    pub fn new(supabase: Arc<SupabaseClient>, config: FingerprintConfig) -> Self {
        Self { supabase, config }
    }

    pub async fn collect(&self, metadata: &RequestMetadata) -> FingerprintSignal {
        let header_reuse = match self.check_header_reuse(metadata).await {
            Ok(check) => check,
            Err(e) => {
                warn!("Header-reuse check degraded: {}", e);
                HeaderReuseCheck::default()
            }
        };
        let tls_anomaly = match self.check_tls_anomaly(metadata).await {
            Ok(check) => check,
            Err(e) => {
                warn!("TLS-anomaly check degraded: {}", e);
                TlsAnomalyCheck::default()
            }
        };
        let latency = self.check_latency(metadata);

        let mut warnings = Vec::new();
        if header_reuse.triggered {
            warnings.push(format!(
                "header fingerprint reused across {} submissions / {} IPs / {} JA4s",
                header_reuse.submission_count,
                header_reuse.distinct_ip_count,
                header_reuse.distinct_ja4_count
            ));
        }
        if tls_anomaly.triggered {
            warnings.push(format!(
                "unknown TLS extension hash for a JA4 with {} observations",
                tls_anomaly.ja4_observations
            ));
        }
        if latency.triggered {
            warnings.push(format!(
                "mobile claim with {}ms RTT from {} device",
                latency.rtt_ms.unwrap_or(0),
                latency.device_type.as_deref().unwrap_or("unknown")
            ));
        }

        // Highest score wins the primary slot; ties resolve toward the
        // stronger corroborated check
        let mut candidates: Vec<(f64, FingerprintDetection)> = Vec::new();
        if header_reuse.triggered {
            candidates.push((header_reuse.score, FingerprintDetection::HeaderFingerprint));
        }
        if tls_anomaly.triggered {
            candidates.push((tls_anomaly.score, FingerprintDetection::TlsAnomaly));
        }
        if latency.triggered {
            candidates.push((latency.score, FingerprintDetection::LatencyMismatch));
        }
        let primary = candidates
            .into_iter()
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(_, detection)| detection);

        FingerprintSignal {
            header_reuse,
            tls_anomaly,
            latency,
            primary,
            warnings,
        }
    }

    /// Same header fingerprint reappearing from several IPs with several
    /// JA4s inside the window reads as a replayed browser profile.
    async fn check_header_reuse(&self, metadata: &RequestMetadata) -> Result<HeaderReuseCheck> {
        let since = window_start(self.config.window_minutes * 60);
        let rows: Vec<ReuseRow> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/submissions?header_fingerprint=eq.{}&created_at=gte.{since}&select=remote_ip,ja4",
                    metadata.header_fingerprint
                ),
                None,
            )
            .await?;

        let submission_count = rows.len() as i64;
        let distinct_ip_count = rows
            .iter()
            .filter_map(|r| r.remote_ip.as_deref())
            .collect::<HashSet<_>>()
            .len() as i64;
        let distinct_ja4_count = rows
            .iter()
            .filter_map(|r| r.ja4.as_deref())
            .collect::<HashSet<_>>()
            .len() as i64;

        let triggered = submission_count >= self.config.min_submissions
            && distinct_ip_count >= self.config.min_distinct_ips
            && distinct_ja4_count >= self.config.min_distinct_ja4;

        if !triggered {
            self.upsert_baseline("header", &metadata.header_fingerprint, metadata)
                .await;
        }

        Ok(HeaderReuseCheck {
            score: if triggered { HEADER_REUSE_SCORE } else { 0.0 },
            submission_count,
            distinct_ip_count,
            distinct_ja4_count,
            triggered,
        })
    }

    /// A TLS extension hash never seen with a well-observed JA4 means the
    /// ClientHello was likely forged to borrow the fingerprint.
    async fn check_tls_anomaly(&self, metadata: &RequestMetadata) -> Result<TlsAnomalyCheck> {
        let (Some(ext_hash), Some(ja4)) =
            (metadata.tls_client_extensions_sha1.as_deref(), metadata.ja4.as_deref())
        else {
            return Ok(TlsAnomalyCheck::default());
        };

        let since = window_start(self.config.baseline_hours * 3600);
        let pair_observations = self
            .supabase
            .count(&format!(
                "/rest/v1/submissions?tls_client_extensions_sha1=eq.{ext_hash}&ja4=eq.{ja4}&created_at=gte.{since}&select=id"
            ))
            .await?;
        let ja4_observations = self
            .supabase
            .count(&format!(
                "/rest/v1/submissions?ja4=eq.{ja4}&created_at=gte.{since}&select=id"
            ))
            .await?;

        let triggered =
            pair_observations == 0 && ja4_observations >= self.config.min_ja4_observations;

        if !triggered {
            self.upsert_baseline("tls_pair", ext_hash, metadata).await;
        }

        Ok(TlsAnomalyCheck {
            score: if triggered { TLS_ANOMALY_SCORE } else { 0.0 },
            ja4_observations,
            pair_observations,
            triggered,
        })
    }

    /// A client claiming a mobile platform over a data-center-grade RTT is
    /// not holding a phone. RTT at the threshold counts (<=).
    fn check_latency(&self, metadata: &RequestMetadata) -> LatencyCheck {
        let claimed_mobile = metadata.claims_mobile();
        let datacenter_asn = metadata
            .asn
            .map(|asn| self.config.datacenter_asns.contains(&asn))
            .unwrap_or(false);
        let device_not_mobile = metadata
            .device_type
            .as_deref()
            .map(|d| !d.eq_ignore_ascii_case("mobile"))
            .unwrap_or(false);

        let triggered = claimed_mobile
            && metadata
                .client_tcp_rtt
                .map(|rtt| rtt <= self.config.mobile_rtt_threshold_ms)
                .unwrap_or(false)
            && (device_not_mobile || datacenter_asn);

        LatencyCheck {
            score: if triggered { LATENCY_MISMATCH_SCORE } else { 0.0 },
            claimed_mobile,
            rtt_ms: metadata.client_tcp_rtt,
            device_type: metadata.device_type.clone(),
            datacenter_asn,
            triggered,
        }
    }

    /// Teach the anomaly detector what normal looks like for this
    /// (type, key, JA4, ASN) tuple. Read-then-write; the increment is
    /// idempotent enough for a learning counter and never fails the
    /// request.
    async fn upsert_baseline(&self, fingerprint_type: &str, key: &str, metadata: &RequestMetadata) {
        let ja4_bucket = metadata.ja4.as_deref().unwrap_or(ANY_BUCKET);
        let asn_bucket = metadata.asn.map(i64::from).unwrap_or(NO_ASN);

        let path = format!(
            "/rest/v1/fingerprint_baselines?fingerprint_type=eq.{fingerprint_type}&fingerprint_key=eq.{key}&ja4=eq.{ja4_bucket}&asn=eq.{asn_bucket}"
        );

        let result: Result<Vec<BaselineRow>> =
            self.supabase.request(Method::GET, &path, None).await;

        let outcome = match result {
            Ok(rows) => match rows.into_iter().next() {
                Some(BaselineRow { id: Some(id), hit_count }) => {
                    self.supabase
                        .request::<Value>(
                            Method::PATCH,
                            &format!("/rest/v1/fingerprint_baselines?id=eq.{id}"),
                            Some(json!({
                                "hit_count": hit_count + 1,
                                "last_seen": sql_timestamp(chrono::Utc::now()),
                            })),
                        )
                        .await
                        .map(|_| ())
                }
                _ => self
                    .supabase
                    .request::<Value>(
                        Method::POST,
                        "/rest/v1/fingerprint_baselines",
                        Some(json!({
                            "fingerprint_type": fingerprint_type,
                            "fingerprint_key": key,
                            "ja4": ja4_bucket,
                            "asn": asn_bucket,
                            "hit_count": 1,
                            "last_seen": sql_timestamp(chrono::Utc::now()),
                        })),
                    )
                    .await
                    .map(|_| ()),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => debug!(
                fingerprint_type = fingerprint_type,
                "fingerprint baseline learned"
            ),
            Err(e) => warn!("Baseline upsert failed: {}", e),
        }
    }
}
