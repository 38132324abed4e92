use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use shared_config::Ja4Config;
use shared_database::{parse_timestamp, window_start, SupabaseClient};
use shared_models::metadata::{Ja4Signals, RequestMetadata};

use crate::models::{Ja4Analysis, Ja4DetectionType, Ja4Signal};

#[derive(Debug, Default, Deserialize)]
struct Ja4EventRow {
    ephemeral_id: Option<String>,
    remote_ip: Option<String>,
    created_at: String,
    ja4_signals: Option<Ja4Signals>,
}

/// Session-hopping detection: three layered looks at the validation stream
/// sharing the request's JA4 fingerprint.
pub struct Ja4Collector {
    supabase: Arc<SupabaseClient>,
    config: Ja4Config,
}

impl Ja4Collector {
    pub fn new(supabase: Arc<SupabaseClient>, config: Ja4Config) -> Self {
        Self { supabase, config }
    }

    pub async fn collect(
        &self,
        metadata: &RequestMetadata,
        current_ephemeral_id: Option<&str>,
    ) -> Ja4Signal {
        let Some(ja4) = metadata.ja4.as_deref() else {
            return Ja4Signal::neutral();
        };

        match self.analyze(ja4, metadata, current_ephemeral_id).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!("JA4 signal degraded: {}", e);
                let mut signal = Ja4Signal::neutral();
                signal.warnings.push("ja4 signal degraded".to_string());
                signal
            }
        }
    }

    async fn analyze(
        &self,
        ja4: &str,
        metadata: &RequestMetadata,
        current_ephemeral_id: Option<&str>,
    ) -> Result<Ja4Signal> {
        let widest_minutes = self
            .config
            .extended_global_window_minutes
            .max(self.config.cluster_window_minutes);
        let since = window_start(widest_minutes * 60);

        let events: Vec<Ja4EventRow> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/validation_events?ja4=eq.{ja4}&created_at=gte.{since}&select=ephemeral_id,remote_ip,created_at,ja4_signals"
                ),
                None,
            )
            .await?;

        let now = Utc::now();
        let cluster_cutoff = now - Duration::minutes(self.config.cluster_window_minutes);
        let rapid_cutoff = now - Duration::minutes(self.config.rapid_global_window_minutes);
        let extended_cutoff = now - Duration::minutes(self.config.extended_global_window_minutes);

        let in_window = |event: &&Ja4EventRow, cutoff: DateTime<Utc>| {
            parse_timestamp(&event.created_at)
                .map(|ts| ts >= cutoff)
                .unwrap_or(false)
        };

        let cluster_events: Vec<&Ja4EventRow> = events
            .iter()
            .filter(|e| in_window(e, cluster_cutoff))
            .filter(|e| {
                e.remote_ip
                    .as_deref()
                    .map(|ip| same_network(ip, &metadata.remote_ip))
                    .unwrap_or(false)
            })
            .collect();
        let rapid_events: Vec<&Ja4EventRow> =
            events.iter().filter(|e| in_window(e, rapid_cutoff)).collect();
        let extended_events: Vec<&Ja4EventRow> = events
            .iter()
            .filter(|e| in_window(e, extended_cutoff))
            .collect();

        let ip_clustering = self
            .build_analysis(
                ja4,
                &cluster_events,
                self.config.cluster_window_minutes,
                metadata,
                current_ephemeral_id,
            )
            .await?;
        let rapid_global = self
            .build_analysis(
                ja4,
                &rapid_events,
                self.config.rapid_global_window_minutes,
                metadata,
                current_ephemeral_id,
            )
            .await?;
        let extended_global = self
            .build_analysis(
                ja4,
                &extended_events,
                self.config.extended_global_window_minutes,
                metadata,
                current_ephemeral_id,
            )
            .await?;

        // First triggering layer wins the detection label: subnet
        // clustering is the most specific, the extended window the least
        let detection = if ip_clustering.ephemeral_id_count >= 2 {
            Some(Ja4DetectionType::Ja4IpClustering)
        } else if rapid_global.ephemeral_id_count >= 2 {
            Some(Ja4DetectionType::Ja4RapidGlobal)
        } else if extended_global.ephemeral_id_count >= 2 {
            Some(Ja4DetectionType::Ja4ExtendedGlobal)
        } else {
            None
        };

        let triggering = match detection {
            Some(Ja4DetectionType::Ja4IpClustering) => &ip_clustering,
            Some(Ja4DetectionType::Ja4RapidGlobal) => &rapid_global,
            Some(Ja4DetectionType::Ja4ExtendedGlobal) => &extended_global,
            None => &extended_global,
        };

        let mut raw_score: u32 = 0;
        let mut warnings = Vec::new();

        if let Some(detection) = detection {
            raw_score += 80;
            warnings.push(format!(
                "{} distinct ephemeral ids share this JA4 ({})",
                triggering.ephemeral_id_count,
                detection.as_str()
            ));

            if triggering.time_span_minutes < self.config.velocity_threshold_minutes as f64 {
                raw_score += 60;
                warnings.push(format!(
                    "ephemeral ids rotated within {:.1} minutes",
                    triggering.time_span_minutes
                ));
            }
            if triggering
                .avg_ips_quantile_1h
                .map(|q| q > self.config.ips_quantile_threshold)
                .unwrap_or(false)
            {
                raw_score += 50;
                warnings.push("JA4 IP-spread quantile above threshold".to_string());
            }
            if triggering
                .avg_reqs_quantile_1h
                .map(|q| q > self.config.reqs_quantile_threshold)
                .unwrap_or(false)
            {
                raw_score += 40;
                warnings.push("JA4 request-volume quantile above threshold".to_string());
            }
        }

        debug!(
            ja4 = ja4,
            raw_score = raw_score,
            detection = ?detection,
            "ja4 signal collected"
        );

        Ok(Ja4Signal {
            raw_score,
            detection,
            ip_clustering,
            rapid_global,
            extended_global,
            warnings,
        })
    }

    async fn build_analysis(
        &self,
        ja4: &str,
        events: &[&Ja4EventRow],
        window_minutes: i64,
        metadata: &RequestMetadata,
        current_ephemeral_id: Option<&str>,
    ) -> Result<Ja4Analysis> {
        let mut ephemeral_ids: HashSet<&str> = events
            .iter()
            .filter_map(|e| e.ephemeral_id.as_deref())
            .collect();
        if let Some(current) = current_ephemeral_id {
            ephemeral_ids.insert(current);
        }

        let timestamps: Vec<DateTime<Utc>> = events
            .iter()
            .filter_map(|e| parse_timestamp(&e.created_at))
            .collect();
        let time_span_minutes = match (timestamps.iter().min(), timestamps.iter().max()) {
            (Some(min), Some(max)) if min < max => (*max - *min).num_seconds() as f64 / 60.0,
            _ => 0.0,
        };

        let quantiles: Vec<&Ja4Signals> =
            events.iter().filter_map(|e| e.ja4_signals.as_ref()).collect();
        let (avg_ips, avg_reqs) = if quantiles.is_empty() {
            // No stored vectors in the window; fall back to the live one
            (
                metadata.ja4_signals.as_ref().and_then(|s| s.ips_quantile_1h),
                metadata.ja4_signals.as_ref().and_then(|s| s.reqs_quantile_1h),
            )
        } else {
            (
                average(quantiles.iter().filter_map(|s| s.ips_quantile_1h)),
                average(quantiles.iter().filter_map(|s| s.reqs_quantile_1h)),
            )
        };

        let since = window_start(window_minutes * 60);
        let submission_count = self
            .supabase
            .count(&format!(
                "/rest/v1/submissions?ja4=eq.{ja4}&created_at=gte.{since}&select=id"
            ))
            .await?;

        Ok(Ja4Analysis {
            ephemeral_id_count: ephemeral_ids.len() as i64,
            submission_count,
            time_span_minutes,
            avg_ips_quantile_1h: avg_ips,
            avg_reqs_quantile_1h: avg_reqs,
        })
    }
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// IPv4 compares exact; IPv6 compares the /64 prefix after canonicalizing
/// through `std::net`, so shorthand and expanded forms match. Unparseable
/// addresses fall back to string equality.
fn same_network(a: &str, b: &str) -> bool {
    match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(IpAddr::V4(x)), Ok(IpAddr::V4(y))) => x == y,
        (Ok(IpAddr::V6(x)), Ok(IpAddr::V6(y))) => x.segments()[..4] == y.segments()[..4],
        _ => a == b,
    }
}
