use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Typed snapshot of the per-request identity signals. One of these is
/// built per inbound submission and flows unchanged through signal
/// collection, scoring, and persistence (flattened into the stored rows).
///
/// Missing numeric inputs stay `None`; they are never coerced to zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Canonical remote IP. Never empty: extraction falls back to "0.0.0.0".
    pub remote_ip: String,

    // Geography
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub timezone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub continent: Option<String>,
    pub is_eu_country: Option<bool>,

    // Network
    pub asn: Option<u32>,
    pub as_organization: Option<String>,
    pub colo: Option<String>,
    pub http_protocol: Option<String>,
    pub tls_version: Option<String>,
    pub tls_cipher: Option<String>,
    pub client_tcp_rtt: Option<u32>,
    pub tls_client_hello_length: Option<u32>,
    pub tls_client_extensions_sha1: Option<String>,
    pub tls_client_ciphers_sha1: Option<String>,

    // Bot management
    pub bot_score: Option<u32>,
    pub client_trust_score: Option<u32>,
    pub verified_bot: Option<bool>,
    pub js_detection_passed: Option<bool>,
    /// Device class as judged by bot management, e.g. "desktop" / "mobile".
    pub device_type: Option<String>,
    pub detection_ids: Option<Vec<String>>,
    pub ja3_hash: Option<String>,
    pub ja4: Option<String>,
    pub ja4_signals: Option<Ja4Signals>,

    // Client hints
    pub user_agent: Option<String>,
    pub sec_ch_ua: Option<String>,
    pub sec_ch_ua_mobile: Option<String>,
    pub sec_ch_ua_platform: Option<String>,
    pub sec_ch_ua_platform_version: Option<String>,
    pub sec_ch_ua_model: Option<String>,

    // Fetch metadata
    pub sec_fetch_site: Option<String>,
    pub sec_fetch_mode: Option<String>,
    pub sec_fetch_dest: Option<String>,
    pub sec_fetch_user: Option<String>,

    /// All request headers except `cookie` and `authorization`, with
    /// lowercase names. Sorted by key so snapshots are stable.
    pub headers: BTreeMap<String, String>,
    /// FNV-1a fingerprint of the header set, hex encoded.
    pub header_fingerprint: String,
}

impl RequestMetadata {
    pub fn claims_mobile(&self) -> bool {
        self.sec_ch_ua_mobile.as_deref() == Some("?1")
            || self
                .user_agent
                .as_deref()
                .map(|ua| {
                    let ua = ua.to_lowercase();
                    ua.contains("android") || ua.contains("iphone") || ua.contains("mobile")
                })
                .unwrap_or(false)
    }
}

/// Upstream-provided global statistics about a JA4 fingerprint. Quantiles
/// are in [0, 1]; higher means the fingerprint is busier than that share of
/// all fingerprints seen in the last hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ja4Signals {
    #[serde(default)]
    pub ips_quantile_1h: Option<f64>,
    #[serde(default)]
    pub reqs_quantile_1h: Option<f64>,
    #[serde(default)]
    pub ips_rank_1h: Option<f64>,
    #[serde(default)]
    pub reqs_rank_1h: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_mobile_from_client_hint() {
        let metadata = RequestMetadata {
            sec_ch_ua_mobile: Some("?1".to_string()),
            ..Default::default()
        };
        assert!(metadata.claims_mobile());
    }

    #[test]
    fn claims_mobile_from_user_agent() {
        let metadata = RequestMetadata {
            user_agent: Some("Mozilla/5.0 (Linux; Android 14) Mobile".to_string()),
            ..Default::default()
        };
        assert!(metadata.claims_mobile());

        let desktop = RequestMetadata {
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_string()),
            ..Default::default()
        };
        assert!(!desktop.claims_mobile());
    }

    #[test]
    fn metadata_round_trips_through_json() {
        let metadata = RequestMetadata {
            remote_ip: "203.0.113.9".to_string(),
            asn: Some(13335),
            ja4_signals: Some(Ja4Signals {
                ips_quantile_1h: Some(0.97),
                ..Default::default()
            }),
            ..Default::default()
        };
        let json = serde_json::to_string(&metadata).unwrap();
        let back: RequestMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.remote_ip, "203.0.113.9");
        assert_eq!(back.asn, Some(13335));
        assert_eq!(back.ja4_signals.unwrap().ips_quantile_1h, Some(0.97));
    }
}
