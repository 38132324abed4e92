use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_models::metadata::{Ja4Signals, RequestMetadata};

use crate::fingerprint::header_fingerprint;

/// Build the typed metadata record from the inbound request headers. Geo,
/// network, and bot-management context arrives as `cf-*` headers stamped by
/// the edge; absent values stay `None` rather than defaulting to zero.
pub fn extract_request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let snapshot = header_snapshot(headers);
    let fingerprint = header_fingerprint(&snapshot);

    RequestMetadata {
        remote_ip: remote_ip(headers),

        country: header_str(headers, "cf-ipcountry"),
        region: header_str(headers, "cf-region"),
        city: header_str(headers, "cf-ipcity"),
        postal_code: header_str(headers, "cf-postal-code"),
        timezone: header_str(headers, "cf-timezone"),
        latitude: header_parse(headers, "cf-iplatitude"),
        longitude: header_parse(headers, "cf-iplongitude"),
        continent: header_str(headers, "cf-ipcontinent"),
        is_eu_country: header_bool(headers, "cf-is-eu-country"),

        asn: header_parse(headers, "cf-asn"),
        as_organization: header_str(headers, "cf-asorganization"),
        colo: header_str(headers, "cf-colo"),
        http_protocol: header_str(headers, "cf-http-protocol"),
        tls_version: header_str(headers, "cf-tls-version"),
        tls_cipher: header_str(headers, "cf-tls-cipher"),
        client_tcp_rtt: header_parse(headers, "cf-client-tcp-rtt"),
        tls_client_hello_length: header_parse(headers, "cf-tls-client-hello-length"),
        tls_client_extensions_sha1: header_str(headers, "cf-tls-client-extensions-sha1"),
        tls_client_ciphers_sha1: header_str(headers, "cf-tls-client-ciphers-sha1"),

        bot_score: header_parse(headers, "cf-bot-score"),
        client_trust_score: header_parse(headers, "cf-client-trust-score"),
        verified_bot: header_bool(headers, "cf-verified-bot"),
        js_detection_passed: header_bool(headers, "cf-js-detection-passed"),
        device_type: header_str(headers, "cf-device-type"),
        detection_ids: header_str(headers, "cf-detection-ids").map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }),
        ja3_hash: header_str(headers, "cf-ja3-hash"),
        ja4: header_str(headers, "cf-ja4"),
        ja4_signals: header_str(headers, "cf-ja4-signals")
            .and_then(|raw| serde_json::from_str::<Ja4Signals>(&raw).ok()),

        user_agent: header_str(headers, "user-agent"),
        sec_ch_ua: header_str(headers, "sec-ch-ua"),
        sec_ch_ua_mobile: header_str(headers, "sec-ch-ua-mobile"),
        sec_ch_ua_platform: header_str(headers, "sec-ch-ua-platform"),
        sec_ch_ua_platform_version: header_str(headers, "sec-ch-ua-platform-version"),
        sec_ch_ua_model: header_str(headers, "sec-ch-ua-model"),

        sec_fetch_site: header_str(headers, "sec-fetch-site"),
        sec_fetch_mode: header_str(headers, "sec-fetch-mode"),
        sec_fetch_dest: header_str(headers, "sec-fetch-dest"),
        sec_fetch_user: header_str(headers, "sec-fetch-user"),

        headers: snapshot,
        header_fingerprint: fingerprint,
    }
}

/// Canonical remote IP with fixed precedence. Never empty.
fn remote_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip;
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip;
    }
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    "0.0.0.0".to_string()
}

/// All headers except `cookie` and `authorization`, lowercase names.
fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut snapshot = BTreeMap::new();
    for (name, value) in headers.iter() {
        let key = name.as_str().to_lowercase();
        if key == "cookie" || key == "authorization" {
            continue;
        }
        if let Ok(value) = value.to_str() {
            snapshot.insert(key, value.to_string());
        }
    }
    snapshot
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_parse<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    header_str(headers, name).and_then(|s| s.parse().ok())
}

fn header_bool(headers: &HeaderMap, name: &str) -> Option<bool> {
    header_str(headers, name).and_then(|s| match s.as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    })
}

/// Middleware for the operator surface. The analytics and blocklist admin
/// routes require the static operator key in `x-api-key`.
pub async fn operator_auth(
    axum::extract::State(config): axum::extract::State<Arc<AppConfig>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let supplied = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Auth("Missing x-api-key header".to_string()))?;

    if config.operator_api_key.is_empty() || supplied != config.operator_api_key {
        return Err(AppError::Forbidden("Invalid API key".to_string()));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                axum::http::HeaderName::from_str(k).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn ip_precedence() {
        let h = headers(&[
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "10.0.0.3"),
            ("cf-connecting-ip", "203.0.113.7"),
        ]);
        assert_eq!(remote_ip(&h), "203.0.113.7");

        let h = headers(&[
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "10.0.0.3"),
        ]);
        assert_eq!(remote_ip(&h), "10.0.0.3");

        let h = headers(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2")]);
        assert_eq!(remote_ip(&h), "10.0.0.1");

        assert_eq!(remote_ip(&HeaderMap::new()), "0.0.0.0");
    }

    #[test]
    fn snapshot_strips_sensitive_headers() {
        let h = headers(&[
            ("Cookie", "session=abc"),
            ("Authorization", "Bearer tok"),
            ("Accept", "text/html"),
        ]);
        let metadata = extract_request_metadata(&h);
        assert!(!metadata.headers.contains_key("cookie"));
        assert!(!metadata.headers.contains_key("authorization"));
        assert_eq!(metadata.headers.get("accept").unwrap(), "text/html");
    }

    #[test]
    fn fingerprint_invariant_under_reorder() {
        let a = extract_request_metadata(&headers(&[
            ("Accept", "text/html"),
            ("User-Agent", "UnitTest/1.0"),
        ]));
        let b = extract_request_metadata(&headers(&[
            ("user-agent", "UnitTest/1.0"),
            ("accept", "text/html"),
        ]));
        assert_eq!(a.header_fingerprint, b.header_fingerprint);
    }

    #[test]
    fn numeric_fields_missing_stay_none() {
        let metadata = extract_request_metadata(&headers(&[("cf-asn", "garbage")]));
        assert_eq!(metadata.asn, None);
        assert_eq!(metadata.client_tcp_rtt, None);
        assert_eq!(metadata.bot_score, None);
    }

    #[test]
    fn parses_network_and_bot_fields() {
        let metadata = extract_request_metadata(&headers(&[
            ("cf-asn", "13335"),
            ("cf-client-tcp-rtt", "4"),
            ("cf-bot-score", "12"),
            ("cf-verified-bot", "false"),
            ("cf-ja4", "t13d1516h2_8daaf6152771_b0da82dd1658"),
            ("cf-ja4-signals", r#"{"ips_quantile_1h":0.97,"reqs_quantile_1h":0.85}"#),
        ]));
        assert_eq!(metadata.asn, Some(13335));
        assert_eq!(metadata.client_tcp_rtt, Some(4));
        assert_eq!(metadata.bot_score, Some(12));
        assert_eq!(metadata.verified_bot, Some(false));
        let signals = metadata.ja4_signals.unwrap();
        assert_eq!(signals.ips_quantile_1h, Some(0.97));
        assert_eq!(signals.reqs_quantile_1h, Some(0.85));
    }
}
