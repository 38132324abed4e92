use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::{AppConfig, FingerprintConfig};
use shared_database::{sql_timestamp, SupabaseClient};
use shared_utils::test_utils::{test_metadata, TestConfig};
use signal_cell::models::{EmailDecision, FingerprintDetection, Ja4DetectionType};
use signal_cell::services::email::EmailReputationClient;
use signal_cell::services::ephemeral_id::EphemeralIdCollector;
use signal_cell::services::fingerprint::FingerprintCollector;
use signal_cell::services::ip_rate::IpRateCollector;
use signal_cell::services::ja4::Ja4Collector;

fn config_for(db: &MockServer, reputation_url: &str) -> AppConfig {
    TestConfig::with_mock_urls(&db.uri(), "http://unused/siteverify", reputation_url)
        .to_app_config()
}

fn supabase(config: &AppConfig) -> Arc<SupabaseClient> {
    Arc::new(SupabaseClient::new(config))
}

fn count_response(total: i64) -> ResponseTemplate {
    ResponseTemplate::new(206)
        .insert_header("content-range", format!("0-0/{total}").as_str())
        .set_body_json(json!([]))
}

// ---------------------------------------------------------------------------
// Ephemeral id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ephemeral_id_counts_carry_the_plus_one() {
    let db = MockServer::start().await;
    // 1 prior submission in 24h, 2 prior validations in 1h
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("select", "id"))
        .respond_with(count_response(1))
        .mount(&db)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/validation_events"))
        .and(query_param("select", "id"))
        .respond_with(count_response(2))
        .mount(&db)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/validation_events"))
        .and(query_param("select", "remote_ip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"remote_ip": "203.0.113.5"},
            {"remote_ip": "203.0.113.5"},
            {"remote_ip": "198.51.100.7"}
        ])))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector =
        EphemeralIdCollector::new(supabase(&config), config.fraud.ephemeral_id.clone());
    let signal = collector.collect(Some("eph-1")).await;

    assert_eq!(signal.submission_count, 2);
    assert_eq!(signal.validation_count, 3);
    assert_eq!(signal.unique_ip_count, 2);
    // submissions >= 2, validations >= 3, ips >= 2 all warn
    assert_eq!(signal.warnings.len(), 3);
}

#[tokio::test]
async fn ephemeral_id_missing_is_neutral() {
    let db = MockServer::start().await;
    let config = config_for(&db, "http://unused/validate");
    let collector =
        EphemeralIdCollector::new(supabase(&config), config.fraud.ephemeral_id.clone());

    let signal = collector.collect(None).await;
    assert_eq!(signal.submission_count, 1);
    assert_eq!(signal.validation_count, 1);
    assert!(signal.warnings.is_empty());
}

#[tokio::test]
async fn ephemeral_id_fails_open_on_database_error() {
    let db = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector =
        EphemeralIdCollector::new(supabase(&config), config.fraud.ephemeral_id.clone());
    let signal = collector.collect(Some("eph-1")).await;

    assert_eq!(signal.submission_count, 1);
    assert_eq!(signal.validation_count, 1);
    assert_eq!(signal.warnings, vec!["ephemeral id signal degraded"]);
}

// ---------------------------------------------------------------------------
// JA4 session hopping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ja4_rapid_global_detects_session_hopping() {
    let db = MockServer::start().await;
    let now = Utc::now();

    // Three distinct ephemeral ids from three IPs inside five minutes,
    // none on the requester's network
    let events = json!([
        {
            "ephemeral_id": "eph-a",
            "remote_ip": "203.0.113.10",
            "created_at": sql_timestamp(now - Duration::minutes(1)),
            "ja4_signals": {"ips_quantile_1h": 0.97, "reqs_quantile_1h": 0.5}
        },
        {
            "ephemeral_id": "eph-b",
            "remote_ip": "203.0.113.20",
            "created_at": sql_timestamp(now - Duration::minutes(2)),
            "ja4_signals": {"ips_quantile_1h": 0.99, "reqs_quantile_1h": 0.5}
        },
        {
            "ephemeral_id": "eph-c",
            "remote_ip": "203.0.113.30",
            "created_at": sql_timestamp(now - Duration::minutes(3)),
            "ja4_signals": {"ips_quantile_1h": 0.98, "reqs_quantile_1h": 0.5}
        }
    ]);

    Mock::given(method("GET"))
        .and(path("/rest/v1/validation_events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(events))
        .mount(&db)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .respond_with(count_response(3))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector = Ja4Collector::new(supabase(&config), config.fraud.ja4.clone());

    let mut metadata = test_metadata("198.51.100.77");
    metadata.ja4 = Some("t13d1516h2_8daaf6152771_b0da82dd1658".to_string());

    let signal = collector.collect(&metadata, Some("eph-current")).await;

    assert_eq!(signal.detection, Some(Ja4DetectionType::Ja4RapidGlobal));
    // +80 multiple ids, +60 velocity, +50 ips quantile above 0.95
    assert!(signal.raw_score >= 140, "raw was {}", signal.raw_score);
    assert_eq!(signal.rapid_global.ephemeral_id_count, 4);
    // Different /32s, so the subnet cluster only holds the current attempt
    assert_eq!(signal.ip_clustering.ephemeral_id_count, 1);
    assert!(!signal.warnings.is_empty());
}

#[tokio::test]
async fn ja4_missing_fingerprint_is_neutral() {
    let db = MockServer::start().await;
    let config = config_for(&db, "http://unused/validate");
    let collector = Ja4Collector::new(supabase(&config), config.fraud.ja4.clone());

    let mut metadata = test_metadata("198.51.100.77");
    metadata.ja4 = None;

    let signal = collector.collect(&metadata, None).await;
    assert_eq!(signal.raw_score, 0);
    assert!(signal.detection.is_none());
}

// ---------------------------------------------------------------------------
// IP rate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ip_rate_maps_counts_stepwise() {
    let db = MockServer::start().await;
    // 3 prior submissions -> count 4 -> 75
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .respond_with(count_response(3))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector = IpRateCollector::new(supabase(&config), config.fraud.ip_rate.clone());
    let signal = collector.collect("203.0.113.5").await;

    assert_eq!(signal.submission_count, 4);
    assert_eq!(signal.score, 75.0);
    assert_eq!(signal.warnings.len(), 1);
}

#[tokio::test]
async fn ip_rate_fails_open() {
    let db = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector = IpRateCollector::new(supabase(&config), config.fraud.ip_rate.clone());
    let signal = collector.collect("203.0.113.5").await;

    assert_eq!(signal.score, 0.0);
    assert_eq!(signal.warnings, vec!["ip rate signal degraded"]);
}

// ---------------------------------------------------------------------------
// Email reputation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn email_reputation_scales_to_one_hundred() {
    let reputation = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/validate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "valid": true,
            "risk_score": 0.42,
            "decision": "warn",
            "signals": ["disposable_domain"]
        })))
        .expect(1)
        .mount(&reputation)
        .await;

    let db = MockServer::start().await;
    let config = config_for(&db, &format!("{}/validate", reputation.uri()));
    let client = EmailReputationClient::new(&config);

    let signal = client
        .validate("alice@example.com", &test_metadata("203.0.113.5"))
        .await;

    assert!(signal.available);
    assert_eq!(signal.risk_score, Some(42.0));
    assert_eq!(signal.decision, Some(EmailDecision::Warn));
    assert_eq!(signal.signals, vec!["disposable_domain"]);
}

#[tokio::test]
async fn email_reputation_fails_open() {
    let reputation = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&reputation)
        .await;

    let db = MockServer::start().await;
    let config = config_for(&db, &format!("{}/validate", reputation.uri()));
    let client = EmailReputationClient::new(&config);

    let signal = client
        .validate("alice@example.com", &test_metadata("203.0.113.5"))
        .await;

    assert!(!signal.available);
    assert_eq!(signal.risk_score, None);
    assert_eq!(signal.warnings, vec!["email reputation service unavailable"]);
}

// ---------------------------------------------------------------------------
// Fingerprint checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn header_reuse_across_ips_and_ja4s_triggers() {
    let db = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"remote_ip": "203.0.113.10", "ja4": "t13d_aaa"},
            {"remote_ip": "203.0.113.20", "ja4": "t13d_bbb"}
        ])))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector =
        FingerprintCollector::new(supabase(&config), FingerprintConfig::default());

    // No TLS hash on the request, so only the header check consults the db
    let mut metadata = test_metadata("198.51.100.9");
    metadata.ja4 = None;

    let signal = collector.collect(&metadata).await;
    assert!(signal.header_reuse.triggered);
    assert_eq!(signal.header_reuse.score, 100.0);
    assert_eq!(signal.primary, Some(FingerprintDetection::HeaderFingerprint));
}

#[tokio::test]
async fn unknown_tls_pair_on_established_ja4_triggers() {
    let db = MockServer::start().await;
    // Header-reuse rows: nothing
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("select", "remote_ip,ja4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&db)
        .await;
    // The (extension hash, JA4) pair has never been seen
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("tls_client_extensions_sha1", "eq.ext-abc"))
        .respond_with(count_response(0))
        .mount(&db)
        .await;
    // ...but the JA4 itself is well observed
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("ja4", "eq.t13d_known"))
        .respond_with(count_response(9))
        .mount(&db)
        .await;
    // Baseline learning for the clean header check
    Mock::given(method("GET"))
        .and(path("/rest/v1/fingerprint_baselines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&db)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/fingerprint_baselines"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector =
        FingerprintCollector::new(supabase(&config), FingerprintConfig::default());

    let mut metadata = test_metadata("198.51.100.9");
    metadata.ja4 = Some("t13d_known".to_string());
    metadata.tls_client_extensions_sha1 = Some("ext-abc".to_string());

    let signal = collector.collect(&metadata).await;
    assert!(signal.tls_anomaly.triggered);
    assert_eq!(signal.tls_anomaly.score, 80.0);
    assert_eq!(signal.tls_anomaly.ja4_observations, 9);
    assert_eq!(signal.primary, Some(FingerprintDetection::TlsAnomaly));
}

#[tokio::test]
async fn known_tls_pair_updates_its_baseline() {
    let db = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("select", "remote_ip,ja4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&db)
        .await;
    // The pair is already known, so no trigger regardless of volume
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("tls_client_extensions_sha1", "eq.ext-abc"))
        .respond_with(count_response(4))
        .mount(&db)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .and(query_param("ja4", "eq.t13d_known"))
        .respond_with(count_response(50))
        .mount(&db)
        .await;
    // Existing baseline rows get their hit counters bumped
    Mock::given(method("GET"))
        .and(path("/rest/v1/fingerprint_baselines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "hit_count": 7}
        ])))
        .mount(&db)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/fingerprint_baselines"))
        .and(query_param("id", "eq.3"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2) // header baseline + tls_pair baseline
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector =
        FingerprintCollector::new(supabase(&config), FingerprintConfig::default());

    let mut metadata = test_metadata("198.51.100.9");
    metadata.ja4 = Some("t13d_known".to_string());
    metadata.tls_client_extensions_sha1 = Some("ext-abc".to_string());

    let signal = collector.collect(&metadata).await;
    assert!(!signal.tls_anomaly.triggered);
    assert!(signal.primary.is_none());
}

#[tokio::test]
async fn clean_fingerprint_learns_a_baseline() {
    let db = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/submissions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&db)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/fingerprint_baselines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&db)
        .await;
    // First sighting inserts the baseline row
    Mock::given(method("POST"))
        .and(path("/rest/v1/fingerprint_baselines"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&db)
        .await;

    let config = config_for(&db, "http://unused/validate");
    let collector =
        FingerprintCollector::new(supabase(&config), FingerprintConfig::default());

    let mut metadata = test_metadata("198.51.100.9");
    metadata.ja4 = None;

    let signal = collector.collect(&metadata).await;
    assert!(!signal.header_reuse.triggered);
    assert!(signal.primary.is_none());
}
