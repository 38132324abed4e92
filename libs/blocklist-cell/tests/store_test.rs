use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use blocklist_cell::models::{AddBlockParams, BlocklistError, Confidence};
use blocklist_cell::services::store::BlocklistStore;
use shared_database::{sql_timestamp, SupabaseClient};
use shared_utils::test_utils::TestConfig;

const TABLE_PATH: &str = "/rest/v1/blocklist_entries";

async fn store_for(server: &MockServer) -> BlocklistStore {
    let config = TestConfig::with_mock_urls(
        &server.uri(),
        "http://unused/siteverify",
        "http://unused/validate",
    )
    .to_app_config();
    BlocklistStore::new(Arc::new(SupabaseClient::new(&config)))
}

fn entry_row(expires_at: &str) -> serde_json::Value {
    json!({
        "id": 7,
        "email": null,
        "ephemeral_id": "eph-123",
        "remote_ip": "203.0.113.5",
        "ja4": null,
        "reason": "risk threshold exceeded",
        "confidence": "high",
        "detection_type": "ephemeral_id_fraud",
        "blocked_at": "2025-01-01 00:00:00",
        "expires_at": expires_at,
        "submission_count": 2,
        "risk_score": 82.5,
        "risk_breakdown": null,
        "detection_metadata": null,
        "erfid": "erf_prior"
    })
}

#[tokio::test]
async fn check_returns_clean_when_no_entry_matches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let check = store
        .check(Some("eph-123"), "203.0.113.5", None, None)
        .await
        .unwrap();

    assert!(!check.blocked);
    assert!(check.entry.is_none());
    assert_eq!(check.retry_after, 0);
}

#[tokio::test]
async fn check_hit_returns_entry_and_bumps_counter() {
    let server = MockServer::start().await;
    let expires_at = sql_timestamp(Utc::now() + Duration::hours(2));

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([entry_row(&expires_at)])))
        .mount(&server)
        .await;
    // The hit path PATCHes submission_count to current + 1
    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let check = store
        .check(Some("eph-123"), "203.0.113.5", None, None)
        .await
        .unwrap();

    assert!(check.blocked);
    assert_eq!(check.confidence, Some(Confidence::High));
    assert_eq!(check.reason.as_deref(), Some("risk threshold exceeded"));
    // Roughly two hours left
    assert!(check.retry_after > 7000 && check.retry_after <= 7200);
    assert!(check.expires_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn check_excludes_duplicate_email_tracking_entries() {
    let server = MockServer::start().await;
    // The lookup must ask the database to skip occurrence trackers; a
    // low-confidence duplicate_email row alone therefore yields no match
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param(
            "not.and",
            "(confidence.eq.low,detection_type.eq.duplicate_email)",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let check = store
        .check(None, "203.0.113.5", None, Some("bob@example.com"))
        .await
        .unwrap();

    assert!(!check.blocked);
    assert!(check.entry.is_none());
}

#[tokio::test]
async fn add_requires_an_identifier() {
    let server = MockServer::start().await;
    let store = store_for(&server).await;

    let result = store
        .add(AddBlockParams {
            reason: "test".to_string(),
            expires_in: 3600,
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(BlocklistError::MissingIdentifier)));
}

#[tokio::test]
async fn add_rejects_zero_expiry() {
    let server = MockServer::start().await;
    let store = store_for(&server).await;

    let result = store
        .add(AddBlockParams {
            remote_ip: Some("203.0.113.5".to_string()),
            reason: "test".to_string(),
            expires_in: 0,
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(BlocklistError::NonPositiveExpiry(0))));
}

#[tokio::test]
async fn add_inserts_and_returns_the_entry() {
    let server = MockServer::start().await;
    let expires_at = sql_timestamp(Utc::now() + Duration::hours(1));

    Mock::given(method("POST"))
        .and(path(TABLE_PATH))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([entry_row(&expires_at)])))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let entry = store
        .add(AddBlockParams {
            ephemeral_id: Some("eph-123".to_string()),
            remote_ip: Some("203.0.113.5".to_string()),
            reason: "risk threshold exceeded".to_string(),
            confidence: Confidence::High,
            detection_type: Some("ephemeral_id_fraud".to_string()),
            expires_in: 3600,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(entry.id, Some(7));
    assert!(entry.expires_at_utc().unwrap() > Utc::now());
}

#[tokio::test]
async fn offense_count_adds_one_for_the_current_offense() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(header("Prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "0-0/2")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let count = store
        .offense_count(Some("bob@example.com"), None, Some("203.0.113.5"))
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn offense_count_without_identifiers_is_one() {
    let server = MockServer::start().await;
    let store = store_for(&server).await;
    assert_eq!(store.offense_count(None, None, None).await.unwrap(), 1);
}

#[tokio::test]
async fn cleanup_reports_deleted_rows() {
    let server = MockServer::start().await;
    let expires_at = sql_timestamp(Utc::now() - Duration::hours(1));

    Mock::given(method("DELETE"))
        .and(path(TABLE_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([entry_row(&expires_at), entry_row(&expires_at)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    assert_eq!(store.cleanup_expired().await.unwrap(), 2);
}

#[tokio::test]
async fn stats_aggregates_counts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(header("Prefer", "count=exact"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("content-range", "0-0/4")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server).await;
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.high_confidence, 4);
}
