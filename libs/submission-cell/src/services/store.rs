use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error};

use scoring_cell::RiskBreakdown;
use shared_database::supabase::is_unique_violation;
use shared_database::{sql_timestamp, SupabaseClient};
use shared_models::metadata::RequestMetadata;

use crate::models::{CleanSubmission, FraudBlockRecord, ValidationEventRecord};

const SUBMISSIONS: &str = "/rest/v1/submissions";
const VALIDATION_EVENTS: &str = "/rest/v1/validation_events";
const FRAUD_BLOCKS: &str = "/rest/v1/fraud_blocks";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lost the race on the email unique index.
    #[error("email already registered")]
    DuplicateEmail,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Owner of the submission and validation-event write paths. Rows carry
/// the full metadata snapshot so the collectors can mine them later.
pub struct SubmissionStore {
    supabase: Arc<SupabaseClient>,
}

impl SubmissionStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count = self
            .supabase
            .count(&format!("{SUBMISSIONS}?email=eq.{email}&select=id"))
            .await?;
        Ok(count > 0)
    }

    /// Replay lookup: has this token hash appeared in any prior validation
    /// event?
    pub async fn token_seen(&self, token_hash: &str) -> Result<bool> {
        let count = self
            .supabase
            .count(&format!(
                "{VALIDATION_EVENTS}?token_hash=eq.{token_hash}&select=id"
            ))
            .await?;
        Ok(count > 0)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_submission(
        &self,
        clean: &CleanSubmission,
        metadata: &RequestMetadata,
        raw_payload: &Value,
        erfid: &str,
        ephemeral_id: Option<&str>,
        breakdown: &RiskBreakdown,
        email_signals: Option<Value>,
        testing_bypass: bool,
    ) -> Result<i64, StoreError> {
        let mut row = metadata_object(metadata)?;
        row.insert("erfid".to_string(), json!(erfid));
        row.insert("first_name".to_string(), json!(clean.first_name));
        row.insert("last_name".to_string(), json!(clean.last_name));
        row.insert("email".to_string(), json!(clean.email));
        row.insert("phone".to_string(), json!(clean.phone));
        row.insert("address".to_string(), json!(clean.address));
        row.insert(
            "date_of_birth".to_string(),
            json!(clean.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string())),
        );
        row.insert("raw_payload".to_string(), raw_payload.clone());
        row.insert("ephemeral_id".to_string(), json!(ephemeral_id));
        row.insert("risk_score".to_string(), json!(breakdown.total));
        row.insert(
            "risk_breakdown".to_string(),
            serde_json::to_value(breakdown).map_err(|e| StoreError::Database(e.into()))?,
        );
        row.insert("email_signals".to_string(), json!(email_signals));
        row.insert("testing_bypass".to_string(), json!(testing_bypass));
        row.insert("created_at".to_string(), json!(sql_timestamp(Utc::now())));

        let created = match self
            .supabase
            .insert_returning(SUBMISSIONS, Value::Object(row))
            .await
        {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => return Err(StoreError::DuplicateEmail),
            Err(e) => return Err(StoreError::Database(e)),
        };

        let id = created
            .first()
            .and_then(|row| row.get("id"))
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Database(anyhow!("submission insert returned no id")))?;

        debug!(submission_id = id, "submission persisted");
        Ok(id)
    }

    pub async fn insert_validation_event(
        &self,
        record: &ValidationEventRecord,
        metadata: &RequestMetadata,
    ) -> Result<()> {
        let mut row = metadata_object(metadata)?;
        row.insert("erfid".to_string(), json!(record.erfid));
        row.insert("token_hash".to_string(), json!(record.token_hash));
        row.insert("success".to_string(), json!(record.success));
        row.insert("allowed".to_string(), json!(record.allowed));
        row.insert("block_reason".to_string(), json!(record.block_reason));
        row.insert("detection_type".to_string(), json!(record.detection_type));
        row.insert("challenge_ts".to_string(), json!(record.challenge_ts));
        row.insert("hostname".to_string(), json!(record.hostname));
        row.insert("action".to_string(), json!(record.action));
        row.insert("ephemeral_id".to_string(), json!(record.ephemeral_id));
        row.insert("submission_id".to_string(), json!(record.submission_id));
        row.insert("risk_score".to_string(), json!(record.risk_score));
        row.insert("risk_breakdown".to_string(), record.risk_breakdown.clone().unwrap_or(Value::Null));
        row.insert("email_signals".to_string(), record.email_signals.clone().unwrap_or(Value::Null));
        row.insert("testing_bypass".to_string(), json!(record.testing_bypass));
        row.insert("created_at".to_string(), json!(sql_timestamp(Utc::now())));

        if let Err(e) = self
            .supabase
            .request::<Value>(reqwest::Method::POST, VALIDATION_EVENTS, Some(Value::Object(row)))
            .await
        {
            error!("Failed to persist validation event: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Pre-CAPTCHA rejection. Never carries a submission link.
    pub async fn insert_fraud_block(
        &self,
        record: &FraudBlockRecord,
        metadata: &RequestMetadata,
    ) -> Result<()> {
        let mut row = metadata_object(metadata)?;
        row.insert("erfid".to_string(), json!(record.erfid));
        row.insert("block_reason".to_string(), json!(record.block_reason));
        row.insert("detection_type".to_string(), json!(record.detection_type));
        row.insert("risk_score".to_string(), json!(record.risk_score));
        row.insert("risk_breakdown".to_string(), record.risk_breakdown.clone().unwrap_or(Value::Null));
        row.insert("testing_bypass".to_string(), json!(record.testing_bypass));
        row.insert("created_at".to_string(), json!(sql_timestamp(Utc::now())));

        if let Err(e) = self
            .supabase
            .request::<Value>(reqwest::Method::POST, FRAUD_BLOCKS, Some(Value::Object(row)))
            .await
        {
            error!("Failed to persist fraud block: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

/// Flatten the metadata record into a row object; the header snapshot and
/// JA4 signal vector land in JSON columns.
fn metadata_object(metadata: &RequestMetadata) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(metadata)? {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("metadata did not serialize to an object")),
    }
}
