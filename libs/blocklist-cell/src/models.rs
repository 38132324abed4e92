use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How sure the decision engine was when it created the entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

/// A stored progressive-timeout block. Keyed on any combination of email,
/// ephemeral id, IP, and JA4; at least one identifier is always set.
/// Timestamps are kept in the storage format and parsed on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlocklistEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub email: Option<String>,
    pub ephemeral_id: Option<String>,
    pub remote_ip: Option<String>,
    pub ja4: Option<String>,
    pub reason: String,
    pub confidence: Confidence,
    pub detection_type: Option<String>,
    pub blocked_at: String,
    pub expires_at: String,
    #[serde(default)]
    pub submission_count: i64,
    pub risk_score: Option<f64>,
    pub risk_breakdown: Option<Value>,
    pub detection_metadata: Option<Value>,
    pub erfid: Option<String>,
}

impl BlocklistEntry {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        shared_database::parse_timestamp(&self.expires_at)
    }
}

/// Result of a blocklist lookup.
#[derive(Debug, Clone, Default)]
pub struct BlockCheck {
    pub blocked: bool,
    pub reason: Option<String>,
    pub confidence: Option<Confidence>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until the matched entry expires; 0 when clean.
    pub retry_after: u64,
    pub entry: Option<BlocklistEntry>,
}

impl BlockCheck {
    pub fn clean() -> Self {
        Self::default()
    }
}

/// Parameters for a new block. `expires_in` is in seconds and must be
/// positive; at least one identifier must be set.
#[derive(Debug, Clone, Default)]
pub struct AddBlockParams {
    pub email: Option<String>,
    pub ephemeral_id: Option<String>,
    pub remote_ip: Option<String>,
    pub ja4: Option<String>,
    pub reason: String,
    pub confidence: Confidence,
    pub detection_type: Option<String>,
    pub expires_in: u64,
    pub risk_score: Option<f64>,
    pub risk_breakdown: Option<Value>,
    pub detection_metadata: Option<Value>,
    pub erfid: Option<String>,
}

impl AddBlockParams {
    pub fn has_identifier(&self) -> bool {
        self.email.is_some()
            || self.ephemeral_id.is_some()
            || self.remote_ip.is_some()
            || self.ja4.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BlocklistStats {
    pub total: i64,
    pub by_ephemeral_id: i64,
    pub by_ip: i64,
    pub high_confidence: i64,
    pub medium_confidence: i64,
    pub low_confidence: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum BlocklistError {
    #[error("blocklist entry needs at least one identifier")]
    MissingIdentifier,

    #[error("expiry must be in the future, got {0}s")]
    NonPositiveExpiry(u64),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::High).unwrap(), r#""high""#);
        assert_eq!(
            serde_json::from_str::<Confidence>(r#""medium""#).unwrap(),
            Confidence::Medium
        );
    }

    #[test]
    fn params_require_an_identifier() {
        let mut params = AddBlockParams::default();
        assert!(!params.has_identifier());
        params.ja4 = Some("t13d1516h2_8daaf6152771_b0da82dd1658".to_string());
        assert!(params.has_identifier());
    }
}
