use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_database::{sql_timestamp, window_start, SupabaseClient};

use crate::models::{
    AddBlockParams, BlockCheck, BlocklistEntry, BlocklistError, BlocklistStats,
};

const TABLE: &str = "/rest/v1/blocklist_entries";

/// Sole owner of `blocklist_entries`. Signal collectors may read through
/// [`BlocklistStore::check`]; only the decision engine calls
/// [`BlocklistStore::add`].
pub struct BlocklistStore {
    supabase: Arc<SupabaseClient>,
}

impl BlocklistStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Most recently blocked unexpired entry matching any supplied
    /// identifier. A hit bumps the entry's submission counter; the bump is
    /// increment-only, so racing checks stay harmless.
    ///
    /// Low-confidence `duplicate_email` rows are occurrence trackers for
    /// the 409-versus-429 ladder, not blocks; they never match here. A
    /// tracking row is keyed on the source IP, so matching it would also
    /// lock out every other user behind that IP.
    pub async fn check(
        &self,
        ephemeral_id: Option<&str>,
        remote_ip: &str,
        ja4: Option<&str>,
        email: Option<&str>,
    ) -> Result<BlockCheck, BlocklistError> {
        let mut terms = vec![format!("remote_ip.eq.{remote_ip}")];
        if let Some(ephemeral_id) = ephemeral_id {
            terms.push(format!("ephemeral_id.eq.{ephemeral_id}"));
        }
        if let Some(ja4) = ja4 {
            terms.push(format!("ja4.eq.{ja4}"));
        }
        if let Some(email) = email {
            terms.push(format!("email.eq.{email}"));
        }

        let now = sql_timestamp(Utc::now());
        let path = format!(
            "{TABLE}?or=({})&expires_at=gt.{now}&not.and=(confidence.eq.low,detection_type.eq.duplicate_email)&order=blocked_at.desc&limit=1",
            terms.join(",")
        );

        let entries: Vec<BlocklistEntry> =
            self.supabase.request(Method::GET, &path, None).await?;

        let Some(entry) = entries.into_iter().next() else {
            return Ok(BlockCheck::clean());
        };

        let expires_at = entry.expires_at_utc();
        let retry_after = expires_at
            .map(|e| (e - Utc::now()).num_seconds().max(0) as u64)
            .unwrap_or(0);

        if let Some(id) = entry.id {
            self.bump_submission_count(id, entry.submission_count).await;
        }

        debug!(
            remote_ip = remote_ip,
            reason = entry.reason.as_str(),
            retry_after = retry_after,
            "blocklist hit"
        );

        Ok(BlockCheck {
            blocked: true,
            reason: Some(entry.reason.clone()),
            confidence: Some(entry.confidence),
            expires_at,
            retry_after,
            entry: Some(entry),
        })
    }

    async fn bump_submission_count(&self, id: i64, current: i64) {
        let path = format!("{TABLE}?id=eq.{id}");
        let body = json!({ "submission_count": current + 1 });
        if let Err(e) = self
            .supabase
            .request::<Value>(Method::PATCH, &path, Some(body))
            .await
        {
            // Lookup result stands either way
            warn!("Failed to bump blocklist submission count: {}", e);
        }
    }

    /// Insert a new block. `expires_at` is always strictly after
    /// `blocked_at`.
    pub async fn add(&self, params: AddBlockParams) -> Result<BlocklistEntry, BlocklistError> {
        if !params.has_identifier() {
            return Err(BlocklistError::MissingIdentifier);
        }
        if params.expires_in == 0 {
            return Err(BlocklistError::NonPositiveExpiry(params.expires_in));
        }

        let now = Utc::now();
        let row = json!({
            "email": params.email,
            "ephemeral_id": params.ephemeral_id,
            "remote_ip": params.remote_ip,
            "ja4": params.ja4,
            "reason": params.reason,
            "confidence": params.confidence,
            "detection_type": params.detection_type,
            "blocked_at": sql_timestamp(now),
            "expires_at": sql_timestamp(now + Duration::seconds(params.expires_in as i64)),
            "submission_count": 1,
            "risk_score": params.risk_score,
            "risk_breakdown": params.risk_breakdown,
            "detection_metadata": params.detection_metadata,
            "erfid": params.erfid,
        });

        let created = self.supabase.insert_returning(TABLE, row).await?;
        let entry = created
            .into_iter()
            .next()
            .map(serde_json::from_value::<BlocklistEntry>)
            .transpose()
            .map_err(|e| BlocklistError::Database(e.into()))?
            .ok_or_else(|| {
                BlocklistError::Database(anyhow::anyhow!("insert returned no rows"))
            })?;

        debug!(
            reason = entry.reason.as_str(),
            expires_at = entry.expires_at.as_str(),
            "blocklist entry added"
        );
        Ok(entry)
    }

    /// Offenses for these identifiers in the last 24 hours, plus one for
    /// the offense being processed now.
    pub async fn offense_count(
        &self,
        email: Option<&str>,
        ephemeral_id: Option<&str>,
        remote_ip: Option<&str>,
    ) -> Result<i64, BlocklistError> {
        let mut terms = Vec::new();
        if let Some(email) = email {
            terms.push(format!("email.eq.{email}"));
        }
        if let Some(ephemeral_id) = ephemeral_id {
            terms.push(format!("ephemeral_id.eq.{ephemeral_id}"));
        }
        if let Some(remote_ip) = remote_ip {
            terms.push(format!("remote_ip.eq.{remote_ip}"));
        }
        if terms.is_empty() {
            return Ok(1);
        }

        let since = window_start(24 * 3600);
        let path = format!(
            "{TABLE}?or=({})&blocked_at=gte.{since}&select=id",
            terms.join(",")
        );
        let prior = self.supabase.count(&path).await?;
        Ok(prior + 1)
    }

    /// Prior `duplicate_email` entries for this (email, ip) pair in the
    /// last 24 hours. Drives the 409-versus-429 branch for repeat
    /// duplicate-email attempts.
    pub async fn duplicate_email_offenses(
        &self,
        email: &str,
        remote_ip: &str,
    ) -> Result<i64, BlocklistError> {
        let since = window_start(24 * 3600);
        let path = format!(
            "{TABLE}?email=eq.{email}&remote_ip=eq.{remote_ip}&detection_type=eq.duplicate_email&blocked_at=gte.{since}&select=id"
        );
        Ok(self.supabase.count(&path).await?)
    }

    /// Delete rows whose expiry has passed. Returns how many went away.
    pub async fn cleanup_expired(&self) -> Result<i64, BlocklistError> {
        let now = sql_timestamp(Utc::now());
        let path = format!("{TABLE}?expires_at=lte.{now}");

        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        let deleted: Vec<Value> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, Some(headers))
            .await?;

        debug!(count = deleted.len(), "expired blocklist entries removed");
        Ok(deleted.len() as i64)
    }

    /// Aggregate counts over the currently active (unexpired) entries.
    pub async fn stats(&self) -> Result<BlocklistStats, BlocklistError> {
        let now = sql_timestamp(Utc::now());
        let active = format!("expires_at=gt.{now}&select=id");

        let total = self.supabase.count(&format!("{TABLE}?{active}")).await?;
        let by_ephemeral_id = self
            .supabase
            .count(&format!("{TABLE}?ephemeral_id=not.is.null&{active}"))
            .await?;
        let by_ip = self
            .supabase
            .count(&format!("{TABLE}?remote_ip=not.is.null&{active}"))
            .await?;
        let high_confidence = self
            .supabase
            .count(&format!("{TABLE}?confidence=eq.high&{active}"))
            .await?;
        let medium_confidence = self
            .supabase
            .count(&format!("{TABLE}?confidence=eq.medium&{active}"))
            .await?;
        let low_confidence = self
            .supabase
            .count(&format!("{TABLE}?confidence=eq.low&{active}"))
            .await?;

        Ok(BlocklistStats {
            total,
            by_ephemeral_id,
            by_ip,
            high_confidence,
            medium_confidence,
            low_confidence,
        })
    }
}
