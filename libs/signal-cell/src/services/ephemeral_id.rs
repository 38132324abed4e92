use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

use shared_config::EphemeralIdConfig;
use shared_database::{window_start, SupabaseClient};

use crate::models::EphemeralIdSignal;

#[derive(Debug, Default, Deserialize)]
struct IpRow {
    remote_ip: Option<String>,
}

/// Counters keyed on the CAPTCHA ephemeral id: submissions in 24h,
/// validation attempts in 1h, and distinct source IPs in 24h.
pub struct EphemeralIdCollector {
    supabase: Arc<SupabaseClient>,
    config: EphemeralIdConfig,
}

impl EphemeralIdCollector {
    pub fn new(supabase: Arc<SupabaseClient>, config: EphemeralIdConfig) -> Self {
        Self { supabase, config }
    }

    pub async fn collect(&self, ephemeral_id: Option<&str>) -> EphemeralIdSignal {
        let Some(ephemeral_id) = ephemeral_id else {
            // Non-enterprise plans never see an ephemeral id
            return EphemeralIdSignal::neutral(None);
        };

        match self.query(ephemeral_id).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Ephemeral-id signal degraded: {}", e);
                let mut signal = EphemeralIdSignal::neutral(Some(ephemeral_id.to_string()));
                signal
                    .warnings
                    .push("ephemeral id signal degraded".to_string());
                signal
            }
        }
    }

    async fn query(&self, ephemeral_id: &str) -> Result<EphemeralIdSignal> {
        let day_ago = window_start(24 * 3600);
        let hour_ago = window_start(3600);

        let submission_count = self
            .supabase
            .count(&format!(
                "/rest/v1/submissions?ephemeral_id=eq.{ephemeral_id}&created_at=gte.{day_ago}&select=id"
            ))
            .await?
            + 1;

        let validation_count = self
            .supabase
            .count(&format!(
                "/rest/v1/validation_events?ephemeral_id=eq.{ephemeral_id}&created_at=gte.{hour_ago}&select=id"
            ))
            .await?
            + 1;

        let ip_rows: Vec<IpRow> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/validation_events?ephemeral_id=eq.{ephemeral_id}&created_at=gte.{day_ago}&select=remote_ip"
                ),
                None,
            )
            .await?;
        let unique_ip_count = ip_rows
            .into_iter()
            .filter_map(|r| r.remote_ip)
            .collect::<HashSet<_>>()
            .len() as i64;
        let unique_ip_count = unique_ip_count.max(1);

        let mut warnings = Vec::new();
        if submission_count >= self.config.submission_threshold {
            warnings.push(format!(
                "ephemeral id seen in {submission_count} submissions in 24h"
            ));
        }
        if validation_count >= self.config.validation_block_threshold {
            warnings.push(format!(
                "validation frequency exceeded: {validation_count} in 1h"
            ));
        } else if validation_count >= self.config.validation_warn_threshold {
            warnings.push(format!(
                "elevated validation frequency: {validation_count} in 1h"
            ));
        }
        if unique_ip_count >= self.config.ip_diversity_threshold {
            warnings.push(format!(
                "ephemeral id used from {unique_ip_count} distinct IPs in 24h"
            ));
        }

        debug!(
            ephemeral_id = ephemeral_id,
            submissions = submission_count,
            validations = validation_count,
            unique_ips = unique_ip_count,
            "ephemeral id signal collected"
        );

        Ok(EphemeralIdSignal {
            ephemeral_id: Some(ephemeral_id.to_string()),
            submission_count,
            validation_count,
            unique_ip_count,
            warnings,
        })
    }
}
