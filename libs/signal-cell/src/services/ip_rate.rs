use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use shared_config::IpRateConfig;
use shared_database::{window_start, SupabaseClient};

use crate::models::IpRateSignal;

/// Submission rate for the remote IP over the configured window. Stepwise
/// contribution only; this signal never blocks on its own.
pub struct IpRateCollector {
    supabase: Arc<SupabaseClient>,
    config: IpRateConfig,
}

impl IpRateCollector {
    pub fn new(supabase: Arc<SupabaseClient>, config: IpRateConfig) -> Self {
        Self { supabase, config }
    }

    pub async fn collect(&self, remote_ip: &str) -> IpRateSignal {
        match self.query(remote_ip).await {
            Ok(signal) => signal,
            Err(e) => {
                warn!("IP-rate signal degraded: {}", e);
                let mut signal = IpRateSignal::neutral();
                signal.warnings.push("ip rate signal degraded".to_string());
                signal
            }
        }
    }

    async fn query(&self, remote_ip: &str) -> Result<IpRateSignal> {
        let since = window_start(self.config.window_seconds);
        let prior = self
            .supabase
            .count(&format!(
                "/rest/v1/submissions?remote_ip=eq.{remote_ip}&created_at=gte.{since}&select=id"
            ))
            .await?;
        let submission_count = prior + 1;
        let score = rate_score(submission_count);

        let mut warnings = Vec::new();
        if score >= 50.0 {
            warnings.push(format!(
                "{submission_count} submissions from this IP in the rate window"
            ));
        }

        debug!(
            remote_ip = remote_ip,
            count = submission_count,
            score = score,
            "ip rate signal collected"
        );

        Ok(IpRateSignal {
            submission_count,
            score,
            warnings,
        })
    }
}

/// `1 -> 0, 2 -> 25, 3 -> 50, 4 -> 75, 5+ -> 100`.
pub fn rate_score(count: i64) -> f64 {
    match count {
        i64::MIN..=1 => 0.0,
        2 => 25.0,
        3 => 50.0,
        4 => 75.0,
        _ => 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepwise_map() {
        assert_eq!(rate_score(0), 0.0);
        assert_eq!(rate_score(1), 0.0);
        assert_eq!(rate_score(2), 25.0);
        assert_eq!(rate_score(3), 50.0);
        assert_eq!(rate_score(4), 75.0);
        assert_eq!(rate_score(5), 100.0);
        assert_eq!(rate_score(12), 100.0);
    }
}
