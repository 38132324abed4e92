pub mod email;
pub mod ephemeral_id;
pub mod fingerprint;
pub mod ip_rate;
pub mod ja4;

use std::sync::Arc;

use tracing::debug;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::metadata::RequestMetadata;

use crate::models::SignalBundle;
use email::EmailReputationClient;
use ephemeral_id::EphemeralIdCollector;
use fingerprint::FingerprintCollector;
use ip_rate::IpRateCollector;
use ja4::Ja4Collector;

/// The five collectors behind one entry point. Collection runs them
/// concurrently; they share only the read-only metadata and the database
/// handle, and each fails open on its own.
pub struct SignalCollectors {
    email: EmailReputationClient,
    ephemeral: EphemeralIdCollector,
    ja4: Ja4Collector,
    ip_rate: IpRateCollector,
    fingerprint: FingerprintCollector,
}

impl SignalCollectors {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            email: EmailReputationClient::new(config),
            ephemeral: EphemeralIdCollector::new(
                Arc::clone(&supabase),
                config.fraud.ephemeral_id.clone(),
            ),
            ja4: Ja4Collector::new(Arc::clone(&supabase), config.fraud.ja4.clone()),
            ip_rate: IpRateCollector::new(Arc::clone(&supabase), config.fraud.ip_rate.clone()),
            fingerprint: FingerprintCollector::new(supabase, config.fraud.fingerprint.clone()),
        }
    }

    pub async fn collect_all(
        &self,
        metadata: &RequestMetadata,
        email: &str,
        ephemeral_id: Option<&str>,
    ) -> SignalBundle {
        let (email_signal, ephemeral, ja4, ip_rate, fingerprint) = tokio::join!(
            self.email.validate(email, metadata),
            self.ephemeral.collect(ephemeral_id),
            self.ja4.collect(metadata, ephemeral_id),
            self.ip_rate.collect(&metadata.remote_ip),
            self.fingerprint.collect(metadata),
        );

        debug!(
            email_available = email_signal.available,
            ja4_raw = ja4.raw_score,
            "signal collection complete"
        );

        SignalBundle {
            email: email_signal,
            ephemeral,
            ja4,
            ip_rate,
            fingerprint,
        }
    }
}
