use std::env;
use tracing::warn;

mod fraud;
mod routes;

pub use fraud::{
    EphemeralIdConfig, FingerprintConfig, FraudConfig, IpRateConfig, Ja4Config, ScoringWeights,
};
pub use routes::{FieldMapping, FieldType, RoutesConfig};

/// Serializable slice of the erfid options. The callable generator for the
/// `custom` format is attached in `shared-utils`, which owns the generator
/// itself.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ErfidOptions {
    pub prefix: String,
    pub format: String,
    pub include_timestamp: bool,
}

impl Default for ErfidOptions {
    fn default() -> Self {
        Self {
            prefix: "erf".to_string(),
            format: "uuid".to_string(),
            include_timestamp: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub turnstile_secret_key: String,
    pub turnstile_siteverify_url: String,
    pub operator_api_key: String,
    pub allow_testing_bypass: bool,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    pub email_reputation_url: String,
    pub email_reputation_key: String,
    pub fraud: FraudConfig,
    pub erfid: ErfidOptions,
    pub routes: RoutesConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY").unwrap_or_else(|_| {
                warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                String::new()
            }),
            turnstile_secret_key: env::var("TURNSTILE_SECRET_KEY").unwrap_or_else(|_| {
                warn!("TURNSTILE_SECRET_KEY not set, using empty value");
                String::new()
            }),
            turnstile_siteverify_url: env::var("TURNSTILE_SITEVERIFY_URL").unwrap_or_else(|_| {
                "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
            }),
            operator_api_key: env::var("X_API_KEY").unwrap_or_else(|_| {
                warn!("X_API_KEY not set, operator routes and testing bypass disabled");
                String::new()
            }),
            allow_testing_bypass: env::var("ALLOW_TESTING_BYPASS")
                .map(|v| v == "true")
                .unwrap_or(false),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            email_reputation_url: env::var("EMAIL_REPUTATION_URL").unwrap_or_else(|_| {
                warn!("EMAIL_REPUTATION_URL not set, email-fraud signal disabled");
                String::new()
            }),
            email_reputation_key: env::var("EMAIL_REPUTATION_KEY").unwrap_or_default(),
            fraud: parse_json_env("FRAUD_CONFIG"),
            erfid: parse_json_env("ERFID_CONFIG"),
            routes: parse_json_env("ROUTES"),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config.validated()
    }

    /// A denormalized weight table would let totals exceed 100; fall back
    /// to the default weights rather than score with a broken table.
    fn validated(mut self) -> Self {
        if let Err(e) = self.fraud.weights.validate() {
            warn!("Rejecting FRAUD_CONFIG weights override: {}", e);
            self.fraud.weights = ScoringWeights::default();
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_key.is_empty()
            && !self.turnstile_secret_key.is_empty()
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Configured origins, plus the localhost dev origins outside production.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins = self.allowed_origins.clone();
        if !self.is_production() {
            for dev in ["http://localhost:3000", "http://127.0.0.1:3000"] {
                if !origins.iter().any(|o| o == dev) {
                    origins.push(dev.to_string());
                }
            }
        }
        origins
    }

    pub fn testing_bypass_enabled(&self, api_key: Option<&str>) -> bool {
        self.allow_testing_bypass
            && !self.operator_api_key.is_empty()
            && api_key == Some(self.operator_api_key.as_str())
    }
}

fn parse_json_env<T: serde::de::DeserializeOwned + Default>(name: &str) -> T {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse {} override, using defaults: {}", name, e);
                T::default()
            }
        },
        _ => T::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_erfid_options() {
        let opts = ErfidOptions::default();
        assert_eq!(opts.prefix, "erf");
        assert_eq!(opts.format, "uuid");
        assert!(!opts.include_timestamp);
    }

    #[test]
    fn fraud_config_partial_override() {
        let parsed: FraudConfig =
            serde_json::from_str(r#"{"blockThreshold": 70.0}"#).unwrap();
        assert_eq!(parsed.block_threshold, 70.0);
        // Untouched sections keep their defaults
        assert_eq!(parsed.ja4.rapid_global_window_minutes, 5);
        assert_eq!(parsed.weights.token_replay, 0.35);
    }

    #[test]
    fn cors_origins_adds_localhost_outside_production() {
        let mut config = test_config();
        config.allowed_origins = vec!["https://example.com".to_string()];
        config.environment = "development".to_string();
        let origins = config.cors_origins();
        assert!(origins.contains(&"https://example.com".to_string()));
        assert!(origins.contains(&"http://localhost:3000".to_string()));

        config.environment = "production".to_string();
        let origins = config.cors_origins();
        assert_eq!(origins, vec!["https://example.com".to_string()]);
    }

    #[test]
    fn testing_bypass_requires_flag_and_matching_key() {
        let mut config = test_config();
        config.allow_testing_bypass = true;
        config.operator_api_key = "secret".to_string();
        assert!(config.testing_bypass_enabled(Some("secret")));
        assert!(!config.testing_bypass_enabled(Some("wrong")));
        assert!(!config.testing_bypass_enabled(None));

        config.allow_testing_bypass = false;
        assert!(!config.testing_bypass_enabled(Some("secret")));
    }

    fn test_config() -> AppConfig {
        AppConfig {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_service_key: "key".to_string(),
            turnstile_secret_key: "secret".to_string(),
            turnstile_siteverify_url: "http://localhost/siteverify".to_string(),
            operator_api_key: String::new(),
            allow_testing_bypass: false,
            allowed_origins: vec![],
            environment: "development".to_string(),
            email_reputation_url: String::new(),
            email_reputation_key: String::new(),
            fraud: FraudConfig::default(),
            erfid: ErfidOptions::default(),
            routes: RoutesConfig::default(),
        }
    }
}
