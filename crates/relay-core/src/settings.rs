//! Process configuration, loaded from the environment (optionally via
//! a `.env` file in development. The binary crate owns the `dotenvy` call,
//! this module only reads `std::env`).

use crate::registry::SecretSource;
use std::env;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub host: String,
    pub port: u16,
    pub db_path: String,

    pub journey_service_url: String,
    pub service_to_service_token: Option<String>,

    pub retry_max_attempts: u32,
    pub retry_initial_delay_seconds: u64,
    pub retry_max_delay_seconds: u64,
    pub dispatch_timeout_seconds: u64,

    pub dlq_enabled: bool,
    pub dlq_max_retries: u32,

    pub shutdown_grace_seconds: u64,
}

impl RelaySettings {
    /// Load every setting from the environment, falling back to the
    /// documented defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            host: env_or("RELAY_HOST", "0.0.0.0"),
            port: env_parse("RELAY_PORT", 8080),
            db_path: env_or("RELAY_DB_PATH", "./data/relay.db"),

            journey_service_url: env_or("JOURNEY_SERVICE_URL", "http://localhost:9000"),
            service_to_service_token: env::var("SERVICE_TO_SERVICE_TOKEN").ok(),

            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_initial_delay_seconds: env_parse("RETRY_INITIAL_DELAY_SECONDS", 1),
            retry_max_delay_seconds: env_parse("RETRY_MAX_DELAY_SECONDS", 60),
            dispatch_timeout_seconds: env_parse("DISPATCH_TIMEOUT_SECONDS", 10),

            dlq_enabled: env_parse("DLQ_ENABLED", true),
            dlq_max_retries: env_parse("DLQ_MAX_RETRIES", 3),

            shutdown_grace_seconds: env_parse("SHUTDOWN_GRACE_SECONDS", 5),
        }
    }

    /// Settings suited to tests: in-memory store, localhost-only, short
    /// timeouts so a retry-exhaustion test doesn't take real minutes.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            db_path: ":memory:".into(),
            journey_service_url: "http://127.0.0.1:0".into(),
            service_to_service_token: None,
            retry_max_attempts: 3,
            retry_initial_delay_seconds: 0,
            retry_max_delay_seconds: 1,
            dispatch_timeout_seconds: 2,
            dlq_enabled: true,
            dlq_max_retries: 3,
            shutdown_grace_seconds: 1,
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    fn secret_env_key(provider_name: &str) -> String {
        format!("WEBHOOK_{}_SECRET", provider_name.to_uppercase())
    }
}

/// Reads `WEBHOOK_{PROVIDER}_SECRET` directly from the process environment,
/// letting [`crate::registry::ProviderRegistry`] stay oblivious to where
/// secrets actually come from.
impl SecretSource for RelaySettings {
    fn secret_for(&self, provider_name: &str) -> Option<String> {
        env::var(Self::secret_env_key(provider_name)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_tests_uses_in_memory_db() {
        let settings = RelaySettings::for_tests();
        assert_eq!(settings.db_path, ":memory:");
    }

    #[test]
    fn secret_env_key_uppercases_provider_name() {
        assert_eq!(
            RelaySettings::secret_env_key("form"),
            "WEBHOOK_FORM_SECRET"
        );
    }
}
