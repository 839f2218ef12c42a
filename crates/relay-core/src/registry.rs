//! Provider registry: the single place that knows which providers
//! exist and where their secrets live. Built once at process start from an
//! explicit list, no directory scanning or plugin discovery.

use crate::provider::{FormProvider, PaymentProvider, Provider};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-provider registration: the strategy plus its configured secret (if
/// any). A provider with no configured secret is still listed by `GET
/// /providers` but `verify` is never reached for it; the HTTP surface
/// rejects with `ProviderNotConfigured` first.
struct Registration {
    provider: Arc<dyn Provider>,
    secret: Option<String>,
}

/// Read-only after construction; safe to share behind a plain `Arc` with no
/// lock, since nothing ever mutates it post-startup.
pub struct ProviderRegistry {
    entries: HashMap<&'static str, Registration>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderStatus {
    pub name: &'static str,
    pub signature_header: &'static str,
    pub secret_configured: bool,
}

/// Aggregate registry status: counts plus the
/// per-provider breakdown returned by `GET /providers`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStatus {
    pub total: usize,
    pub configured: usize,
    pub providers: Vec<ProviderStatus>,
}

impl ProviderRegistry {
    /// Start from an empty registry and register providers explicitly.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The default registration list: the two providers this crate ships.
    pub fn with_defaults(secrets: &dyn SecretSource) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FormProvider), secrets);
        registry.register(Arc::new(PaymentProvider), secrets);
        registry
    }

    /// Register a provider, looking up its secret by name. A duplicate name
    /// is rejected; the first registration wins.
    pub fn register(&mut self, provider: Arc<dyn Provider>, secrets: &dyn SecretSource) {
        let name = provider.name();
        if self.entries.contains_key(name) {
            tracing::warn!(provider = name, "duplicate provider registration ignored");
            return;
        }
        let secret = secrets.secret_for(name);
        self.entries.insert(name, Registration { provider, secret });
    }

    /// Case-insensitive: the URL path segment and config key are
    /// lowercase by convention, but the caller isn't required to match
    /// case (spec.md §4.B; the original lowercases at the same seam).
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.entries
            .get(name.to_lowercase().as_str())
            .map(|r| r.provider.clone())
    }

    /// The secret configured for `name`, if any. Case-insensitive, same as `get`.
    pub fn secret_for(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name.to_lowercase().as_str())
            .and_then(|r| r.secret.as_deref())
    }

    pub fn list_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Per-provider breakdown plus totals.
    pub fn status(&self) -> RegistryStatus {
        let providers: Vec<ProviderStatus> = self
            .list_names()
            .into_iter()
            .map(|name| {
                let entry = &self.entries[name];
                ProviderStatus {
                    name,
                    signature_header: entry.provider.signature_header(),
                    secret_configured: entry.secret.is_some(),
                }
            })
            .collect();
        let configured = providers.iter().filter(|p| p.secret_configured).count();
        RegistryStatus {
            total: providers.len(),
            configured,
            providers,
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Indirection so the registry doesn't depend directly on [`crate::settings::RelaySettings`];
/// anything that can answer "what's the secret for provider X" qualifies.
pub trait SecretSource {
    fn secret_for(&self, provider_name: &str) -> Option<String>;
}
