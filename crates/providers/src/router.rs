//! Provider router — selects the correct LLM provider based on config.
//!
//! Every provider is an OpenAI-compatible endpoint; the router only differs
//! in which base URL and key it hands over.

use std::collections::HashMap;
use std::sync::Arc;
use coralclaw_config::{AppConfig, ConfigError, KNOWN_PROVIDERS, ResolvedProvider};
use coralclaw_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, (Arc<dyn Provider>, String)>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider together with the model it should use.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) {
        self.providers.insert(name.into(), (provider, model.into()));
    }

    /// The default provider and its model.
    pub fn default(&self) -> Option<(Arc<dyn Provider>, String)> {
        self.get(&self.default_provider)
    }

    /// A specific provider by name, with its model.
    pub fn get(&self, name: &str) -> Option<(Arc<dyn Provider>, String)> {
        self.providers
            .get(name)
            .map(|(provider, model)| (provider.clone(), model.clone()))
    }

    /// All registered provider names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build one provider from resolved settings.
pub fn build_provider(resolved: &ResolvedProvider) -> Arc<dyn Provider> {
    Arc::new(OpenAiCompatProvider::new(
        &resolved.name,
        &resolved.base_url,
        &resolved.api_key,
    ))
}

/// Build providers from configuration.
///
/// The default provider must resolve; other known or configured providers
/// are registered when they resolve and skipped otherwise.
pub fn build_from_config(config: &AppConfig) -> Result<ProviderRouter, ConfigError> {
    let mut router = ProviderRouter::new(&config.default_provider);

    let active = config.active_provider()?;
    router.register(active.name.clone(), build_provider(&active), active.model.clone());

    let candidates = KNOWN_PROVIDERS
        .iter()
        .map(|name| name.to_string())
        .chain(config.providers.keys().cloned());

    for name in candidates {
        if router.providers.contains_key(&name) {
            continue;
        }
        match config.resolve_provider(&name) {
            Ok(resolved) => {
                router.register(name, build_provider(&resolved), resolved.model.clone());
            }
            Err(e) => tracing::debug!(provider = %name, error = %e, "Skipping provider"),
        }
    }

    Ok(router)
}
