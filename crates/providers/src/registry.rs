//! Provider registry and selection.
//!
//! The registry is built once at startup from whatever credentials are
//! configured and is read-only afterwards. Selection is a uniform-random
//! choice among the configured backends: no load awareness, no sticky
//! routing, no health-based exclusion. Callers needing deterministic
//! routing should pre-filter before constructing the registry.

use crate::models::{ProviderId, SelectError};
use crate::ChatBackend;
use rand::seq::IndexedRandom;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    backends: Vec<Arc<dyn ChatBackend>>,
}

impl ProviderRegistry {
    pub fn new(backends: Vec<Arc<dyn ChatBackend>>) -> Self {
        Self { backends }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Providers with a configured credential, in registration order
    pub fn ids(&self) -> Vec<ProviderId> {
        self.backends.iter().map(|b| b.provider()).collect()
    }

    /// Pick one configured backend uniformly at random
    pub fn select(&self) -> Result<Arc<dyn ChatBackend>, SelectError> {
        self.backends
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(SelectError::NoProviderConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn test_empty_registry_fails_selection() {
        let registry = ProviderRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(
            registry.select().err(),
            Some(SelectError::NoProviderConfigured)
        );
    }

    #[test]
    fn test_single_provider_always_selected() {
        let registry = ProviderRegistry::new(vec![Arc::new(MockBackend::new(ProviderId::Grok))]);
        for _ in 0..100 {
            assert_eq!(registry.select().unwrap().provider(), ProviderId::Grok);
        }
    }

    #[test]
    fn test_selection_stays_within_registry() {
        let registry = ProviderRegistry::new(vec![
            Arc::new(MockBackend::new(ProviderId::Grok)),
            Arc::new(MockBackend::new(ProviderId::Gemini)),
        ]);
        for _ in 0..100 {
            let provider = registry.select().unwrap().provider();
            assert!(provider == ProviderId::Grok || provider == ProviderId::Gemini);
        }
    }

    #[test]
    fn test_ids_in_registration_order() {
        let registry = ProviderRegistry::new(vec![
            Arc::new(MockBackend::new(ProviderId::OpenAi)),
            Arc::new(MockBackend::new(ProviderId::Gemini)),
        ]);
        assert_eq!(registry.ids(), vec![ProviderId::OpenAi, ProviderId::Gemini]);
    }
}
