//! The keyed collection of registered datasets: eager instances plus lazily-materialised
//! factories, behind a single reader-writer lock since the registry is read-mostly after
//! startup (see §5 of the specification this crate implements).

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::provider::DataProvider;
use crate::{ErrorKind, Result};

type Factory = Box<dyn Fn() -> Arc<dyn DataProvider> + Send + Sync>;

#[derive(Default)]
struct Inner {
    eager: BTreeMap<String, Arc<dyn DataProvider>>,
    lazy: BTreeMap<String, Factory>,
}

/// A process-wide (or test-scoped) collection of datasets, keyed by [`DataProvider::key`].
///
/// Mutation is expected only at startup (`add`/`add_lazy`) and in tests (`clear`); no request
/// path mutates the registry, so a plain `RwLock` is sufficient synchronisation.
pub struct ProviderRegistry {
    inner: RwLock<Inner>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registers a provider instance eagerly under its own key. Overwriting an existing key
    /// emits a warning and replaces the prior entry.
    pub fn add(&self, provider: Arc<dyn DataProvider>) {
        let key = provider.key().to_string();
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.eager.contains_key(&key) || inner.lazy.contains_key(&key) {
            warn!(dataset = %key, "overwriting existing provider registration");
        }
        inner.lazy.remove(&key);
        inner.eager.insert(key, provider);
    }

    /// Registers a factory to be materialised (and cached) the first time `key` is looked up.
    pub fn add_lazy(&self, key: impl Into<String>, factory: impl Fn() -> Arc<dyn DataProvider> + Send + Sync + 'static) {
        let key = key.into();
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.eager.contains_key(&key) || inner.lazy.contains_key(&key) {
            warn!(dataset = %key, "overwriting existing provider registration");
        }
        inner.eager.remove(&key);
        inner.lazy.insert(key, Box::new(factory));
    }

    /// Looks up a provider by key, materialising and caching a lazy entry on first access.
    /// Unknown keys raise `DatasetNotFoundError`.
    pub fn get(&self, key: &str) -> Result<Arc<dyn DataProvider>> {
        {
            let inner = self.inner.read().expect("registry lock poisoned");
            if let Some(provider) = inner.eager.get(key) {
                return Ok(provider.clone());
            }
        }

        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(provider) = inner.eager.get(key) {
            return Ok(provider.clone());
        }
        let factory = inner
            .lazy
            .remove(key)
            .ok_or_else(|| ErrorKind::DatasetNotFound.with_message(format!("unknown dataset: {key}")))?;
        let provider = factory();
        inner.eager.insert(key.to_string(), provider.clone());
        Ok(provider)
    }

    /// The sorted union of eager and (not-yet-materialised) lazy keys.
    pub fn list_keys(&self) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut keys: Vec<String> = inner.eager.keys().cloned().chain(inner.lazy.keys().cloned()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// The currently-materialised eager providers only.
    pub fn list_providers(&self) -> Vec<Arc<dyn DataProvider>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.eager.values().cloned().collect()
    }

    /// Materialises every lazy entry and returns all providers, eager and newly-materialised.
    pub fn all_providers(&self) -> Vec<Arc<dyn DataProvider>> {
        let keys = self.list_keys();
        keys.iter().filter_map(|key| self.get(key).ok()).collect()
    }

    /// Empties both maps. Intended for test isolation between cases sharing a registry.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.eager.clear();
        inner.lazy.clear();
    }
}
