//! Signature-keyed service resolution.
//!
//! A [`ServiceResolver`] holds services (or factories producing them) keyed by
//! [`Signature`]. Registration takes `&mut self` and happens once at startup;
//! afterwards the resolver is shared (usually behind an `Arc`) and
//! [`ServiceResolver::resolve`] may be called concurrently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{MigratorError, Result};
use crate::signature::{is_assignable, Signature};

/// Factory building a service for the signature being resolved.
pub type ServiceFactory<T> = Arc<dyn Fn(&Signature) -> T + Send + Sync>;

enum Provider<T> {
    Service(T),
    Factory(ServiceFactory<T>),
}

impl<T: Clone> Provider<T> {
    fn provide(&self, signature: &Signature) -> T {
        match self {
            Provider::Service(service) => service.clone(),
            Provider::Factory(factory) => factory(signature),
        }
    }
}

struct Entry<T> {
    signature: Signature,
    provider: Provider<T>,
}

/// Resolves the most specific service registered for a database signature.
pub struct ServiceResolver<T> {
    entries: Vec<Entry<T>>,
    default: Option<Provider<T>>,
    cache: RwLock<HashMap<Signature, T>>,
}

impl<T: Clone> Default for ServiceResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ServiceResolver<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            default: None,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, signature: Signature, service: T) {
        self.push(signature, Provider::Service(service));
    }

    pub fn register_factory<F>(&mut self, signature: Signature, factory: F)
    where
        F: Fn(&Signature) -> T + Send + Sync + 'static,
    {
        self.push(signature, Provider::Factory(Arc::new(factory)));
    }

    /// Remove every entry registered under exactly `signature`.
    pub fn unregister(&mut self, signature: &Signature) {
        self.entries.retain(|entry| &entry.signature != signature);
        self.clear_cache();
    }

    pub fn set_default(&mut self, service: T) {
        self.default = Some(Provider::Service(service));
        self.clear_cache();
    }

    pub fn set_default_factory<F>(&mut self, factory: F)
    where
        F: Fn(&Signature) -> T + Send + Sync + 'static,
    {
        self.default = Some(Provider::Factory(Arc::new(factory)));
        self.clear_cache();
    }

    /// Resolve the service for `signature`.
    ///
    /// Among the entries whose signature is assignable to `signature`, the
    /// most specific one wins. When two matching entries are not ordered by
    /// assignability, the one with more non-wildcard fields wins; a remaining
    /// tie goes to the entry registered last.
    pub fn resolve(&self, signature: &Signature) -> Result<T> {
        if let Some(service) = self.cached(signature) {
            return Ok(service);
        }

        let service = match self.most_specific(signature) {
            Some(entry) => {
                debug!("Resolved {} to entry {}", signature, entry.signature);
                entry.provider.provide(signature)
            }
            None => match &self.default {
                Some(provider) => {
                    debug!("No entry for {}, using default", signature);
                    provider.provide(signature)
                }
                None => {
                    return Err(MigratorError::Resolution {
                        signature: signature.clone(),
                    })
                }
            },
        };

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(signature.clone(), service.clone());
        }
        Ok(service)
    }

    fn most_specific(&self, signature: &Signature) -> Option<&Entry<T>> {
        let mut best: Option<&Entry<T>> = None;
        for entry in self
            .entries
            .iter()
            .filter(|entry| is_assignable(&entry.signature, signature))
        {
            best = match best {
                None => Some(entry),
                Some(current) if at_least_as_specific(&entry.signature, &current.signature) => {
                    Some(entry)
                }
                Some(current) => Some(current),
            };
        }
        best
    }

    fn cached(&self, signature: &Signature) -> Option<T> {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(signature).cloned())
    }

    fn push(&mut self, signature: Signature, provider: Provider<T>) {
        self.entries.push(Entry {
            signature,
            provider,
        });
        self.clear_cache();
    }

    fn clear_cache(&mut self) {
        if let Ok(cache) = self.cache.get_mut() {
            cache.clear();
        }
    }
}

/// `candidate` is at least as specific as `current` when `current` is
/// assignable to it, or, for unordered pairs, when it sets as many fields.
fn at_least_as_specific(candidate: &Signature, current: &Signature) -> bool {
    let current_to_candidate = is_assignable(current, candidate);
    let candidate_to_current = is_assignable(candidate, current);
    match (current_to_candidate, candidate_to_current) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.specificity() >= current.specificity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn nuodb_resolver() -> ServiceResolver<&'static str> {
        let mut resolver = ServiceResolver::new();
        resolver.register(Signature::product("NuoDB"), "bare");
        resolver.register(Signature::new("NuoDB", "2.0.1", 2, 27), "specific");
        resolver
    }

    #[test]
    fn test_most_specific_entry_wins() {
        let resolver = nuodb_resolver();
        let query = Signature::new("NuoDB", "2.0.1", 2, 30);
        assert_eq!(resolver.resolve(&query).unwrap(), "specific");
    }

    #[test]
    fn test_registration_order_does_not_hide_specific_entry() {
        let mut resolver = ServiceResolver::new();
        resolver.register(Signature::new("NuoDB", "2.0.1", 2, 27), "specific");
        resolver.register(Signature::product("NuoDB"), "bare");
        let query = Signature::new("NuoDB", "2.0.1", 2, 30);
        assert_eq!(resolver.resolve(&query).unwrap(), "specific");
    }

    #[test]
    fn test_removing_most_specific_falls_back() {
        let mut resolver = nuodb_resolver();
        resolver.set_default("default");
        let query = Signature::new("NuoDB", "2.0.1", 2, 30);
        assert_eq!(resolver.resolve(&query).unwrap(), "specific");

        resolver.unregister(&Signature::new("NuoDB", "2.0.1", 2, 27));
        assert_eq!(resolver.resolve(&query).unwrap(), "bare");

        resolver.unregister(&Signature::product("NuoDB"));
        assert_eq!(resolver.resolve(&query).unwrap(), "default");
    }

    #[test]
    fn test_tie_goes_to_latest_registration() {
        let mut resolver = ServiceResolver::new();
        resolver.register(Signature::product("MySQL"), "first");
        resolver.register(Signature::product("MySQL"), "second");
        assert_eq!(
            resolver.resolve(&Signature::product("MySQL")).unwrap(),
            "second"
        );
    }

    #[test]
    fn test_unordered_entries_prefer_more_fields() {
        let mut resolver = ServiceResolver::new();
        resolver.register(Signature::product("My").with_major(5), "major");
        resolver.register(Signature::product("MySQL"), "name");
        let query = Signature::product("MySQL").with_major(8);
        assert_eq!(resolver.resolve(&query).unwrap(), "major");
    }

    #[test]
    fn test_missing_default_is_resolution_error() {
        let resolver = nuodb_resolver();
        let err = resolver
            .resolve(&Signature::product("PostgreSQL"))
            .unwrap_err();
        assert!(matches!(err, MigratorError::Resolution { .. }));
    }

    #[test]
    fn test_factory_result_is_cached_per_signature() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut resolver: ServiceResolver<String> = ServiceResolver::new();
        resolver.register_factory(Signature::product("PostgreSQL"), move |sig| {
            counter.fetch_add(1, Ordering::SeqCst);
            format!("pg for {sig}")
        });

        let sig = Signature::new("PostgreSQL", "15.4", 15, 4);
        let first = resolver.resolve(&sig).unwrap();
        let second = resolver.resolve(&sig).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        resolver.resolve(&Signature::new("PostgreSQL", "16.1", 16, 1)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_resolution() {
        let resolver = Arc::new(nuodb_resolver());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resolver = resolver.clone();
                std::thread::spawn(move || {
                    let query = Signature::new("NuoDB", "2.0.1", 2, 27 + i);
                    resolver.resolve(&query).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "specific");
        }
    }
}
