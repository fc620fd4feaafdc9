//! Registry of circuits, one shared instance per identifier.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use super::circuit_breaker::{Circuit, CircuitStats};
use crate::config::{CircuitConfig, CircuitsConfig};
use crate::store::{CircuitStore, MemoryStore};

/// Owns every [`Circuit`] of a process.
///
/// Constructed once at startup and shared by `Arc`; concurrent first access
/// to the same identifier yields the same instance.
#[derive(Debug)]
pub struct CircuitRegistry {
    circuits: DashMap<String, Arc<Circuit>>,
    store: Arc<dyn CircuitStore>,
    defaults: ArcSwap<CircuitConfig>,
    overrides: ArcSwap<HashMap<String, CircuitConfig>>,
}

impl CircuitRegistry {
    /// Create a registry over `store` with a default policy.
    pub fn new(store: Arc<dyn CircuitStore>, defaults: CircuitConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            store,
            defaults: ArcSwap::from_pointee(defaults),
            overrides: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Create a registry backed by a fresh [`MemoryStore`].
    pub fn in_memory(defaults: CircuitConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), defaults)
    }

    /// Create a registry from the `[circuits]` configuration section.
    pub fn from_config(store: Arc<dyn CircuitStore>, config: &CircuitsConfig) -> Self {
        let registry = Self::new(store, config.defaults.clone());
        registry.overrides.store(Arc::new(config.overrides.clone()));
        registry
    }

    /// Get or create the circuit for `identifier`, using its override or the
    /// current defaults.
    pub fn get(&self, identifier: &str) -> Arc<Circuit> {
        if let Some(circuit) = self.circuits.get(identifier) {
            return circuit.clone();
        }
        let config = self
            .overrides
            .load()
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| (**self.defaults.load()).clone());
        self.get_with_config(identifier, config)
    }

    /// Get or create the circuit for `identifier`.
    ///
    /// `config` is only used when the circuit does not exist yet; an existing
    /// circuit keeps the policy it was created with.
    pub fn get_with_config(&self, identifier: &str, config: CircuitConfig) -> Arc<Circuit> {
        self.circuits
            .entry(identifier.to_string())
            .or_insert_with(|| {
                tracing::debug!(circuit = %identifier, "Creating circuit");
                Arc::new(Circuit::new(identifier, config, self.store.clone()))
            })
            .clone()
    }

    /// Replace the defaults and overrides used for circuits created from now on.
    pub fn update_config(&self, config: &CircuitsConfig) {
        self.defaults.store(Arc::new(config.defaults.clone()));
        self.overrides.store(Arc::new(config.overrides.clone()));
        tracing::info!(
            overrides = config.overrides.len(),
            live_circuits = self.circuits.len(),
            "Circuit defaults updated"
        );
    }

    /// Look up an existing circuit without creating it.
    pub fn find(&self, identifier: &str) -> Option<Arc<Circuit>> {
        self.circuits.get(identifier).map(|c| c.clone())
    }

    /// Identifiers of all known circuits, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.circuits.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Stats for all known circuits, sorted by identifier.
    pub fn snapshot(&self) -> Vec<CircuitStats> {
        // Collect first so no map shard is held while circuits take their locks.
        let circuits: Vec<Arc<Circuit>> = self.circuits.iter().map(|e| e.value().clone()).collect();
        let mut stats: Vec<CircuitStats> = circuits.iter().map(|c| c.stats()).collect();
        stats.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        stats
    }

    /// Number of known circuits.
    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    /// Whether no circuit has been created yet.
    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailureThreshold;

    #[test]
    fn test_same_identifier_shares_instance() {
        let registry = CircuitRegistry::in_memory(CircuitConfig::default());
        let a = registry.get("api.example.com");
        let b = registry.get("api.example.com");
        let c = registry.get("db.example.com");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.identifiers(), vec!["api.example.com", "db.example.com"]);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_circuit() {
        let registry = Arc::new(CircuitRegistry::in_memory(CircuitConfig::default()));
        let barrier = Arc::new(std::sync::Barrier::new(8));
        assert!(registry.is_empty());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.get("shared")
                })
            })
            .collect();
        let circuits: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert!(circuits.iter().all(|c| Arc::ptr_eq(c, &circuits[0])));
    }

    #[test]
    fn test_overrides_and_first_config_wins() {
        let mut config = CircuitsConfig::default();
        config.overrides.insert(
            "payments".into(),
            CircuitConfig {
                volume_threshold: 20,
                ..CircuitConfig::default()
            },
        );
        let registry = CircuitRegistry::from_config(Arc::new(MemoryStore::new()), &config);

        assert_eq!(registry.get("payments").config().volume_threshold, 20);
        assert_eq!(registry.get("search").config().volume_threshold, 5);

        let ignored = CircuitConfig {
            volume_threshold: 99,
            ..CircuitConfig::default()
        };
        assert_eq!(registry.get_with_config("search", ignored).config().volume_threshold, 5);
    }

    #[test]
    fn test_update_config_applies_to_new_circuits_only() {
        let registry = CircuitRegistry::in_memory(CircuitConfig::default());
        let before = registry.get("old");

        let mut config = CircuitsConfig::default();
        config.defaults.failure_threshold = FailureThreshold::Count(2);
        registry.update_config(&config);

        assert_eq!(before.config().failure_threshold, FailureThreshold::Ratio(0.5));
        assert_eq!(registry.get("old").config().failure_threshold, FailureThreshold::Ratio(0.5));
        assert_eq!(registry.get("new").config().failure_threshold, FailureThreshold::Count(2));
        assert!(registry.find("missing").is_none());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = CircuitRegistry::in_memory(CircuitConfig::default());
        registry.get("b");
        registry.get("a");
        let ids: Vec<_> = registry.snapshot().into_iter().map(|s| s.identifier).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
