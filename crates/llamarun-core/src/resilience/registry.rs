//! Named circuits created on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitStats};

/// Registry of named circuit breakers.
///
/// Circuits are created lazily and live as long as the registry. The config
/// passed to [`CircuitRegistry::get_with`] only applies when the circuit is
/// created; later calls return the existing breaker unchanged.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    default_config: CircuitConfig,
    circuits: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitRegistry {
    pub fn new(default_config: CircuitConfig) -> Self {
        Self {
            default_config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create a circuit with the registry's default config.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_with(name, self.default_config.clone())
    }

    /// Get or create a circuit, using `config` only if it does not exist yet.
    pub fn get_with(&self, name: &str, config: CircuitConfig) -> Arc<CircuitBreaker> {
        let mut circuits = self.lock();
        if let Some(existing) = circuits.get(name) {
            return Arc::clone(existing);
        }
        let breaker = Arc::new(CircuitBreaker::new(name, config));
        circuits.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Look up an existing circuit without creating it.
    pub fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.lock().get(name).cloned()
    }

    /// Statistics for every circuit, sorted by name.
    pub fn all_stats(&self) -> Vec<CircuitStats> {
        let breakers: Vec<_> = self.lock().values().cloned().collect();
        let mut stats: Vec<_> = breakers.iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Reset one circuit. Returns false if no circuit has that name.
    pub fn reset(&self, name: &str) -> bool {
        self.find(name).is_some_and(|breaker| {
            breaker.reset();
            true
        })
    }

    pub fn reset_all(&self) {
        let breakers: Vec<_> = self.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.circuits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
