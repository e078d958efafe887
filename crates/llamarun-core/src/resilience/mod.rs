//! Resilience primitives.
//!
//! A generic circuit breaker that wraps any fallible async call, plus a
//! registry that hands out one breaker per named resource. The orchestrator
//! guards process-start attempts with it; health probes use it too.

mod circuit_breaker;
mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitConfig, CircuitError, CircuitState, CircuitStats, FailureKind,
};
pub use registry::CircuitRegistry;
