//! Model runtime port.
//!
//! The interface the proxy and control surfaces use to get a running
//! backend for a model. It hides process management from the callers.

use async_trait::async_trait;
use std::fmt;

use crate::domain::{RunnerSnapshot, RunningTarget};
use crate::error::RuntimeError;

/// Port for starting, stopping and inspecting backends.
#[async_trait]
pub trait ModelRuntimePort: Send + Sync + fmt::Debug {
    /// Ensure a backend for `model_name` is running and ready.
    ///
    /// Concurrent calls for the same model share one backend and all
    /// receive the same target.
    ///
    /// # Errors
    ///
    /// `UnknownModel`/`UnknownRuntime` for configuration problems, `Launch`
    /// when the process cannot be spawned, `StartupTimeout` when the backend
    /// stays unconfirmed for the cold-start budget, `AdmissionTimeout` when
    /// the request never got past the concurrency limit, `CircuitOpen` when
    /// recent launch attempts kept failing.
    async fn ensure_running(&self, model_name: &str) -> Result<RunningTarget, RuntimeError>;

    /// Stop the backend for `model_name`. Stopping an unknown model is a no-op.
    async fn stop(&self, model_name: &str) -> Result<(), RuntimeError>;

    /// Stop every backend concurrently.
    async fn stop_all(&self);

    /// True while the backend is starting or ready.
    async fn is_running(&self, model_name: &str) -> bool;

    /// Port of a ready backend.
    async fn port(&self, model_name: &str) -> Option<u16>;

    /// Snapshot of every registered backend.
    async fn running(&self) -> Vec<RunnerSnapshot>;

    /// Probe the health endpoint of a ready backend.
    ///
    /// `Ok(false)` when the backend is not ready or the probe failed.
    ///
    /// # Errors
    ///
    /// `CircuitOpen` while recent probes kept failing; no request is made.
    async fn probe_health(&self, model_name: &str) -> Result<bool, RuntimeError>;
}
