//! Error taxonomy for backend orchestration.

use thiserror::Error;

use crate::resilience::CircuitError;

/// Errors surfaced by the runtime port and the proxy pipeline.
///
/// Variants are grouped by how callers should react:
/// - config errors (`UnknownModel`, `UnknownRuntime`) are fatal per request
/// - `Launch` and `BackendExited` leave nothing registered; a fresh retry is safe
/// - `StartupTimeout` leaves the instance registered; stop it before retrying
/// - `AdmissionTimeout` leaves the request queued behind the concurrency limit
/// - `BackendCommunication` is scoped to one request against one model
/// - `CircuitOpen` is a pre-emptive rejection, no work was attempted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The model is not present in the configuration snapshot.
    #[error("Model not found: {0}")]
    UnknownModel(String),

    /// The model names a runtime the configuration does not define.
    #[error("Runtime '{runtime}' for model '{model}' is not configured")]
    UnknownRuntime { model: String, runtime: String },

    /// The backend process could not be spawned.
    #[error("Failed to launch backend for '{model}': {reason}")]
    Launch { model: String, reason: String },

    /// The backend did not report readiness within the cold-start budget.
    #[error("Backend for '{model}' did not become ready within {waited_secs}s")]
    StartupTimeout { model: String, waited_secs: u64 },

    /// The instance waited at the concurrency gate for the whole cold-start
    /// budget and no process was started for it.
    #[error("Backend for '{model}' is still queued after {waited_secs}s: concurrency limit reached")]
    AdmissionTimeout { model: String, waited_secs: u64 },

    /// The backend process exited before it reported readiness.
    #[error("Backend for '{model}' exited during startup (exit code {code:?})")]
    BackendExited { model: String, code: Option<i32> },

    /// A ready backend refused or dropped a proxied call.
    #[error("Error communicating with backend for '{model}': {reason}")]
    BackendCommunication { model: String, reason: String },

    /// The resilience wrapper rejected the call without attempting it.
    #[error("Circuit '{circuit}' is open, retry in {retry_after_secs}s")]
    CircuitOpen {
        circuit: String,
        retry_after_secs: u64,
    },

    /// The instance was stopped before it became ready.
    #[error("Backend for '{0}' was stopped")]
    Stopped(String),

    /// Internal error during runtime operations.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// True for errors caused by the configuration snapshot.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::UnknownModel(_) | Self::UnknownRuntime { .. })
    }

    /// Returns true if this error indicates a temporary condition
    /// where retrying later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StartupTimeout { .. }
                | Self::AdmissionTimeout { .. }
                | Self::CircuitOpen { .. }
                | Self::Stopped(_)
        )
    }

    /// Seconds a client should wait before retrying, when known.
    #[must_use]
    pub const fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::CircuitOpen {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            Self::StartupTimeout { .. } | Self::AdmissionTimeout { .. } | Self::Stopped(_) => {
                Some(5)
            }
            _ => None,
        }
    }

    /// Returns a suggested HTTP status code for this error.
    #[must_use]
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::UnknownModel(_) | Self::UnknownRuntime { .. } => 404,
            Self::CircuitOpen { .. } | Self::AdmissionTimeout { .. } | Self::Stopped(_) => 503,
            Self::StartupTimeout { .. } => 504,
            Self::BackendCommunication { .. } => 502,
            Self::Launch { .. } | Self::BackendExited { .. } | Self::Internal(_) => 500,
        }
    }
}

impl From<CircuitError<Self>> for RuntimeError {
    fn from(err: CircuitError<Self>) -> Self {
        match err {
            CircuitError::Open { name, retry_after } => Self::CircuitOpen {
                circuit: name,
                // Round up so clients never retry before the probe is admitted.
                retry_after_secs: retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0),
            },
            CircuitError::Inner(e) => e,
        }
    }
}
