//! Orchestrator settings and validation.
//!
//! Pure domain types with no infrastructure dependencies. Every field has a
//! default so a partially filled settings file still yields a usable value.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::CircuitConfig;

/// Port reserved for the first backend started, for tooling that expects a
/// stable address.
pub const DEFAULT_WELL_KNOWN_PORT: u16 = 8585;

/// Default port for the Ollama-dialect front door.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Default port for the OpenAI-dialect front door.
pub const DEFAULT_OPENAI_PORT: u16 = 1234;

/// Settings for backend orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Port claimed by the first backend started.
    pub well_known_port: u16,
    /// Host backends bind to and the proxy connects to.
    pub backend_host: String,
    /// Cold-start budget: how long to wait for the readiness banner.
    pub startup_timeout_secs: u64,
    /// Grace period after the terminate signal before escalating.
    pub stop_timeout_secs: u64,
    /// How long to wait for the process to disappear after a forced kill.
    pub kill_timeout_secs: u64,
    /// Number of recent output lines kept per backend.
    pub output_buffer_lines: usize,
    /// Upper bound for one proxied backend call.
    pub request_timeout_secs: u64,
    /// Circuit breaker thresholds applied to process-start attempts.
    pub launch_circuit: CircuitConfig,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl RunnerSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            well_known_port: DEFAULT_WELL_KNOWN_PORT,
            backend_host: "127.0.0.1".to_string(),
            startup_timeout_secs: 240,
            stop_timeout_secs: 15,
            kill_timeout_secs: 5,
            output_buffer_lines: 200,
            request_timeout_secs: 600,
            launch_circuit: CircuitConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
        }
    }

    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Port should be >= 1024 (privileged ports require root), got {0}")]
    InvalidPort(u16),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Output buffer must hold at least one line")]
    EmptyOutputBuffer,

    #[error("Backend host cannot be empty")]
    EmptyHost,

    #[error("Circuit thresholds must be greater than zero")]
    InvalidCircuit,
}

/// Validate settings values.
pub fn validate_settings(settings: &RunnerSettings) -> Result<(), SettingsError> {
    if settings.well_known_port < 1024 {
        return Err(SettingsError::InvalidPort(settings.well_known_port));
    }

    if settings.backend_host.trim().is_empty() {
        return Err(SettingsError::EmptyHost);
    }

    for (name, value) in [
        ("startup_timeout_secs", settings.startup_timeout_secs),
        ("stop_timeout_secs", settings.stop_timeout_secs),
        ("kill_timeout_secs", settings.kill_timeout_secs),
        ("request_timeout_secs", settings.request_timeout_secs),
    ] {
        if value == 0 {
            return Err(SettingsError::ZeroTimeout(name));
        }
    }

    if settings.output_buffer_lines == 0 {
        return Err(SettingsError::EmptyOutputBuffer);
    }

    let circuit = &settings.launch_circuit;
    if circuit.failure_threshold == 0 || circuit.success_threshold == 0 {
        return Err(SettingsError::InvalidCircuit);
    }

    Ok(())
}
