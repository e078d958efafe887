//! Core domain types, ports and resilience primitives for llamarun.
//!
//! This crate has no process or HTTP code. The runtime crate implements
//! [`ports::ModelRuntimePort`]; the proxy crate consumes it.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod ports;
pub mod resilience;
pub mod settings;

pub use config::{ConfigError, ConfigSnapshot};
pub use domain::{
    InstancePhase, InstanceState, LaunchParams, LaunchSpec, ModelDescriptor, RunnerSnapshot,
    RunningTarget, RuntimeDescriptor,
};
pub use error::RuntimeError;
pub use events::RunnerEvent;
pub use ports::{ModelConfigPort, ModelRuntimePort, NoopEmitter, RunnerEventEmitter};
pub use resilience::{
    CircuitBreaker, CircuitConfig, CircuitError, CircuitRegistry, CircuitState, CircuitStats,
    FailureKind,
};
pub use settings::{RunnerSettings, SettingsError, validate_settings};
