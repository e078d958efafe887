//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports contain no implementation details and use only domain types.

pub mod event_emitter;
pub mod model_config;
pub mod model_runtime;

pub use event_emitter::{NoopEmitter, RunnerEventEmitter};
pub use model_config::ModelConfigPort;
pub use model_runtime::ModelRuntimePort;
