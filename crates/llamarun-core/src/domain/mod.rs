//! Domain types shared by every crate in the workspace.

mod instance;
mod model;

pub use instance::{InstancePhase, InstanceState, RunnerSnapshot, RunningTarget};
pub use model::{
    DEFAULT_RUNTIME_EXECUTABLE, LaunchParams, LaunchSpec, ModelDescriptor, RuntimeDescriptor,
};
