//! Backend process supervision and orchestration for llamarun.
//!
//! - [`process`] - spawning, readiness detection and shutdown of one backend
//! - [`orchestrator`] - the model → backend map, admission gate and port policy
//! - [`broadcaster`] - fan-out of lifecycle events
//! - [`health`] - HTTP probe of a backend's `/health` endpoint

pub mod broadcaster;
pub mod health;
pub mod orchestrator;
pub mod process;

pub use broadcaster::EventBroadcaster;
pub use health::check_http_health;
pub use orchestrator::{BackendInstance, RunnerOrchestrator};
pub use process::{
    OutputBuffer, PortPolicy, ProcessSupervisor, READINESS_BANNERS, StopOutcome, SupervisorConfig,
    build_launch_args,
};
