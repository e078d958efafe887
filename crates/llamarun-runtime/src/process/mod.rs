//! Backend process management.
//!
//! - `args` - command-line construction from launch parameters
//! - `output` - lossy line readers and the bounded output ring buffer
//! - `ports` - the well-known-port policy
//! - `shutdown` - terminate/kill escalation helpers
//! - `supervisor` - one supervised backend process

mod args;
mod output;
mod ports;
mod shutdown;
mod supervisor;

pub use args::build_launch_args;
pub use output::OutputBuffer;
pub use ports::{PortPolicy, is_port_available};
pub use shutdown::StopOutcome;
pub use supervisor::{ProcessSupervisor, READINESS_BANNERS, StateSender, SupervisorConfig};
