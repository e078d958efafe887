//! Backend instance lifecycle state.

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// Lifecycle phase of one backend instance.
///
/// `Pending` covers the window between registration and admission through
/// the concurrency gate; no process exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstancePhase {
    Pending,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

/// Observable state of a backend instance, published on its readiness signal.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceState {
    /// Registered, waiting for admission.
    Pending,
    /// Process spawned, readiness banner not seen yet.
    Starting,
    /// Banner seen; the backend accepts requests on `port`.
    Ready { port: u16 },
    /// Stop requested.
    Stopping,
    /// Process exited (cleanly or on request).
    Stopped,
    /// Startup or process failure.
    Failed(RuntimeError),
}

impl InstanceState {
    pub const fn phase(&self) -> InstancePhase {
        match self {
            Self::Pending => InstancePhase::Pending,
            Self::Starting => InstancePhase::Starting,
            Self::Ready { .. } => InstancePhase::Ready,
            Self::Stopping => InstancePhase::Stopping,
            Self::Stopped => InstancePhase::Stopped,
            Self::Failed(_) => InstancePhase::Failed,
        }
    }

    /// True while the instance counts against the concurrency limit or may
    /// still become ready.
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Starting | Self::Ready { .. })
    }

    /// True once no further transition towards `Ready` is possible.
    pub const fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending | Self::Starting)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    pub const fn port(&self) -> Option<u16> {
        match self {
            Self::Ready { port } => Some(*port),
            _ => None,
        }
    }
}

/// Routing information for a ready backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningTarget {
    /// Full URL to the backend (e.g. <http://127.0.0.1:8585>).
    pub base_url: String,
    /// Port the backend listens on.
    pub port: u16,
    /// Model the backend serves.
    pub model_name: String,
}

impl RunningTarget {
    /// Create a target for a backend bound on the loopback interface.
    #[must_use]
    pub fn local(port: u16, model_name: impl Into<String>) -> Self {
        Self::on_host("127.0.0.1", port, model_name)
    }

    #[must_use]
    pub fn on_host(host: &str, port: u16, model_name: impl Into<String>) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            port,
            model_name: model_name.into(),
        }
    }

    /// Absolute URL for a backend path such as `/v1/chat/completions`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Point-in-time view of one registered instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerSnapshot {
    pub model: String,
    pub phase: InstancePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}
