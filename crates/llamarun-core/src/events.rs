//! Backend lifecycle events.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "port_ready", "modelName": "qwen", "port": 8585 }
//! ```

use serde::{Deserialize, Serialize};

/// Lifecycle event for one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// The backend process was spawned.
    Started {
        #[serde(rename = "modelName")]
        model_name: String,
    },

    /// The readiness banner was seen; the backend accepts requests.
    PortReady {
        #[serde(rename = "modelName")]
        model_name: String,
        port: u16,
    },

    /// The backend process exited.
    Stopped {
        #[serde(rename = "modelName")]
        model_name: String,
    },

    /// The backend exited unexpectedly or failed to start.
    Error {
        #[serde(rename = "modelName")]
        model_name: String,
        message: String,
        /// Recent output lines, oldest first.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        output: Vec<String>,
    },
}

impl RunnerEvent {
    pub fn started(model_name: impl Into<String>) -> Self {
        Self::Started {
            model_name: model_name.into(),
        }
    }

    pub fn port_ready(model_name: impl Into<String>, port: u16) -> Self {
        Self::PortReady {
            model_name: model_name.into(),
            port,
        }
    }

    pub fn stopped(model_name: impl Into<String>) -> Self {
        Self::Stopped {
            model_name: model_name.into(),
        }
    }

    pub fn error(
        model_name: impl Into<String>,
        message: impl Into<String>,
        output: Vec<String>,
    ) -> Self {
        Self::Error {
            model_name: model_name.into(),
            message: message.into(),
            output,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Self::Started { model_name }
            | Self::PortReady { model_name, .. }
            | Self::Stopped { model_name }
            | Self::Error { model_name, .. } => model_name,
        }
    }
}
