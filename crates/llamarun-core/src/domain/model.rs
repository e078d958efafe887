//! Model and runtime descriptors handed over by the configuration collaborator.
//!
//! These are immutable snapshots. The orchestrator never mutates them; it only
//! reads the launch reference and parameters when spawning a backend.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime used when a model does not name one explicitly.
pub const DEFAULT_RUNTIME_EXECUTABLE: &str = "llama-server";

/// Static launch parameters for a model, keyed by option name.
///
/// Values keep their JSON type so the launch-argument translation can tell
/// boolean flags apart from valued options.
pub type LaunchParams = BTreeMap<String, serde_json::Value>;

/// Everything needed to launch and describe one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model name (used as identifier and as the backend alias).
    pub name: String,
    /// Human-readable name for listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Path to the model weights passed to the backend.
    pub model_path: PathBuf,
    /// Name of the runtime (see [`RuntimeDescriptor`]) that serves this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Extra keyword parameters translated into command-line options.
    #[serde(default)]
    pub parameters: LaunchParams,
}

impl ModelDescriptor {
    /// Create a descriptor with no runtime override and no parameters.
    pub fn new(name: impl Into<String>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            model_path: model_path.into(),
            runtime: None,
            parameters: LaunchParams::new(),
        }
    }

    /// Set the runtime name.
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = Some(runtime.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Add one launch parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Name shown to users, falling back to the model name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// A backend runtime build (for example one llama-server binary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    /// Runtime name referenced by [`ModelDescriptor::runtime`].
    pub name: String,
    /// Executable path or command looked up on `PATH`.
    pub executable: PathBuf,
}

impl RuntimeDescriptor {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
        }
    }
}

/// A model resolved together with the executable that will serve it.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub model: ModelDescriptor,
    pub executable: PathBuf,
}
