//! Configuration snapshot.
//!
//! The JSON layout matches the runner's config file:
//!
//! ```json
//! {
//!   "llama-runtimes": { "cuda": { "runtime": "/opt/llama/cuda/llama-server" } },
//!   "default_runtime": "llama-server",
//!   "models": {
//!     "qwen": {
//!       "model_path": "/models/qwen.gguf",
//!       "llama_cpp_runtime": "cuda",
//!       "display_name": "Qwen 2.5 7B",
//!       "parameters": { "ctx_size": 8192, "flash_attn": true }
//!     }
//!   },
//!   "global_model_parameters": { "n_gpu_layers": 99 },
//!   "concurrentRunners": 1,
//!   "proxies": { "ollama": { "enabled": true, "port": 11434 }, "lmstudio": { "enabled": true } },
//!   "runner": { "startup_timeout_secs": 240 }
//! }
//! ```
//!
//! Global parameters are merged into every model; model parameters win.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DEFAULT_RUNTIME_EXECUTABLE, LaunchParams, ModelDescriptor, RuntimeDescriptor};
use crate::ports::ModelConfigPort;
use crate::settings::{
    DEFAULT_OLLAMA_PORT, DEFAULT_OPENAI_PORT, RunnerSettings, SettingsError, validate_settings,
};

/// Errors raised while loading a configuration snapshot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Model '{0}' has an empty model_path")]
    EmptyModelPath(String),

    #[error("Model '{model}' references unknown runtime '{runtime}'")]
    UnknownRuntime { model: String, runtime: String },

    #[error("concurrentRunners must be at least 1")]
    ZeroConcurrency,

    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// One entry under `"llama-runtimes"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeEntry {
    /// Executable path.
    pub runtime: PathBuf,
}

/// One entry under `"models"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llama_cpp_runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub parameters: LaunchParams,
}

/// Settings for one client-facing front door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEntry {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

const fn default_true() -> bool {
    true
}

impl Default for ProxyEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            port: None,
        }
    }
}

/// The `"proxies"` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxiesConfig {
    pub ollama: ProxyEntry,
    /// OpenAI-dialect front door (historically named after LM Studio).
    #[serde(alias = "openai")]
    pub lmstudio: ProxyEntry,
}

impl ProxiesConfig {
    pub fn ollama_port(&self) -> u16 {
        self.ollama.port.unwrap_or(DEFAULT_OLLAMA_PORT)
    }

    pub fn openai_port(&self) -> u16 {
        self.lmstudio.port.unwrap_or(DEFAULT_OPENAI_PORT)
    }
}

const fn default_concurrency() -> usize {
    1
}

fn default_runtime_name() -> String {
    DEFAULT_RUNTIME_EXECUTABLE.to_string()
}

/// Already-validated configuration handed to the orchestrator.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(rename = "llama-runtimes", default)]
    pub runtimes: BTreeMap<String, RuntimeEntry>,
    /// Runtime for models that do not name one. Either a key of
    /// `llama-runtimes` or an executable looked up on `PATH`.
    #[serde(default = "default_runtime_name")]
    pub default_runtime: String,
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
    #[serde(default)]
    pub global_model_parameters: LaunchParams,
    #[serde(rename = "concurrentRunners", default = "default_concurrency")]
    pub concurrent_runners: usize,
    #[serde(default)]
    pub proxies: ProxiesConfig,
    #[serde(default)]
    pub runner: RunnerSettings,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            runtimes: BTreeMap::new(),
            default_runtime: default_runtime_name(),
            models: BTreeMap::new(),
            global_model_parameters: LaunchParams::new(),
            concurrent_runners: default_concurrency(),
            proxies: ProxiesConfig::default(),
            runner: RunnerSettings::with_defaults(),
        }
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .field("runtimes", &self.runtimes.keys().collect::<Vec<_>>())
            .field("concurrent_runners", &self.concurrent_runners)
            .finish_non_exhaustive()
    }
}

impl ConfigSnapshot {
    /// Parse and validate a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Read, parse and validate a snapshot file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrent_runners == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        for (name, entry) in &self.models {
            if entry.model_path.as_os_str().is_empty() {
                return Err(ConfigError::EmptyModelPath(name.clone()));
            }
            if let Some(runtime) = &entry.llama_cpp_runtime {
                if !self.runtimes.contains_key(runtime) && *runtime != self.default_runtime {
                    return Err(ConfigError::UnknownRuntime {
                        model: name.clone(),
                        runtime: runtime.clone(),
                    });
                }
            }
        }
        validate_settings(&self.runner)?;
        Ok(())
    }

    fn descriptor(&self, name: &str, entry: &ModelEntry) -> ModelDescriptor {
        let mut parameters = self.global_model_parameters.clone();
        parameters.extend(entry.parameters.clone());
        ModelDescriptor {
            name: name.to_string(),
            display_name: entry.display_name.clone(),
            model_path: entry.model_path.clone(),
            runtime: Some(
                entry
                    .llama_cpp_runtime
                    .clone()
                    .unwrap_or_else(|| self.default_runtime.clone()),
            ),
            parameters,
        }
    }
}

impl ModelConfigPort for ConfigSnapshot {
    fn model(&self, name: &str) -> Option<ModelDescriptor> {
        self.models
            .get(name)
            .map(|entry| self.descriptor(name, entry))
    }

    fn runtime(&self, name: &str) -> Option<RuntimeDescriptor> {
        if let Some(entry) = self.runtimes.get(name) {
            return Some(RuntimeDescriptor::new(name, entry.runtime.clone()));
        }
        (name == self.default_runtime).then(|| RuntimeDescriptor::new(name, name))
    }

    fn models(&self) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .map(|(name, entry)| self.descriptor(name, entry))
            .collect()
    }

    fn concurrency_limit(&self) -> usize {
        self.concurrent_runners
    }
}
