//! Configuration collaborator port.
//!
//! The orchestrator receives an already-validated configuration snapshot
//! through this trait. Loading, migration and persistence live elsewhere.

use std::fmt;

use crate::domain::{DEFAULT_RUNTIME_EXECUTABLE, LaunchSpec, ModelDescriptor, RuntimeDescriptor};
use crate::error::RuntimeError;

/// Read-only view of model and runtime configuration.
pub trait ModelConfigPort: Send + Sync + fmt::Debug {
    /// Look up a model by name.
    fn model(&self, name: &str) -> Option<ModelDescriptor>;

    /// Look up a runtime by name.
    fn runtime(&self, name: &str) -> Option<RuntimeDescriptor>;

    /// All configured models, sorted by name.
    fn models(&self) -> Vec<ModelDescriptor>;

    /// Maximum number of backends starting or ready at the same time.
    fn concurrency_limit(&self) -> usize;

    /// Resolve a model together with the executable that serves it.
    ///
    /// Models without a runtime use the default `llama-server` on `PATH`.
    fn resolve_launch(&self, name: &str) -> Result<LaunchSpec, RuntimeError> {
        let model = self
            .model(name)
            .ok_or_else(|| RuntimeError::UnknownModel(name.to_string()))?;

        let executable = match &model.runtime {
            None => DEFAULT_RUNTIME_EXECUTABLE.into(),
            Some(runtime) => {
                self.runtime(runtime)
                    .ok_or_else(|| RuntimeError::UnknownRuntime {
                        model: name.to_string(),
                        runtime: runtime.clone(),
                    })?
                    .executable
            }
        };

        Ok(LaunchSpec { model, executable })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[derive(Debug)]
    struct OneModel(ModelDescriptor);

    impl ModelConfigPort for OneModel {
        fn model(&self, name: &str) -> Option<ModelDescriptor> {
            (name == self.0.name).then(|| self.0.clone())
        }

        fn runtime(&self, name: &str) -> Option<RuntimeDescriptor> {
            (name == "cuda").then(|| RuntimeDescriptor::new("cuda", "/opt/llama/cuda/server"))
        }

        fn models(&self) -> Vec<ModelDescriptor> {
            vec![self.0.clone()]
        }

        fn concurrency_limit(&self) -> usize {
            1
        }
    }

    #[test]
    fn resolves_default_runtime() {
        let config = OneModel(ModelDescriptor::new("m", "/m.gguf"));
        let spec = config.resolve_launch("m").unwrap();
        assert_eq!(spec.executable, PathBuf::from("llama-server"));
    }

    #[test]
    fn resolves_named_runtime() {
        let config = OneModel(ModelDescriptor::new("m", "/m.gguf").with_runtime("cuda"));
        let spec = config.resolve_launch("m").unwrap();
        assert_eq!(spec.executable, PathBuf::from("/opt/llama/cuda/server"));
    }

    #[test]
    fn unknown_model_and_runtime_are_config_errors() {
        let config = OneModel(ModelDescriptor::new("m", "/m.gguf").with_runtime("rocm"));
        assert_eq!(
            config.resolve_launch("other"),
            Err(RuntimeError::UnknownModel("other".into()))
        );
        let err = config.resolve_launch("m").unwrap_err();
        assert!(err.is_config_error());
    }
}
