//! Listing and introspection payloads for both dialects.
//!
//! Domain types live in `llamarun-core`; this module maps them onto the
//! shapes Ollama and OpenAI clients expect.

use serde::Serialize;
use serde_json::Value;

use llamarun_core::ModelDescriptor;

/// Version reported on `GET /api/version`.
///
/// Ollama clients gate features on the server version; this is the lowest
/// release whose API surface the front door covers.
pub const OLLAMA_COMPAT_VERSION: &str = "0.6.4";

/// Plain-text body of the Ollama root probe.
pub const OLLAMA_ROOT_RESPONSE: &str = "Ollama is running";

/// Shown as the owner of every model on `/v1/models`.
const OWNED_BY: &str = "llamarun";

// =============================================================================
// Ollama
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OllamaVersionResponse {
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaTagsResponse {
    pub models: Vec<OllamaModelEntry>,
}

impl OllamaTagsResponse {
    pub fn from_descriptors(models: &[ModelDescriptor]) -> Self {
        Self {
            models: models.iter().map(OllamaModelEntry::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaModelEntry {
    pub name: String,
    pub model: String,
    pub size: u64,
    pub digest: String,
    pub details: OllamaModelDetails,
}

impl From<&ModelDescriptor> for OllamaModelEntry {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            name: model.name.clone(),
            model: model.name.clone(),
            size: 0,
            digest: String::new(),
            details: OllamaModelDetails::gguf(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaModelDetails {
    pub format: String,
    pub family: String,
    pub parameter_size: String,
    pub quantization_level: String,
}

impl OllamaModelDetails {
    fn gguf() -> Self {
        Self {
            format: "gguf".to_string(),
            family: String::new(),
            parameter_size: String::new(),
            quantization_level: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaShowResponse {
    pub modelfile: String,
    /// Launch parameters, one `key value` pair per line.
    pub parameters: String,
    pub details: OllamaModelDetails,
    pub model_info: serde_json::Map<String, Value>,
}

impl OllamaShowResponse {
    pub fn from_descriptor(model: &ModelDescriptor) -> Self {
        let parameters = model
            .parameters
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key} {s}"),
                other => format!("{key} {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let mut model_info = serde_json::Map::new();
        model_info.insert("general.name".into(), Value::from(model.label()));
        if let Some(runtime) = &model.runtime {
            model_info.insert("llamarun.runtime".into(), Value::from(runtime.as_str()));
        }

        Self {
            modelfile: format!("FROM {}", model.model_path.display()),
            parameters,
            details: OllamaModelDetails::gguf(),
            model_info,
        }
    }
}

// =============================================================================
// OpenAI
// =============================================================================

/// Response from `/v1/models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelInfo>,
}

impl ModelsResponse {
    pub fn from_descriptors(models: &[ModelDescriptor]) -> Self {
        Self {
            object: "list".to_string(),
            data: models.iter().map(ModelInfo::from).collect(),
        }
    }
}

/// Information about a single model (OpenAI format).
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&ModelDescriptor> for ModelInfo {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            id: model.name.clone(),
            object: "model".to_string(),
            created: 0,
            owned_by: OWNED_BY.to_string(),
            description: model.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn qwen() -> ModelDescriptor {
        ModelDescriptor::new("qwen", "/models/qwen.gguf")
            .with_display_name("Qwen 7B")
            .with_runtime("default")
            .with_param("ctx_size", json!(8192))
            .with_param("chat_template", json!("chatml"))
    }

    #[test]
    fn show_lists_parameters_and_path() {
        let show = OllamaShowResponse::from_descriptor(&qwen());
        assert_eq!(show.modelfile, "FROM /models/qwen.gguf");
        assert_eq!(show.parameters, "chat_template chatml\nctx_size 8192");
        assert_eq!(show.model_info["general.name"], "Qwen 7B");
    }

    #[test]
    fn openai_listing_shape() {
        let listing = serde_json::to_value(ModelsResponse::from_descriptors(&[qwen()])).unwrap();
        assert_eq!(listing["object"], "list");
        assert_eq!(listing["data"][0]["id"], "qwen");
        assert_eq!(listing["data"][0]["owned_by"], "llamarun");
        assert_eq!(listing["data"][0]["description"], "Qwen 7B");
    }
}
