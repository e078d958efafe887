//! Protocol translation between client dialects and the canonical backend API.
//!
//! Every front door is built for exactly one [`Dialect`]. The dialect decides
//! where the model name lives in a request, how a request body maps onto the
//! backend's OpenAI-compatible shape, and how buffered backend responses are
//! reshaped for the client. Translation is pure: no I/O, no state.

mod ollama;
mod openai;

use serde_json::Value;

/// The operations a front door can forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Plain text completion (`/api/generate`, `/v1/completions`).
    Completion,
    /// Chat completion (`/api/chat`, `/v1/chat/completions`).
    Chat,
    /// Embeddings (`/api/embeddings`, `/v1/embeddings`).
    Embeddings,
}

impl OperationKind {
    /// Canonical backend path for this operation.
    pub const fn backend_path(self) -> &'static str {
        match self {
            Self::Completion => "/v1/completions",
            Self::Chat => "/v1/chat/completions",
            Self::Embeddings => "/v1/embeddings",
        }
    }

    /// Embeddings are always answered with one buffered JSON document.
    pub const fn can_stream(self) -> bool {
        !matches!(self, Self::Embeddings)
    }
}

/// A client request/response convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Ollama-native `/api/*` routes.
    Ollama,
    /// OpenAI-compatible `/v1/*` routes, already the canonical shape.
    OpenAi,
}

impl Dialect {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }

    /// Path the client uses for `op` on this dialect's front door.
    pub const fn client_path(self, op: OperationKind) -> &'static str {
        match (self, op) {
            (Self::Ollama, OperationKind::Completion) => "/api/generate",
            (Self::Ollama, OperationKind::Chat) => "/api/chat",
            (Self::Ollama, OperationKind::Embeddings) => "/api/embeddings",
            (Self::OpenAi, op) => op.backend_path(),
        }
    }

    /// Model name requested by the client, if any.
    pub fn extract_model_name(self, body: &Value) -> Option<String> {
        match self {
            Self::Ollama => ollama::model_name(body),
            Self::OpenAi => openai::model_name(body),
        }
    }

    /// Whether the client asked for a streamed response.
    ///
    /// Ollama streams unless told otherwise; OpenAI clients must opt in.
    pub fn wants_stream(self, op: OperationKind, body: &Value) -> bool {
        if !op.can_stream() {
            return false;
        }
        let default = matches!(self, Self::Ollama);
        body.get("stream").and_then(Value::as_bool).unwrap_or(default)
    }

    /// Map a client body onto the canonical backend body for `op`.
    ///
    /// The canonical `model` field is always `model`, whatever the client sent.
    pub fn translate_request(self, op: OperationKind, body: &Value, model: &str) -> Value {
        let stream = self.wants_stream(op, body);
        match self {
            Self::Ollama => ollama::translate_request(op, body, model, stream),
            Self::OpenAi => openai::translate_request(body, model),
        }
    }

    /// Reshape a buffered canonical response into the client's shape.
    pub fn translate_response(self, op: OperationKind, body: &Value, model: &str) -> Value {
        match self {
            Self::Ollama => ollama::translate_response(op, body, model),
            Self::OpenAi => body.clone(),
        }
    }

    /// Error document in this dialect's shape.
    pub fn error_body(self, message: &str, code: Option<&str>) -> Value {
        match self {
            Self::Ollama => ollama::error_body(message),
            Self::OpenAi => openai::error_body(message, code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_defaults_differ_per_dialect() {
        let body = json!({"model": "m"});
        assert!(Dialect::Ollama.wants_stream(OperationKind::Chat, &body));
        assert!(!Dialect::OpenAi.wants_stream(OperationKind::Chat, &body));
        assert!(!Dialect::Ollama.wants_stream(OperationKind::Embeddings, &json!({"stream": true})));
        assert!(!Dialect::Ollama.wants_stream(OperationKind::Completion, &json!({"stream": false})));
    }

    #[test]
    fn client_paths_follow_dialect() {
        assert_eq!(Dialect::Ollama.client_path(OperationKind::Completion), "/api/generate");
        assert_eq!(
            Dialect::OpenAi.client_path(OperationKind::Chat),
            "/v1/chat/completions"
        );
    }

    #[test]
    fn model_field_is_always_overwritten() {
        for dialect in [Dialect::Ollama, Dialect::OpenAi] {
            let body = json!({"model": "alias", "messages": [], "stream": false});
            let canonical = dialect.translate_request(OperationKind::Chat, &body, "resolved");
            assert_eq!(canonical["model"], "resolved", "{}", dialect.name());
        }
    }
}
