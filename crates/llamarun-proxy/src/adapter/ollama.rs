//! Ollama-native request and response shapes.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::OperationKind;

/// Tag Ollama clients append when no explicit tag is selected.
const DEFAULT_TAG: &str = ":latest";

/// Ollama clients send `model`; older ones send `name`.
pub(super) fn model_name(body: &Value) -> Option<String> {
    let raw = body
        .get("model")
        .or_else(|| body.get("name"))
        .and_then(Value::as_str)?
        .trim();
    let name = raw.strip_suffix(DEFAULT_TAG).unwrap_or(raw);
    (!name.is_empty()).then(|| name.to_string())
}

pub(super) fn translate_request(
    op: OperationKind,
    body: &Value,
    model: &str,
    stream: bool,
) -> Value {
    let mut canonical = Map::new();
    canonical.insert("model".into(), json!(model));

    match op {
        OperationKind::Completion => {
            let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or("");
            let prompt = match body.get("system").and_then(Value::as_str) {
                Some(system) if !system.is_empty() => format!("{system}\n\n{prompt}"),
                _ => prompt.to_string(),
            };
            canonical.insert("prompt".into(), json!(prompt));
            canonical.insert("stream".into(), json!(stream));
        }
        OperationKind::Chat => {
            let messages: Vec<Value> = body
                .get("messages")
                .and_then(Value::as_array)
                .map(|messages| {
                    messages
                        .iter()
                        .map(|m| json!({"role": m["role"], "content": m["content"]}))
                        .collect()
                })
                .unwrap_or_default();
            canonical.insert("messages".into(), Value::Array(messages));
            canonical.insert("stream".into(), json!(stream));
            apply_response_format(&mut canonical, body.get("format"));
        }
        OperationKind::Embeddings => {
            let input = body
                .get("prompt")
                .or_else(|| body.get("input"))
                .cloned()
                .unwrap_or(Value::Null);
            canonical.insert("input".into(), input);
        }
    }

    if op.can_stream() {
        if let Some(options) = body.get("options").and_then(Value::as_object) {
            apply_options(&mut canonical, options);
        }
    }

    Value::Object(canonical)
}

/// Map Ollama `options` onto their llama-server equivalents.
///
/// Options without a mapping (`num_ctx`, `mirostat`, ...) are dropped.
fn apply_options(canonical: &mut Map<String, Value>, options: &Map<String, Value>) {
    for key in ["temperature", "top_p", "top_k", "seed", "repeat_penalty", "stop"] {
        if let Some(value) = options.get(key).filter(|v| !v.is_null()) {
            canonical.insert(key.into(), value.clone());
        }
    }
    // -1 means unlimited and -2 fill-context; llama-server has neither, so
    // omitting max_tokens generates until a stop token.
    match options.get("num_predict").and_then(Value::as_i64) {
        Some(n) if n > 0 => {
            canonical.insert("max_tokens".into(), json!(n));
        }
        Some(n) => debug!(num_predict = n, "Omitting max_tokens"),
        None => {}
    }
}

/// Ollama's `"format": "json"` becomes OpenAI JSON mode.
fn apply_response_format(canonical: &mut Map<String, Value>, format: Option<&Value>) {
    match format {
        Some(Value::String(s)) if s == "json" => {
            canonical.insert("response_format".into(), json!({"type": "json_object"}));
        }
        Some(other) if !other.is_null() => {
            debug!("Unsupported Ollama format value: {other}; ignoring");
        }
        _ => {}
    }
}

pub(super) fn translate_response(op: OperationKind, body: &Value, model: &str) -> Value {
    let choice = &body["choices"][0];
    let usage = &body["usage"];
    let done_reason = choice["finish_reason"].as_str().unwrap_or("stop");

    match op {
        OperationKind::Embeddings => json!({
            "embedding": body["data"][0]["embedding"].as_array().cloned().unwrap_or_default(),
        }),
        OperationKind::Completion => json!({
            "model": model,
            "created_at": now_rfc3339(),
            "response": choice["text"].as_str().unwrap_or(""),
            "done": true,
            "done_reason": done_reason,
            "prompt_eval_count": usage["prompt_tokens"].as_u64().unwrap_or(0),
            "eval_count": usage["completion_tokens"].as_u64().unwrap_or(0),
        }),
        OperationKind::Chat => json!({
            "model": model,
            "created_at": now_rfc3339(),
            "message": {
                "role": "assistant",
                "content": choice["message"]["content"].as_str().unwrap_or(""),
            },
            "done": true,
            "done_reason": done_reason,
            "prompt_eval_count": usage["prompt_tokens"].as_u64().unwrap_or(0),
            "eval_count": usage["completion_tokens"].as_u64().unwrap_or(0),
        }),
    }
}

/// Ollama errors are a bare `{"error": "message"}` object.
pub(super) fn error_body(message: &str) -> Value {
    json!({ "error": message })
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
