//! OpenAI-compatible shapes. The backend speaks this dialect natively, so
//! translation only pins the model name.

use serde_json::{Value, json};

pub(super) fn model_name(body: &Value) -> Option<String> {
    body.get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub(super) fn translate_request(body: &Value, model: &str) -> Value {
    let mut canonical = match body {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    canonical.insert("model".into(), json!(model));
    Value::Object(canonical)
}

pub(super) fn error_body(message: &str, code: Option<&str>) -> Value {
    json!({
        "error": {
            "message": message,
            "type": "server_error",
            "code": code,
        }
    })
}
