//! Command-line construction for backend processes.
//!
//! The invocation is a fixed preamble followed by the model's launch
//! parameters:
//!
//! ```text
//! <executable> --model <path> --alias <name> --host <host> --port <port> [params...]
//! ```
//!
//! Parameter translation, in key order:
//! - `snake_case` keys become `--kebab-case` flags
//! - `true` becomes a bare flag, `false`/`null`/blank strings are omitted
//! - arrays repeat the flag once per element
//! - everything else becomes `--key value`
//!
//! Keys owned by the preamble (`model`, `alias`, `host`, `port`) are ignored.

use std::ffi::OsString;

use llamarun_core::ModelDescriptor;
use serde_json::Value;
use tracing::debug;

const PREAMBLE_KEYS: [&str; 4] = ["model", "alias", "host", "port"];

/// Build the full argument list for a backend.
pub fn build_launch_args(model: &ModelDescriptor, host: &str, port: u16) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--model".into(),
        model.model_path.clone().into_os_string(),
        "--alias".into(),
        model.name.clone().into(),
        "--host".into(),
        host.into(),
        "--port".into(),
        port.to_string().into(),
    ];

    for (key, value) in &model.parameters {
        let normalized = key.trim_start_matches('-').replace('_', "-");
        if PREAMBLE_KEYS.contains(&normalized.as_str()) {
            debug!(model = %model.name, key = %key, "Ignoring launch parameter owned by the preamble");
            continue;
        }
        let flag = format!("--{normalized}");
        match value {
            Value::Array(items) => {
                for item in items {
                    push_param(&mut args, &flag, item);
                }
            }
            other => push_param(&mut args, &flag, other),
        }
    }

    args
}

fn push_param(args: &mut Vec<OsString>, flag: &str, value: &Value) {
    match value {
        Value::Bool(true) => args.push(flag.into()),
        Value::Bool(false) | Value::Null => {}
        Value::String(s) if s.trim().is_empty() => {}
        Value::String(s) => {
            args.push(flag.into());
            args.push(s.into());
        }
        Value::Number(n) => {
            args.push(flag.into());
            args.push(n.to_string().into());
        }
        Value::Array(_) | Value::Object(_) => {
            args.push(flag.into());
            args.push(value.to_string().into());
        }
    }
}
