//! HTTP health probe for backends.
//!
//! llama-server answers `GET /health` with 200 once the model is loaded.
//! The orchestrator routes probes through a per-model circuit breaker.

use std::time::Duration;

use llamarun_core::{RunningTarget, RuntimeError};
use reqwest::Client;
use tracing::debug;

/// Per-request timeout for health probes.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Check HTTP health of a backend.
///
/// Makes a single request to the health endpoint. Any non-success status or
/// transport error is reported as `BackendCommunication`.
pub async fn check_http_health(client: &Client, target: &RunningTarget) -> Result<(), RuntimeError> {
    let url = target.url("/health");
    let failure = |reason: String| RuntimeError::BackendCommunication {
        model: target.model_name.clone(),
        reason,
    };

    let response = client
        .get(&url)
        .timeout(HEALTH_TIMEOUT)
        .send()
        .await
        .map_err(|e| failure(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        debug!(url = %url, status = %status, "Health check returned non-success status");
        Err(failure(format!("health check returned {status}")))
    }
}
