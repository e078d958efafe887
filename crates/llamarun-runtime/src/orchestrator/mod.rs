//! Backend orchestration.
//!
//! The [`RunnerOrchestrator`] maps model names to at most one live backend,
//! bounds how many backends run at once and applies the port policy. It is
//! the only component with global mutable state, and all of it sits behind
//! one check-then-register step:
//!
//! ```text
//! ensure_running(m)
//!   ├─ lock map ─┬─ live instance for m? → reuse it
//!   │            └─ otherwise insert Pending instance, spawn startup task
//!   └─ wait (bounded) for the instance to settle
//!
//! startup task
//!   resolve config → admission gate → port policy → launch (circuit "launch:m")
//!   → hold the admission permit until the process exits → deregister
//! ```
//!
//! The startup task is detached from the caller, so a client disconnecting
//! mid cold-start never leaves a half-started process without an owner.

mod instance;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use llamarun_core::{
    CircuitError, CircuitRegistry, FailureKind, InstanceState, ModelConfigPort, ModelRuntimePort,
    RunnerEventEmitter, RunnerSettings, RunnerSnapshot, RunningTarget, RuntimeError,
};
use reqwest::Client;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::health::check_http_health;
use crate::process::{PortPolicy, ProcessSupervisor, StopOutcome, SupervisorConfig};

pub use instance::BackendInstance;

/// Prefix for the per-model circuit guarding process starts.
pub const LAUNCH_CIRCUIT_PREFIX: &str = "launch:";

/// Prefix for the per-model circuit guarding health probes.
pub const HEALTH_CIRCUIT_PREFIX: &str = "health:";

struct Inner {
    instances: Mutex<HashMap<String, Arc<BackendInstance>>>,
    gate: Arc<Semaphore>,
    ports: Mutex<PortPolicy>,
    config: Arc<dyn ModelConfigPort>,
    settings: RunnerSettings,
    emitter: Arc<dyn RunnerEventEmitter>,
    circuits: CircuitRegistry,
    http: Client,
}

/// Owns every backend instance. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RunnerOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RunnerOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerOrchestrator")
            .field("concurrency_limit", &self.concurrency_limit())
            .finish_non_exhaustive()
    }
}

impl RunnerOrchestrator {
    pub fn new(
        config: Arc<dyn ModelConfigPort>,
        settings: RunnerSettings,
        emitter: Arc<dyn RunnerEventEmitter>,
    ) -> Self {
        let limit = config.concurrency_limit().max(1);
        let ports = PortPolicy::new(settings.well_known_port, settings.backend_host.clone());
        let circuits = CircuitRegistry::new(settings.launch_circuit.clone());
        info!(
            concurrency_limit = limit,
            well_known_port = settings.well_known_port,
            "Runner orchestrator created"
        );
        Self {
            inner: Arc::new(Inner {
                instances: Mutex::new(HashMap::new()),
                gate: Arc::new(Semaphore::new(limit)),
                ports: Mutex::new(ports),
                config,
                settings,
                emitter,
                circuits,
                http: Client::new(),
            }),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.config.concurrency_limit().max(1)
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.inner.settings
    }

    /// Circuit breakers used for launches and probes.
    pub fn circuits(&self) -> &CircuitRegistry {
        &self.inner.circuits
    }

    /// Ensure a backend for `model` is ready and return its port.
    ///
    /// A live instance is reused; otherwise a new one is registered before
    /// anything is awaited, so concurrent callers always share one process.
    /// On `StartupTimeout` the instance stays registered and may still
    /// become ready; stop it explicitly to retry from scratch. On
    /// `AdmissionTimeout` it stays queued at the gate and launches once a
    /// slot frees up.
    pub async fn ensure_running(&self, model: &str) -> Result<u16, RuntimeError> {
        let instance = {
            let mut instances = self.inner.instances.lock().await;
            match instances.get(model) {
                Some(existing) if existing.is_live() => {
                    debug!(model = %model, "Reusing registered backend");
                    Arc::clone(existing)
                }
                _ => {
                    let instance = Arc::new(BackendInstance::new(model));
                    instances.insert(model.to_string(), Arc::clone(&instance));
                    tokio::spawn(run_instance(
                        Arc::clone(&self.inner),
                        Arc::clone(&instance),
                    ));
                    instance
                }
            }
        };

        let result = instance
            .wait_ready(self.inner.settings.startup_timeout())
            .await;
        if let Err(e) = &result {
            warn!(model = %model, error = %e, "Backend not ready");
        }
        result
    }

    /// Stop one backend and remove it from the map. Unknown models are a no-op.
    pub async fn stop(&self, model: &str) -> StopOutcome {
        let removed = self.inner.instances.lock().await.remove(model);
        let Some(instance) = removed else {
            return StopOutcome::NotRunning;
        };
        let outcome = instance.shutdown(self.shutdown_budget()).await;
        info!(model = %model, ?outcome, "Backend stop finished");
        outcome
    }

    /// Stop every backend concurrently. Individual failures are logged and
    /// never prevent the others from stopping.
    pub async fn stop_all(&self) -> Vec<(String, StopOutcome)> {
        let drained: Vec<_> = self.inner.instances.lock().await.drain().collect();
        if drained.is_empty() {
            return Vec::new();
        }
        info!(count = drained.len(), "Stopping all backends");

        let budget = self.shutdown_budget();
        let outcomes = join_all(
            drained
                .iter()
                .map(|(_, instance)| instance.shutdown(budget)),
        )
        .await;

        let results: Vec<_> = drained
            .into_iter()
            .map(|(model, _)| model)
            .zip(outcomes)
            .collect();
        for (model, outcome) in &results {
            if !outcome.is_clean() {
                error!(model = %model, ?outcome, "Backend did not stop cleanly");
            }
        }
        results
    }

    /// True while the model's backend is starting or ready.
    pub async fn is_running(&self, model: &str) -> bool {
        self.inner.instances.lock().await.get(model).is_some_and(|i| {
            matches!(
                i.state(),
                InstanceState::Starting | InstanceState::Ready { .. }
            )
        })
    }

    /// Port of a ready backend.
    pub async fn port(&self, model: &str) -> Option<u16> {
        self.inner
            .instances
            .lock()
            .await
            .get(model)
            .and_then(|i| i.state().port())
    }

    /// Snapshot of every registered backend, sorted by model name.
    pub async fn running(&self) -> Vec<RunnerSnapshot> {
        let mut snapshots: Vec<_> = self
            .inner
            .instances
            .lock()
            .await
            .values()
            .map(|i| i.snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.model.cmp(&b.model));
        snapshots
    }

    /// Recent output of a registered backend, oldest line first.
    pub async fn output(&self, model: &str) -> Option<Vec<String>> {
        let instance = self.inner.instances.lock().await.get(model).cloned()?;
        Some(
            instance
                .supervisor()
                .map(|s| s.output_buffer())
                .unwrap_or_default(),
        )
    }

    /// Probe a ready backend's `/health` endpoint through its health circuit.
    ///
    /// Returns `Ok(false)` when the backend is not ready or the probe fails,
    /// and `CircuitOpen` while recent probes kept failing.
    pub async fn probe_health(&self, model: &str) -> Result<bool, RuntimeError> {
        let Some(port) = self.port(model).await else {
            return Ok(false);
        };
        let target = self.target(model, port);
        let circuit = self
            .inner
            .circuits
            .get(&format!("{HEALTH_CIRCUIT_PREFIX}{model}"));

        match circuit
            .call(|| check_http_health(&self.inner.http, &target))
            .await
        {
            Ok(()) => Ok(true),
            Err(CircuitError::Inner(e)) => {
                debug!(model = %model, error = %e, "Health probe failed");
                Ok(false)
            }
            Err(open) => Err(open.into()),
        }
    }

    pub fn target(&self, model: &str, port: u16) -> RunningTarget {
        RunningTarget::on_host(&self.inner.settings.backend_host, port, model)
    }

    fn shutdown_budget(&self) -> Duration {
        self.inner.settings.stop_timeout() + self.inner.settings.kill_timeout()
    }
}

/// Lifecycle of one instance from registration to deregistration.
async fn run_instance(inner: Arc<Inner>, instance: Arc<BackendInstance>) {
    let model = instance.model().to_string();
    match start_instance(&inner, &instance).await {
        Ok(permit) => {
            instance.wait_terminal().await;
            drop(permit);
        }
        Err(RuntimeError::Stopped(_)) => instance.settle(InstanceState::Stopped),
        Err(e) => {
            warn!(model = %model, error = %e, "Backend failed to start");
            instance.settle(InstanceState::Failed(e));
        }
    }

    let mut instances = inner.instances.lock().await;
    if instances
        .get(&model)
        .is_some_and(|current| Arc::ptr_eq(current, &instance))
    {
        instances.remove(&model);
        debug!(model = %model, "Backend deregistered");
    }
}

/// Resolve, admit, assign a port and launch. On success the admission
/// permit is returned so the caller can hold it for the process lifetime.
async fn start_instance(
    inner: &Inner,
    instance: &BackendInstance,
) -> Result<OwnedSemaphorePermit, RuntimeError> {
    let model = instance.model();
    let spec = inner.config.resolve_launch(model)?;

    let permit = tokio::select! {
        biased;
        () = instance.cancel_token().cancelled() => {
            return Err(RuntimeError::Stopped(model.to_string()));
        }
        permit = Arc::clone(&inner.gate).acquire_owned() => permit
            .map_err(|_| RuntimeError::Internal("admission gate closed".to_string()))?,
    };
    debug!(model = %model, "Admitted through concurrency gate");

    let port = inner.ports.lock().await.assign(model)?;
    let config = SupervisorConfig {
        host: inner.settings.backend_host.clone(),
        stop_timeout: inner.settings.stop_timeout(),
        kill_timeout: inner.settings.kill_timeout(),
        output_capacity: inner.settings.output_buffer_lines,
    };
    let circuit = inner.circuits.get_with(
        &format!("{LAUNCH_CIRCUIT_PREFIX}{model}"),
        inner.settings.launch_circuit.clone(),
    );

    let launched = circuit
        .call_classified(
            || async {
                let supervisor = Arc::new(ProcessSupervisor::new(
                    spec,
                    port,
                    config,
                    instance.state_sender(),
                    Arc::clone(&inner.emitter),
                ));
                supervisor.start()?;
                instance.attach(Arc::clone(&supervisor));
                if instance.cancel_token().is_cancelled() {
                    supervisor.stop().await;
                    return Ok(());
                }
                match instance.wait_ready(inner.settings.startup_timeout()).await {
                    Ok(_) | Err(RuntimeError::Stopped(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            },
            |e| match e {
                RuntimeError::Internal(_) => FailureKind::Unexpected,
                _ => FailureKind::Expected,
            },
        )
        .await;

    match launched {
        Ok(()) => Ok(permit),
        // Still registered; it may become ready later or be stopped.
        Err(CircuitError::Inner(RuntimeError::StartupTimeout { waited_secs, .. })) => {
            warn!(model = %model, waited_secs, "Backend still starting after cold-start budget");
            Ok(permit)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ModelRuntimePort for RunnerOrchestrator {
    async fn ensure_running(&self, model_name: &str) -> Result<RunningTarget, RuntimeError> {
        let port = Self::ensure_running(self, model_name).await?;
        Ok(self.target(model_name, port))
    }

    async fn stop(&self, model_name: &str) -> Result<(), RuntimeError> {
        Self::stop(self, model_name).await;
        Ok(())
    }

    async fn stop_all(&self) {
        Self::stop_all(self).await;
    }

    async fn is_running(&self, model_name: &str) -> bool {
        Self::is_running(self, model_name).await
    }

    async fn port(&self, model_name: &str) -> Option<u16> {
        Self::port(self, model_name).await
    }

    async fn running(&self) -> Vec<RunnerSnapshot> {
        Self::running(self).await
    }

    async fn probe_health(&self, model_name: &str) -> Result<bool, RuntimeError> {
        Self::probe_health(self, model_name).await
    }
}
