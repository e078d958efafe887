//! One registered backend instance.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use llamarun_core::{InstanceState, RunnerSnapshot, RuntimeError};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::process::{ProcessSupervisor, StateSender, StopOutcome};

/// A backend registered in the orchestrator's map.
///
/// The instance exists before its process does: it is inserted as `Pending`
/// under the map lock and the supervisor is attached once the startup task
/// has been admitted and assigned a port.
#[derive(Debug)]
pub struct BackendInstance {
    model: String,
    state: StateSender,
    supervisor: OnceLock<Arc<ProcessSupervisor>>,
    cancel: CancellationToken,
}

impl BackendInstance {
    pub fn new(model: impl Into<String>) -> Self {
        let (state, _) = watch::channel(InstanceState::Pending);
        Self {
            model: model.into(),
            state: Arc::new(state),
            supervisor: OnceLock::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn state(&self) -> InstanceState {
        self.state.borrow().clone()
    }

    pub fn state_sender(&self) -> StateSender {
        Arc::clone(&self.state)
    }

    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn supervisor(&self) -> Option<&Arc<ProcessSupervisor>> {
        self.supervisor.get()
    }

    pub fn attach(&self, supervisor: Arc<ProcessSupervisor>) {
        if self.supervisor.set(supervisor).is_err() {
            warn!(model = %self.model, "Supervisor already attached");
        }
    }

    /// True while the instance may serve or still become ready.
    pub fn is_live(&self) -> bool {
        self.state.borrow().is_live()
    }

    /// Move to a terminal or stopping state unless already terminal.
    pub fn settle(&self, next: InstanceState) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    /// Wait until the instance is ready or can no longer become ready.
    pub async fn wait_ready(&self, budget: Duration) -> Result<u16, RuntimeError> {
        let mut rx = self.state.subscribe();
        let settled = timeout(budget, rx.wait_for(InstanceState::is_settled)).await;
        match settled {
            // Still queued at the gate: no process was ever started.
            Err(_) if matches!(*self.state.borrow(), InstanceState::Pending) => {
                Err(RuntimeError::AdmissionTimeout {
                    model: self.model.clone(),
                    waited_secs: budget.as_secs(),
                })
            }
            Err(_) => Err(RuntimeError::StartupTimeout {
                model: self.model.clone(),
                waited_secs: budget.as_secs(),
            }),
            Ok(Err(_)) => Err(RuntimeError::Internal(format!(
                "state channel for '{}' closed",
                self.model
            ))),
            Ok(Ok(state)) => match &*state {
                InstanceState::Ready { port } => Ok(*port),
                InstanceState::Failed(e) => Err(e.clone()),
                _ => Err(RuntimeError::Stopped(self.model.clone())),
            },
        }
    }

    /// Wait until the process is gone (or never existed).
    pub async fn wait_terminal(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(InstanceState::is_terminal).await;
    }

    /// Cancel startup if it is still pending and stop the process.
    pub async fn shutdown(&self, budget: Duration) -> StopOutcome {
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            if state.is_terminal() || matches!(state, InstanceState::Stopping) {
                false
            } else {
                *state = InstanceState::Stopping;
                true
            }
        });

        if let Some(supervisor) = self.supervisor.get() {
            return supervisor.stop().await;
        }

        // No process yet. The startup task observes the cancellation (or
        // stops the supervisor it attached just now) and settles the state.
        if timeout(budget, self.wait_terminal()).await.is_err() {
            return StopOutcome::Unresponsive;
        }
        if self.supervisor.get().is_some() {
            StopOutcome::Graceful
        } else {
            StopOutcome::NotRunning
        }
    }

    pub fn snapshot(&self) -> RunnerSnapshot {
        let state = self.state.borrow();
        RunnerSnapshot {
            model: self.model.clone(),
            phase: state.phase(),
            port: state.port(),
            pid: self.supervisor.get().and_then(|s| s.pid()),
        }
    }
}
