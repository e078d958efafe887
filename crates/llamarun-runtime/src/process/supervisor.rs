//! Supervision of one backend process.
//!
//! The supervisor spawns the backend, watches its merged stdout/stderr for a
//! readiness banner and publishes lifecycle transitions on the instance's
//! state channel:
//!
//! ```text
//! Pending → Starting → Ready{port} → Stopping → Stopped
//!              │            │
//!              └────────────┴──→ Failed (unexpected non-zero exit)
//! ```
//!
//! Readiness is detected from output text. Different backend builds print
//! different banners, so either of [`READINESS_BANNERS`] is accepted. This is
//! fragile by nature; `crate::health` offers an HTTP probe for callers that
//! want a structural check on top.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use llamarun_core::{InstanceState, LaunchSpec, RunnerEvent, RunnerEventEmitter, RuntimeError};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::args::build_launch_args;
use super::output::{SharedOutput, shared_output, snapshot, spawn_output_reader};
use super::shutdown::{StopOutcome, request_terminate};

/// Output substrings that mark a backend as ready to serve.
pub const READINESS_BANNERS: [&str; 2] = ["server is listening on", "HTTP server listening"];

/// How long the watcher waits for the output readers to drain after exit.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Host the backend binds to.
    pub host: String,
    /// Grace period after the terminate signal.
    pub stop_timeout: Duration,
    /// Wait after the forced kill.
    pub kill_timeout: Duration,
    /// Output lines kept for diagnostics.
    pub output_capacity: usize,
}

/// Shared instance state channel.
pub type StateSender = Arc<watch::Sender<InstanceState>>;

/// Fires the Starting → Ready transition at most once.
struct Readiness {
    model: String,
    port: u16,
    recorded: OnceLock<u16>,
    state: StateSender,
    emitter: Arc<dyn RunnerEventEmitter>,
}

impl Readiness {
    fn observe(&self, line: &str) {
        if self.recorded.get().is_some() || !READINESS_BANNERS.iter().any(|b| line.contains(b)) {
            return;
        }
        if self.recorded.set(self.port).is_err() {
            return;
        }

        let promoted = self.state.send_if_modified(|state| {
            if matches!(state, InstanceState::Starting) {
                *state = InstanceState::Ready { port: self.port };
                true
            } else {
                false
            }
        });
        if promoted {
            info!(model = %self.model, port = %self.port, "Backend is ready");
            self.emitter
                .emit(RunnerEvent::port_ready(&self.model, self.port));
        }
    }
}

/// Owns and monitors one backend process.
pub struct ProcessSupervisor {
    spec: LaunchSpec,
    port: u16,
    config: SupervisorConfig,
    state: StateSender,
    emitter: Arc<dyn RunnerEventEmitter>,
    output: SharedOutput,
    readiness: Arc<Readiness>,
    pid: OnceLock<u32>,
    started: AtomicBool,
    stopping: Arc<AtomicBool>,
    kill: CancellationToken,
    exited_tx: Arc<watch::Sender<bool>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("model", &self.spec.model.name)
            .field("port", &self.port)
            .field("pid", &self.pid.get())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(
        spec: LaunchSpec,
        port: u16,
        config: SupervisorConfig,
        state: StateSender,
        emitter: Arc<dyn RunnerEventEmitter>,
    ) -> Self {
        let readiness = Arc::new(Readiness {
            model: spec.model.name.clone(),
            port,
            recorded: OnceLock::new(),
            state: Arc::clone(&state),
            emitter: Arc::clone(&emitter),
        });
        let (exited_tx, _) = watch::channel(false);
        let exited_tx = Arc::new(exited_tx);
        Self {
            output: shared_output(config.output_capacity),
            spec,
            port,
            config,
            state,
            emitter,
            readiness,
            pid: OnceLock::new(),
            started: AtomicBool::new(false),
            stopping: Arc::new(AtomicBool::new(false)),
            kill: CancellationToken::new(),
            exited_tx,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.spec.model.name
    }

    /// Spawn the backend. Returns as soon as the process exists; readiness
    /// is reported later on the state channel.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let model = self.model_name().to_string();
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::Internal(format!(
                "backend for '{model}' was already started"
            )));
        }

        let args = build_launch_args(&self.spec.model, &self.config.host, self.port);
        debug!(model = %model, executable = %self.spec.executable.display(), ?args, "Spawning backend");

        let mut child = Command::new(&self.spec.executable)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Launch {
                model: model.clone(),
                reason: format!("{}: {e}", self.spec.executable.display()),
            })?;

        if let Some(pid) = child.id() {
            let _ = self.pid.set(pid);
        }
        self.state.send_if_modified(|state| {
            if matches!(state, InstanceState::Pending) {
                *state = InstanceState::Starting;
                true
            } else {
                false
            }
        });
        info!(model = %model, port = %self.port, pid = ?self.pid.get(), "Backend process started");
        self.emitter.emit(RunnerEvent::started(&model));

        let readers = self.spawn_readers(&mut child);
        self.spawn_watcher(child, readers);
        Ok(())
    }

    fn spawn_readers(&self, child: &mut Child) -> Vec<JoinHandle<()>> {
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            let readiness = Arc::clone(&self.readiness);
            readers.push(spawn_output_reader(
                stdout,
                self.model_name().to_string(),
                "stdout",
                Arc::clone(&self.output),
                move |line| readiness.observe(line),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            let readiness = Arc::clone(&self.readiness);
            readers.push(spawn_output_reader(
                stderr,
                self.model_name().to_string(),
                "stderr",
                Arc::clone(&self.output),
                move |line| readiness.observe(line),
            ));
        }
        readers
    }

    /// The watcher owns the child. It runs until the exit is observed and
    /// the readers have drained, so the last diagnostic lines are kept even
    /// when a stop races with a crash.
    fn spawn_watcher(&self, mut child: Child, readers: Vec<JoinHandle<()>>) {
        let model = self.model_name().to_string();
        let kill = self.kill.clone();
        let stopping = Arc::clone(&self.stopping);
        let state = Arc::clone(&self.state);
        let emitter = Arc::clone(&self.emitter);
        let output = Arc::clone(&self.output);
        let exited_tx = Arc::clone(&self.exited_tx);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = kill.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        warn!(model = %model, error = %e, "Failed to kill backend");
                    }
                    child.wait().await
                }
            };

            for reader in readers {
                if timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                    debug!(model = %model, "Output reader still open after exit");
                }
            }

            let code = match &status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(model = %model, error = %e, "Failed to wait for backend");
                    None
                }
            };
            let intentional = stopping.load(Ordering::SeqCst);
            let unexpected = !intentional && code != Some(0);

            if unexpected {
                let lines = snapshot(&output);
                error!(model = %model, code = ?code, "Backend exited unexpectedly");
                state.send_replace(InstanceState::Failed(RuntimeError::BackendExited {
                    model: model.clone(),
                    code,
                }));
                emitter.emit(RunnerEvent::stopped(&model));
                emitter.emit(RunnerEvent::error(
                    &model,
                    format!("backend exited with code {code:?}"),
                    lines,
                ));
            } else {
                info!(model = %model, code = ?code, "Backend stopped");
                state.send_replace(InstanceState::Stopped);
                emitter.emit(RunnerEvent::stopped(&model));
            }

            exited_tx.send_replace(true);
        });
    }

    /// Stop the backend: terminate, wait, kill, wait. Never fails; an
    /// unresponsive process is logged and reported.
    pub async fn stop(&self) -> StopOutcome {
        let model = self.model_name();
        if !self.started.load(Ordering::SeqCst) || self.has_exited() {
            return StopOutcome::NotRunning;
        }

        self.stopping.store(true, Ordering::SeqCst);
        self.state.send_if_modified(|state| {
            if state.is_terminal() || matches!(state, InstanceState::Stopping) {
                false
            } else {
                *state = InstanceState::Stopping;
                true
            }
        });
        info!(model = %model, pid = ?self.pid.get(), "Stopping backend");

        let terminated = match self.pid.get() {
            Some(&pid) => request_terminate(pid),
            None => Ok(false),
        };
        match terminated {
            Ok(_) => {
                if self.wait_exit(self.config.stop_timeout).await {
                    return StopOutcome::Graceful;
                }
                warn!(
                    model = %model,
                    timeout_secs = self.config.stop_timeout.as_secs(),
                    "Backend did not exit after terminate, killing"
                );
            }
            Err(e) => debug!(model = %model, error = %e, "Terminate unavailable, killing"),
        }

        self.kill.cancel();
        if self.wait_exit(self.config.kill_timeout).await {
            StopOutcome::Killed
        } else {
            error!(
                model = %model,
                pid = ?self.pid.get(),
                "Backend still running after kill"
            );
            StopOutcome::Unresponsive
        }
    }

    async fn wait_exit(&self, budget: Duration) -> bool {
        let mut exited = self.exited_tx.subscribe();
        timeout(budget, exited.wait_for(|done| *done)).await.is_ok()
    }

    pub fn has_exited(&self) -> bool {
        *self.exited_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.has_exited()
    }

    /// Port recorded when the readiness banner was seen.
    pub fn port(&self) -> Option<u16> {
        self.readiness.recorded.get().copied()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    /// Recent output lines, oldest first.
    pub fn output_buffer(&self) -> Vec<String> {
        snapshot(&self.output)
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if self.is_running() {
            self.kill.cancel();
        }
    }
}
