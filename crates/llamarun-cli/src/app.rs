//! Wires the orchestrator and the front doors together and runs them until
//! Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use llamarun_core::{ConfigSnapshot, ModelRuntimePort, RunnerEvent};
use llamarun_proxy::{ProxyState, serve};
use llamarun_runtime::{EventBroadcaster, RunnerOrchestrator};

use crate::cli::Cli;

/// Run until Ctrl-C, then stop every backend.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Arc::new(
        ConfigSnapshot::load(&cli.config)
            .with_context(|| format!("failed to load {}", cli.config.display()))?,
    );
    let settings = config.runner.clone();
    info!(
        config = %cli.config.display(),
        models = config.models.len(),
        "Configuration loaded"
    );

    let events = EventBroadcaster::new();
    tokio::spawn(log_events(events.subscribe()));

    let orchestrator =
        RunnerOrchestrator::new(config.clone(), settings.clone(), Arc::new(events));
    let runtime: Arc<dyn ModelRuntimePort> = Arc::new(orchestrator.clone());

    let cancel = CancellationToken::new();
    let mut servers = JoinSet::new();
    for (dialect, port) in cli.front_doors(&config) {
        let listener = TcpListener::bind((cli.host.as_str(), port))
            .await
            .with_context(|| {
                format!("failed to bind {} front door on {}:{port}", dialect.name(), cli.host)
            })?;
        let state = ProxyState::new(
            dialect,
            Arc::clone(&runtime),
            config.clone(),
            settings.request_timeout(),
        )?;
        servers.spawn(serve(listener, state, cancel.child_token()));
    }

    if servers.is_empty() {
        bail!("every front door is disabled; nothing to serve");
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Shutdown requested");
        }
        Some(exited) = servers.join_next() => {
            match exited {
                Ok(Ok(())) => warn!("A front door stopped unexpectedly"),
                Ok(Err(e)) => error!("Front door failed: {e:#}"),
                Err(e) => error!("Front door task panicked: {e}"),
            }
        }
    }

    cancel.cancel();
    while let Some(exited) = servers.join_next().await {
        if let Ok(Err(e)) = exited {
            warn!("Front door failed during shutdown: {e:#}");
        }
    }

    let outcomes = orchestrator.stop_all().await;
    info!(backends = outcomes.len(), "All backends stopped");
    Ok(())
}

/// Log runner lifecycle events until the broadcaster goes away.
async fn log_events(mut rx: broadcast::Receiver<RunnerEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                match &event {
                    RunnerEvent::Started { model_name } => info!(model = %model_name, "Backend started"),
                    RunnerEvent::PortReady { model_name, port } => {
                        info!(model = %model_name, port = %port, "Backend ready");
                    }
                    RunnerEvent::Stopped { model_name } => info!(model = %model_name, "Backend stopped"),
                    RunnerEvent::Error {
                        model_name,
                        message,
                        output,
                    } => {
                        error!(model = %model_name, "Backend error: {message}");
                        for line in output {
                            error!(model = %model_name, "  {line}");
                        }
                    }
                }
                if let Ok(json) = serde_json::to_string(&event) {
                    debug!(target: "llamarun::events", "{json}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
