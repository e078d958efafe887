//! Axum HTTP server for the front doors.
//!
//! This module provides `serve()`, which runs one dialect's router on a
//! pre-bound `TcpListener` until the cancellation token fires.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::router::{ProxyState, proxy_router};

/// Run the front door for `state.dialect` on `listener`.
///
/// Returns `Ok(())` on clean shutdown, or an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: ProxyState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let dialect = state.dialect;
    info!(dialect = dialect.name(), "Front door listening on {addr}");

    axum::serve(listener, proxy_router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!(dialect = dialect.name(), "Front door shut down");
    Ok(())
}
