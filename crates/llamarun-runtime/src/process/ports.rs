//! Port assignment for backend processes.

use std::collections::HashMap;
use std::net::TcpListener;

use llamarun_core::RuntimeError;
use tracing::{debug, warn};

/// Attempts to get an OS-assigned port different from the one to avoid.
const EPHEMERAL_ATTEMPTS: usize = 8;

/// Check if a port is available by attempting to bind to it.
/// The listener is dropped immediately, which releases the port.
pub fn is_port_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok_and(|listener| listener.local_addr().is_ok())
}

/// Ask the OS for a free port by binding port 0.
fn ephemeral_port(host: &str, avoid: &[u16]) -> std::io::Result<u16> {
    let mut last = 0;
    for _ in 0..EPHEMERAL_ATTEMPTS {
        last = TcpListener::bind((host, 0))?.local_addr()?.port();
        if !avoid.contains(&last) {
            return Ok(last);
        }
    }
    Err(std::io::Error::other(format!(
        "OS kept assigning reserved port {last}"
    )))
}

/// The well-known-port rule.
///
/// The first assignment since creation claims the well-known port. The claim
/// is never released, so the port is never handed to a second instance even
/// after the first one stops. Every later assignment gets an OS-assigned port,
/// never the port the same model's previous instance used.
#[derive(Debug)]
pub struct PortPolicy {
    well_known_port: u16,
    host: String,
    well_known_claimed: bool,
    last_assigned: HashMap<String, u16>,
}

impl PortPolicy {
    pub fn new(well_known_port: u16, host: impl Into<String>) -> Self {
        Self {
            well_known_port,
            host: host.into(),
            well_known_claimed: false,
            last_assigned: HashMap::new(),
        }
    }

    pub const fn well_known_claimed(&self) -> bool {
        self.well_known_claimed
    }

    /// Pick the port for a new instance of `model`.
    pub fn assign(&mut self, model: &str) -> Result<u16, RuntimeError> {
        let port = if self.well_known_claimed {
            let mut avoid = vec![self.well_known_port];
            avoid.extend(self.last_assigned.get(model));
            ephemeral_port(&self.host, &avoid).map_err(|e| RuntimeError::Launch {
                model: model.to_string(),
                reason: format!("no free port: {e}"),
            })?
        } else {
            self.well_known_claimed = true;
            if !is_port_available(&self.host, self.well_known_port) {
                warn!(
                    port = %self.well_known_port,
                    model = %model,
                    "Well-known port appears to be in use"
                );
            }
            self.well_known_port
        };

        debug!(model = %model, port = %port, "Assigned backend port");
        self.last_assigned.insert(model.to_string(), port);
        Ok(port)
    }
}
