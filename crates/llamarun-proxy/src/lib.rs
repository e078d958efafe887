//! Protocol-translating reverse proxy for llamarun.
//!
//! One front door per client dialect. Each request names a model; the front
//! door asks the runtime port for a ready backend, translates the body into
//! the backend's OpenAI-compatible shape, and relays the answer.

pub mod adapter;
pub mod forward;
pub mod frames;
pub mod models;
pub mod router;
pub mod server;

pub use adapter::{Dialect, OperationKind};
pub use router::{ProxyState, proxy_router};
pub use server::serve;
