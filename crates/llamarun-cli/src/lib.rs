//! Composition root for the `llamarun` binary.

pub mod app;
pub mod cli;

pub use app::run;
pub use cli::Cli;
