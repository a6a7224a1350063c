//! Shared observability setup for every binary in the workspace.

pub mod tracing;

pub use tracing::init;
