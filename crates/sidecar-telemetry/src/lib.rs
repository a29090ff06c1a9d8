//! This crate contains the Tracing and Logging primitives used by the sidecar
//! injector to instrument its code and its HTTP surface.
pub mod instrumentation;
pub mod tracing;

pub use crate::instrumentation::AxumTraceLayer;
pub use crate::tracing::Tracing;
