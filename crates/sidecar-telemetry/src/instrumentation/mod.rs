//! Tower layers which instrument the HTTP surface of the injector.
pub mod axum;

pub use self::axum::TraceLayer as AxumTraceLayer;
