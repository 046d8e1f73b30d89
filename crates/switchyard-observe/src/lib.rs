//! Observability setup for Switchyard: tracing subscriber initialisation
//! with optional JSON output and OpenTelemetry span export.

pub mod tracing_setup;

pub use tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};
