//! Telemetry
//!
//! Observability for the login handshake.
//!
//! - **Spans**: every stage runs inside a `tracing` span named in [`OAuth2SpanNames`]
//! - **Metrics**: counters and durations behind the [`HandshakeMetrics`] trait
//!
//! State values, codes and tokens are never recorded in full.

pub mod metrics;
pub mod spans;

pub use metrics::{
    create_in_memory_metrics, no_op_metrics, HandshakeMetrics, InMemoryMetrics, MetricEntry,
    MetricLabels, NoOpMetrics,
};
pub use spans::{OAuth2SpanNames, OAuth2Stages};
