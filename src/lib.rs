//! # Speedster
//!
//! Measures internet bandwidth and latency against speedtest servers and reports every round as metrics and a trace
//! tree.
//!
//! ## Architecture
//!
//! - **`speedster_config`**: configuration layering and validation into a [`RunConfig`](speedster_config::RunConfig)
//! - **`selector`**: picks the server for every round from the catalog
//! - **`runner`**: runs the rounds one after another, fail-fast and cancellable
//! - **`summary`**: min/mean/max across the rounds of a run
//! - **`telemetry`**: where the results of a successful run go
//! - **`otel`**: OTLP export of the per-round gauges and the span tree
//! - **`report`**: terminal table and JSON export

#[macro_use]
extern crate tracing;

mod error;
mod logging;
pub mod otel;
pub mod report;
pub mod runner;
pub mod selector;
pub mod summary;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::{
    MeasurementError,
    RunError,
    SelectionError,
    Stage,
};
pub use logging::{
    init_errors,
    init_logging,
};
pub use otel::{
    OtlpMetrics,
    Telemetry,
};
pub use runner::{
    MeasurementResult,
    RunOutcome,
    Runner,
};
pub use selector::select;
pub use summary::{
    summarize,
    SeriesStats,
    Statistics,
};
pub use telemetry::{
    MetricsLog,
    TelemetrySink,
};
