//! Observability: factory statistics and the metrics sink boundary.
//!
//! Execution code never touches counters directly; every instrumentation
//! point emits a `MetricsEvent` through `Statistics::record`.

mod sink;
mod stats;

// re-exports
pub use sink::{EntityOperation, MetricsEvent, MetricsSink, TemporaryTableEvent};
pub use stats::{EntityCounters, Statistics, StatisticsSnapshot};
