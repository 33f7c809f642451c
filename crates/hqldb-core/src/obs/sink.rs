//! Metrics sink boundary.
//!
//! Core logic emits `MetricsEvent`s; a factory forwards them to its own
//! `Statistics` and, when installed, to one external `MetricsSink`.

///
/// EntityOperation
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntityOperation {
    Load,
    Insert,
    Update,
    Delete,
}

///
/// TemporaryTableEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemporaryTableEvent {
    Created,
    Cleaned,
    Dropped,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug)]
pub enum MetricsEvent<'a> {
    SessionOpened,
    PlanCache {
        hit: bool,
    },
    QueryExecuted {
        query: &'a str,
        rows: u64,
    },
    HandlerBuilt {
        entity: &'a str,
        multi_table: bool,
    },
    HandlerReused {
        entity: &'a str,
    },
    StatementExecuted {
        rows: u64,
    },
    TemporaryTable {
        table: &'a str,
        event: TemporaryTableEvent,
    },
    Entity {
        entity: &'a str,
        operation: EntityOperation,
    },
    OptimisticFailure {
        entity: &'a str,
    },
    Flush,
    TransactionCompleted {
        committed: bool,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}
