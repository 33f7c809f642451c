use crate::obs::sink::{EntityOperation, MetricsEvent, MetricsSink, TemporaryTableEvent};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

///
/// StatisticsSnapshot
/// Point-in-time copy of factory counters.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub sessions_opened: u64,

    // Plans
    pub plan_cache_hits: u64,
    pub plan_cache_misses: u64,
    pub queries_executed: u64,

    // Mutation handlers
    pub handlers_built: u64,
    pub multi_table_handlers_built: u64,
    pub handlers_reused: u64,

    // JDBC
    pub statements_executed: u64,
    pub rows_affected: u64,

    // Temporary tables
    pub temporary_tables_created: u64,
    pub temporary_tables_cleaned: u64,
    pub temporary_tables_dropped: u64,

    // Session work
    pub flushes: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub optimistic_failures: u64,

    pub entities: BTreeMap<String, EntityCounters>,
}

///
/// EntityCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EntityCounters {
    pub loads: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub handlers_built: u64,
    pub optimistic_failures: u64,
}

///
/// Statistics
///
/// Factory-scoped counters fed by `MetricsEvent`s. Shared across sessions.
///

#[derive(Default)]
pub struct Statistics {
    state: Mutex<StatisticsSnapshot>,
    forward: Option<Arc<dyn MetricsSink>>,
}

impl Statistics {
    #[must_use]
    pub fn new(forward: Option<Arc<dyn MetricsSink>>) -> Self {
        Self {
            state: Mutex::default(),
            forward,
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            StatisticsSnapshot::default();
    }

    fn with_state_mut(&self, f: impl FnOnce(&mut StatisticsSnapshot)) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state);
    }
}

impl fmt::Debug for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statistics")
            .field("snapshot", &self.snapshot())
            .field("forward", &self.forward.is_some())
            .finish()
    }
}

impl MetricsSink for Statistics {
    fn record(&self, event: MetricsEvent<'_>) {
        self.with_state_mut(|s| match event {
            MetricsEvent::SessionOpened => {
                s.sessions_opened = s.sessions_opened.saturating_add(1);
            }
            MetricsEvent::PlanCache { hit: true } => {
                s.plan_cache_hits = s.plan_cache_hits.saturating_add(1);
            }
            MetricsEvent::PlanCache { hit: false } => {
                s.plan_cache_misses = s.plan_cache_misses.saturating_add(1);
            }
            MetricsEvent::QueryExecuted { .. } => {
                s.queries_executed = s.queries_executed.saturating_add(1);
            }
            MetricsEvent::HandlerBuilt {
                entity,
                multi_table,
            } => {
                s.handlers_built = s.handlers_built.saturating_add(1);
                if multi_table {
                    s.multi_table_handlers_built = s.multi_table_handlers_built.saturating_add(1);
                }
                let entry = s.entities.entry(entity.to_string()).or_default();
                entry.handlers_built = entry.handlers_built.saturating_add(1);
            }
            MetricsEvent::HandlerReused { .. } => {
                s.handlers_reused = s.handlers_reused.saturating_add(1);
            }
            MetricsEvent::StatementExecuted { rows } => {
                s.statements_executed = s.statements_executed.saturating_add(1);
                s.rows_affected = s.rows_affected.saturating_add(rows);
            }
            MetricsEvent::TemporaryTable { event, .. } => match event {
                TemporaryTableEvent::Created => {
                    s.temporary_tables_created = s.temporary_tables_created.saturating_add(1);
                }
                TemporaryTableEvent::Cleaned => {
                    s.temporary_tables_cleaned = s.temporary_tables_cleaned.saturating_add(1);
                }
                TemporaryTableEvent::Dropped => {
                    s.temporary_tables_dropped = s.temporary_tables_dropped.saturating_add(1);
                }
            },
            MetricsEvent::Entity { entity, operation } => {
                let entry = s.entities.entry(entity.to_string()).or_default();
                match operation {
                    EntityOperation::Load => entry.loads = entry.loads.saturating_add(1),
                    EntityOperation::Insert => entry.inserts = entry.inserts.saturating_add(1),
                    EntityOperation::Update => entry.updates = entry.updates.saturating_add(1),
                    EntityOperation::Delete => entry.deletes = entry.deletes.saturating_add(1),
                }
            }
            MetricsEvent::OptimisticFailure { entity } => {
                s.optimistic_failures = s.optimistic_failures.saturating_add(1);
                let entry = s.entities.entry(entity.to_string()).or_default();
                entry.optimistic_failures = entry.optimistic_failures.saturating_add(1);
            }
            MetricsEvent::Flush => s.flushes = s.flushes.saturating_add(1),
            MetricsEvent::TransactionCompleted { committed: true } => {
                s.transactions_committed = s.transactions_committed.saturating_add(1);
            }
            MetricsEvent::TransactionCompleted { committed: false } => {
                s.transactions_rolled_back = s.transactions_rolled_back.saturating_add(1);
            }
        });

        if let Some(forward) = &self.forward {
            forward.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl MetricsSink for CountingSink {
        fn record(&self, _event: MetricsEvent<'_>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn events_accumulate_into_snapshot() {
        let stats = Statistics::default();
        stats.record(MetricsEvent::PlanCache { hit: false });
        stats.record(MetricsEvent::PlanCache { hit: true });
        stats.record(MetricsEvent::StatementExecuted { rows: 3 });
        stats.record(MetricsEvent::StatementExecuted { rows: 2 });
        stats.record(MetricsEvent::HandlerBuilt {
            entity: "Animal",
            multi_table: true,
        });

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.plan_cache_hits, 1);
        assert_eq!(snapshot.plan_cache_misses, 1);
        assert_eq!(snapshot.statements_executed, 2);
        assert_eq!(snapshot.rows_affected, 5);
        assert_eq!(snapshot.multi_table_handlers_built, 1);
        assert_eq!(snapshot.entities["Animal"].handlers_built, 1);
    }

    #[test]
    fn events_are_forwarded_to_the_installed_sink() {
        let sink = Arc::new(CountingSink::default());
        let stats = Statistics::new(Some(sink.clone()));

        stats.record(MetricsEvent::Flush);
        stats.record(MetricsEvent::SessionOpened);

        assert_eq!(sink.0.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn clear_resets_counters() {
        let stats = Statistics::default();
        stats.record(MetricsEvent::Flush);
        stats.clear();

        assert_eq!(stats.snapshot(), StatisticsSnapshot::default());
    }
}
