use crate::{
    error::{Error, InternalError},
    jdbc::{JdbcConnection, JdbcError, JdbcOperation, JdbcParameterBindings},
    obs::{MetricsEvent, MetricsSink, Statistics},
    value::Value,
};
use std::{cell::RefCell, fmt, sync::Arc};
use tracing::debug;

///
/// JdbcCoordinator
///
/// Owns one connection for a session (or a strategy's prepare/release)
/// and funnels every statement through logging, statistics and exception
/// translation. Not shareable across threads.
///

pub struct JdbcCoordinator {
    connection: RefCell<Box<dyn JdbcConnection>>,
    statistics: Arc<Statistics>,
}

impl JdbcCoordinator {
    #[must_use]
    pub fn new(connection: Box<dyn JdbcConnection>, statistics: Arc<Statistics>) -> Self {
        Self {
            connection: RefCell::new(connection),
            statistics,
        }
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn execute_update(
        &self,
        operation: &JdbcOperation,
        bindings: &JdbcParameterBindings,
    ) -> Result<u64, Error> {
        let values = Self::values(operation, bindings)?;
        debug!(target: "hqldb::sql", sql = operation.sql(), "executing update");

        let rows = self
            .connection
            .borrow_mut()
            .execute_update(operation, &values)
            .map_err(|e| Error::from_jdbc(e, operation.sql()))?;
        self.statistics
            .record(MetricsEvent::StatementExecuted { rows });

        Ok(rows)
    }

    pub fn execute_query(
        &self,
        operation: &JdbcOperation,
        bindings: &JdbcParameterBindings,
    ) -> Result<Vec<Vec<Value>>, Error> {
        let values = Self::values(operation, bindings)?;
        debug!(target: "hqldb::sql", sql = operation.sql(), "executing query");

        let rows = self
            .connection
            .borrow_mut()
            .execute_query(operation, &values)
            .map_err(|e| Error::from_jdbc(e, operation.sql()))?;
        self.statistics.record(MetricsEvent::StatementExecuted {
            rows: rows.len() as u64,
        });

        Ok(rows)
    }

    pub fn begin(&self) -> Result<(), Error> {
        debug!(target: "hqldb::sql", "begin");
        self.connection
            .borrow_mut()
            .begin()
            .map_err(|e| Error::from_jdbc(e, "begin"))
    }

    pub fn commit(&self) -> Result<(), Error> {
        debug!(target: "hqldb::sql", "commit");
        self.connection
            .borrow_mut()
            .commit()
            .map_err(|e| Error::from_jdbc(e, "commit"))
    }

    pub fn rollback(&self) -> Result<(), Error> {
        debug!(target: "hqldb::sql", "rollback");
        self.connection
            .borrow_mut()
            .rollback()
            .map_err(|e| Error::from_jdbc(e, "rollback"))
    }

    fn values(
        operation: &JdbcOperation,
        bindings: &JdbcParameterBindings,
    ) -> Result<Vec<Value>, Error> {
        operation.positional_values(bindings).map_err(|e| match e {
            JdbcError::UnboundParameter { parameter } => InternalError::jdbc_invariant(format!(
                "parameter {parameter} of [{}] has no binding",
                operation.sql()
            ))
            .into(),
            other => Error::from_jdbc(other, operation.sql()),
        })
    }
}

impl fmt::Debug for JdbcCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcCoordinator").finish_non_exhaustive()
    }
}
