//! JDBC seam: connection traits, parameter bindings, rendered operations
//! and the coordinator that executes them for a session.

mod bind;
mod coordinator;
pub mod memory;

pub use bind::{
    JdbcParameter, JdbcParameterAllocator, JdbcParameterBinding, JdbcParameterBindings, JdbcType,
};
pub use coordinator::JdbcCoordinator;

use crate::{
    sql::{Statement, render},
    value::Value,
};
use thiserror::Error as ThisError;

///
/// JdbcError
///
/// Driver-level failure. The coordinator translates these into `Error`,
/// attaching the SQL that raised them.
///

#[remain::sorted]
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum JdbcError {
    #[error("ambiguous column reference '{column}'")]
    AmbiguousColumn { column: String },

    #[error("constraint [{constraint}] violated: {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("data exception: {message}")]
    Data { message: String },

    #[error("table '{table}' already exists")]
    TableExists { table: String },

    #[error("transaction error: {message}")]
    Transaction { message: String },

    #[error("no value bound for parameter {parameter}")]
    UnboundParameter { parameter: JdbcParameter },

    #[error("unknown column '{column}'")]
    UnknownColumn { column: String },

    #[error("unknown sequence '{sequence}'")]
    UnknownSequence { sequence: String },

    #[error("unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("unsupported statement: {message}")]
    Unsupported { message: String },
}

impl JdbcError {
    pub(crate) fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }
}

///
/// JdbcOperation
///
/// One executable statement: the AST, its rendered SQL, and the JDBC
/// parameters in placeholder order.
///

#[derive(Clone, Debug, PartialEq)]
pub struct JdbcOperation {
    sql: String,
    statement: Statement,
    parameters: Vec<JdbcParameter>,
}

impl JdbcOperation {
    #[must_use]
    pub fn new(statement: Statement, comment: Option<&str>) -> Self {
        let rendered = render(&statement, comment);

        Self {
            sql: rendered.sql,
            statement,
            parameters: rendered.parameters,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub const fn statement(&self) -> &Statement {
        &self.statement
    }

    #[must_use]
    pub fn parameters(&self) -> &[JdbcParameter] {
        &self.parameters
    }

    /// Values for each placeholder, in order.
    pub fn positional_values(
        &self,
        bindings: &JdbcParameterBindings,
    ) -> Result<Vec<Value>, JdbcError> {
        self.parameters
            .iter()
            .map(|p| {
                bindings
                    .value(*p)
                    .cloned()
                    .ok_or(JdbcError::UnboundParameter { parameter: *p })
            })
            .collect()
    }
}

///
/// JdbcConnection
///
/// A single physical connection. Positional `values` line up with the
/// operation's placeholders.
///

pub trait JdbcConnection: Send {
    fn execute_update(&mut self, operation: &JdbcOperation, values: &[Value])
    -> Result<u64, JdbcError>;

    fn execute_query(
        &mut self,
        operation: &JdbcOperation,
        values: &[Value],
    ) -> Result<Vec<Vec<Value>>, JdbcError>;

    fn begin(&mut self) -> Result<(), JdbcError>;

    fn commit(&mut self) -> Result<(), JdbcError>;

    fn rollback(&mut self) -> Result<(), JdbcError>;
}

///
/// JdbcConnectionAccess
///
/// Hands out connections; the lifecycle of what sits behind it is external.
///

pub trait JdbcConnectionAccess: Send + Sync {
    fn obtain_connection(&self) -> Result<Box<dyn JdbcConnection>, JdbcError>;
}
