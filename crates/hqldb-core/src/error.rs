use crate::{
    hql::SyntaxError, jdbc::JdbcError, model::MappingError, session::TransactionError,
    sqm::ParameterError,
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Public error surface of the engine. Query-family variants carry the
/// offending query string; JDBC failures carry the SQL they were raised for.
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("could not execute statement [{sql}]; constraint [{constraint}]: {message}")]
    ConstraintViolation {
        constraint: String,
        message: String,
        sql: String,
    },

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error("could not execute statement [{sql}]: {source}")]
    Jdbc {
        #[source]
        source: JdbcError,
        sql: String,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    ParameterBinding(#[from] ParameterError),

    #[error("{message} [{query}]")]
    QueryExecutionRequest { message: String, query: String },

    #[error("{message} [{query}]")]
    Semantic { message: String, query: String },

    #[error("row was updated or deleted by another transaction: [{entity}#{id}]")]
    StaleState { entity: String, id: String },

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn query_execution_request(
        message: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self::QueryExecutionRequest {
            message: message.into(),
            query: query.into(),
        }
    }

    pub(crate) fn semantic(message: impl Into<String>, query: impl Into<String>) -> Self {
        Self::Semantic {
            message: message.into(),
            query: query.into(),
        }
    }

    /// Translate a driver failure raised while executing `sql`.
    pub(crate) fn from_jdbc(source: JdbcError, sql: &str) -> Self {
        match source {
            JdbcError::ConstraintViolation {
                constraint,
                message,
            } => Self::ConstraintViolation {
                constraint,
                message,
                sql: sql.to_string(),
            },
            source => Self::Jdbc {
                source,
                sql: sql.to_string(),
            },
        }
    }

    #[must_use]
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }

    #[must_use]
    pub const fn is_stale_state(&self) -> bool {
        matches!(self, Self::StaleState { .. })
    }

    /// Errors raised while interpreting a query string or its parameters.
    #[must_use]
    pub const fn is_query_error(&self) -> bool {
        matches!(
            self,
            Self::QueryExecutionRequest { .. }
                | Self::Semantic { .. }
                | Self::Syntax(_)
                | Self::ParameterBinding(_)
        )
    }
}

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a sql-origin invariant violation.
    pub(crate) fn sql_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Sql,
            message.into(),
        )
    }

    /// Construct a mutation-origin invariant violation.
    pub(crate) fn mutation_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Mutation,
            message.into(),
        )
    }

    /// Construct a jdbc-origin invariant violation.
    pub(crate) fn jdbc_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Jdbc,
            message.into(),
        )
    }

    /// Construct a mutation-origin unsupported error.
    pub(crate) fn mutation_unsupported(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::Unsupported,
            ErrorOrigin::Mutation,
            message.into(),
        )
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Unsupported,
    InvariantViolation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Sql,
    Mutation,
    Jdbc,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sql => "sql",
            Self::Mutation => "mutation",
            Self::Jdbc => "jdbc",
        };
        write!(f, "{label}")
    }
}
