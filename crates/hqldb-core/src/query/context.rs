use crate::{
    config::Settings,
    id::IdentifierGenerators,
    jdbc::{JdbcCoordinator, JdbcOperation},
    model::Metamodel,
    obs::Statistics,
    sql::Statement,
    sqm::QueryParameterBindings,
};
use std::sync::Arc;

///
/// QueryOptions
///
/// Per-execution options that change the generated SQL.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QueryOptions {
    pub comment: Option<String>,
}

///
/// ExecutionContext
///
/// Everything one query execution can see: the factory-wide model and
/// settings, the session's coordinator and uid, and the bound parameters.
///

#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub query: &'a str,
    pub metamodel: &'a Metamodel,
    pub settings: &'a Settings,
    pub coordinator: &'a JdbcCoordinator,
    pub id_generators: &'a IdentifierGenerators,
    pub session_uid: &'a str,
    pub parameters: &'a QueryParameterBindings,
    pub options: &'a QueryOptions,
}

impl ExecutionContext<'_> {
    /// Comment to prefix SQL with, when comments are enabled.
    #[must_use]
    pub fn sql_comment(&self) -> Option<&str> {
        if self.settings.use_sql_comments {
            self.options.comment.as_deref()
        } else {
            None
        }
    }

    #[must_use]
    pub fn operation(&self, statement: Statement) -> JdbcOperation {
        JdbcOperation::new(statement, self.sql_comment())
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        self.coordinator.statistics()
    }
}

///
/// StrategyContext
///
/// What a mutation strategy sees in `prepare` and `release`.
///

#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub metamodel: &'a Metamodel,
    pub settings: &'a Settings,
    pub statistics: &'a Arc<Statistics>,
}
