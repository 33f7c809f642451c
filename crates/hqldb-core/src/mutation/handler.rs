use crate::{
    error::Error,
    jdbc::{JdbcParameter, JdbcParameterBindings},
    model::EntityMapping,
    query::{ExecutionContext, QueryOptions},
    sql::{JdbcParameterXref, create_jdbc_parameter_bindings},
    sqm::{DomainParameterXref, SqmParameterId},
    value::Value,
};
use std::{collections::BTreeMap, sync::Arc};

///
/// Handler
///
/// Executes one translated mutation. Built once from a statement and its
/// parameter xref, then replayed for as long as `is_compatible_with` holds
/// for the bindings and options of a new execution.
///

pub trait Handler: Send + Sync {
    /// Mapped entity the statement targets.
    fn entity_name(&self) -> &str;

    /// Bind the execution's domain values onto this handler's JDBC parameters.
    fn create_jdbc_parameter_bindings(
        &self,
        ctx: &ExecutionContext<'_>,
    ) -> Result<JdbcParameterBindings, Error>;

    /// Whether the generated SQL varies with the bound values (list
    /// parameters expand to their cardinality).
    fn depends_on_parameter_bindings(&self) -> bool;

    fn is_compatible_with(&self, bindings: &JdbcParameterBindings, options: &QueryOptions)
    -> bool;

    /// Run the mutation; returns the number of entities affected.
    fn execute(
        &self,
        bindings: &JdbcParameterBindings,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error>;

    /// SQL templates in execution order.
    fn sql(&self) -> Vec<String>;
}

///
/// MultiTableHandler
/// Handler produced by a multi-table strategy.
///

pub trait MultiTableHandler: Handler {}

///
/// MultiTableHandlerBuildResult
///
/// A freshly built handler and the bindings created while building it, so
/// the first execution does not bind twice.
///

pub struct MultiTableHandlerBuildResult {
    pub handler: Arc<dyn MultiTableHandler>,
    pub first_jdbc_parameter_bindings: JdbcParameterBindings,
}

///
/// HandlerBase
///
/// State every handler keeps from its build: the parameter xrefs it binds
/// through, and the list cardinalities and comment its SQL was rendered for.
///

#[derive(Debug)]
pub(crate) struct HandlerBase {
    pub(crate) entity: Arc<EntityMapping>,
    xref: Arc<DomainParameterXref>,
    jdbc_xref: JdbcParameterXref,
    expansions: BTreeMap<SqmParameterId, usize>,
    comment: Option<String>,
    session_parameter: Option<JdbcParameter>,
}

impl HandlerBase {
    pub(crate) fn new(
        entity: Arc<EntityMapping>,
        xref: &Arc<DomainParameterXref>,
        jdbc_xref: JdbcParameterXref,
        expansions: BTreeMap<SqmParameterId, usize>,
        ctx: &ExecutionContext<'_>,
    ) -> Self {
        Self {
            entity,
            xref: Arc::clone(xref),
            jdbc_xref,
            expansions,
            comment: ctx.options.comment.clone(),
            session_parameter: None,
        }
    }

    /// Parameter carrying the session uid into persistent temporary tables.
    #[must_use]
    pub(crate) const fn with_session_parameter(mut self, parameter: Option<JdbcParameter>) -> Self {
        self.session_parameter = parameter;
        self
    }

    pub(crate) fn bindings(&self, ctx: &ExecutionContext<'_>) -> Result<JdbcParameterBindings, Error> {
        let mut bindings = create_jdbc_parameter_bindings(&self.xref, &self.jdbc_xref, ctx.parameters)?;
        if let Some(parameter) = self.session_parameter {
            bindings.add_binding(parameter, Value::from(ctx.session_uid));
        }

        Ok(bindings)
    }

    pub(crate) fn depends_on_parameter_bindings(&self) -> bool {
        self.xref
            .query_parameters()
            .any(|p| self.xref.allows_multi_valued(p))
    }

    pub(crate) fn is_compatible_with(
        &self,
        bindings: &JdbcParameterBindings,
        options: &QueryOptions,
    ) -> bool {
        bindings.expansions() == &self.expansions && options.comment == self.comment
    }
}
