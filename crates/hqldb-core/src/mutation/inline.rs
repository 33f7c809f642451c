use crate::{
    error::Error,
    jdbc::{JdbcOperation, JdbcParameterBindings},
    mutation::{
        AfterUseAction, BeforeUseAction, Handler, MultiTableHandler,
        MultiTableHandlerBuildResult, SqmMultiTableMutationStrategy,
        handler::HandlerBase,
        tables::{TableMutation, delete_mutations, matching_ids, update_mutations},
    },
    query::{ExecutionContext, QueryOptions},
    sql::{Expression, Predicate, SqmToSqlConverter, Statement},
    sqm::{DomainParameterXref, SqmDeleteOrUpdateStatement},
    value::Value,
};
use std::sync::Arc;
use tracing::debug;

///
/// InlineMutationStrategy
///
/// Multi-table `update`/`delete` without temporary tables: the matching
/// ids are selected into memory and inlined into each table's statement.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct InlineMutationStrategy;

impl InlineMutationStrategy {
    #[must_use]
    pub const fn before_use_action() -> BeforeUseAction {
        BeforeUseAction::None
    }

    #[must_use]
    pub const fn after_use_action() -> AfterUseAction {
        AfterUseAction::None
    }
}

impl SqmMultiTableMutationStrategy for InlineMutationStrategy {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn build_handler(
        &self,
        statement: &SqmDeleteOrUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<MultiTableHandlerBuildResult, Error> {
        let handler = InlineHandler::build(statement, xref, ctx)?;
        let first_jdbc_parameter_bindings = handler.create_jdbc_parameter_bindings(ctx)?;

        Ok(MultiTableHandlerBuildResult {
            handler: Arc::new(handler),
            first_jdbc_parameter_bindings,
        })
    }
}

///
/// InlineHandler
///

#[derive(Debug)]
pub struct InlineHandler {
    base: HandlerBase,
    id_select: JdbcOperation,
    mutations: Vec<TableMutation>,
}

impl InlineHandler {
    fn build(
        statement: &SqmDeleteOrUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Self, Error> {
        let expansions = ctx.parameters.expansions(xref);
        let mut converter = SqmToSqlConverter::new(ctx.metamodel, ctx.query, &expansions);

        let (group, ids) = matching_ids(&mut converter, statement.target(), statement.predicate())?;
        let entity = Arc::clone(&group.entity);
        let id_select = ctx.operation(Statement::Select(ids));
        let mutations = match statement {
            SqmDeleteOrUpdateStatement::Delete(_) => delete_mutations(ctx.metamodel, &entity),
            SqmDeleteOrUpdateStatement::Update(update) => {
                update_mutations(&mut converter, update, ctx.query)?.1
            }
        };

        let jdbc_xref = converter.finish();
        debug!(entity = %entity.name, "built inline mutation handler");

        Ok(Self {
            base: HandlerBase::new(entity, xref, jdbc_xref, expansions, ctx),
            id_select,
            mutations,
        })
    }

    fn restriction(mutation: &TableMutation, ids: &[Value]) -> Predicate {
        Predicate::InList {
            expression: mutation.key(),
            list: ids.iter().cloned().map(Expression::Literal).collect(),
            negated: false,
        }
    }
}

impl Handler for InlineHandler {
    fn entity_name(&self) -> &str {
        &self.base.entity.name
    }

    fn create_jdbc_parameter_bindings(
        &self,
        ctx: &ExecutionContext<'_>,
    ) -> Result<JdbcParameterBindings, Error> {
        self.base.bindings(ctx)
    }

    fn depends_on_parameter_bindings(&self) -> bool {
        self.base.depends_on_parameter_bindings()
    }

    fn is_compatible_with(&self, bindings: &JdbcParameterBindings, options: &QueryOptions) -> bool {
        self.base.is_compatible_with(bindings, options)
    }

    fn execute(
        &self,
        bindings: &JdbcParameterBindings,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        let ids: Vec<Value> = ctx
            .coordinator
            .execute_query(&self.id_select, bindings)?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        for mutation in &self.mutations {
            let operation = ctx.operation(mutation.statement(Self::restriction(mutation, &ids)));
            ctx.coordinator.execute_update(&operation, bindings)?;
        }

        Ok(ids.len() as u64)
    }

    fn sql(&self) -> Vec<String> {
        // ids are only known at execution; templates show a null stand-in
        let placeholder = [Value::Null];

        std::iter::once(self.id_select.sql().to_string())
            .chain(self.mutations.iter().map(|m| {
                JdbcOperation::new(m.statement(Self::restriction(m, &placeholder)), None)
                    .sql()
                    .to_string()
            }))
            .collect()
    }
}

impl MultiTableHandler for InlineHandler {}
