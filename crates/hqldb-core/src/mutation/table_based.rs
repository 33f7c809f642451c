use crate::{
    error::Error,
    jdbc::{JdbcConnectionAccess, JdbcOperation, JdbcParameterBindings},
    model::Metamodel,
    mutation::{
        Handler, MultiTableHandler, MultiTableHandlerBuildResult, SESSION_UID_COLUMN,
        SqmMultiTableMutationStrategy, TemporaryTable, TemporaryTableKind,
        handler::HandlerBase,
        requires_multi_table,
        strategy::{create_temporary_tables, drop_temporary_tables},
        tables::{delete_mutations, matching_ids, update_mutations},
        temptable::execute_with_temporary_table,
    },
    query::{ExecutionContext, QueryOptions, StrategyContext},
    sql::{
        Expression, InsertSource, InsertStatement, SelectItem, SelectStatement, SqmToSqlConverter,
        Statement,
    },
    sqm::{DomainParameterXref, SqmDeleteOrUpdateStatement},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

///
/// TemporaryTableMutationStrategy
///
/// Multi-table `update`/`delete` through an `HT_<root table>` id table:
/// matching ids are inserted first, then every affected table is mutated
/// with its key restricted to the id table.
///

#[derive(Clone, Copy, Debug)]
pub struct TemporaryTableMutationStrategy {
    kind: TemporaryTableKind,
}

impl TemporaryTableMutationStrategy {
    #[must_use]
    pub const fn new(kind: TemporaryTableKind) -> Self {
        Self { kind }
    }

    #[must_use]
    pub const fn kind(&self) -> TemporaryTableKind {
        self.kind
    }

    /// One id table per multi-table hierarchy; local tables are per use.
    fn factory_tables(&self, metamodel: &Metamodel) -> Vec<TemporaryTable> {
        if self.kind == TemporaryTableKind::Local {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        metamodel
            .entities()
            .filter(|e| !e.is_subclass() && requires_multi_table(metamodel, e))
            .map(|e| TemporaryTable::id_table(e, self.kind))
            .filter(|t| seen.insert(t.name().to_ascii_lowercase()))
            .collect()
    }
}

impl SqmMultiTableMutationStrategy for TemporaryTableMutationStrategy {
    fn name(&self) -> &'static str {
        match self.kind {
            TemporaryTableKind::Local => "local_temporary",
            TemporaryTableKind::Global => "global_temporary",
            TemporaryTableKind::Persistent => "persistent",
        }
    }

    fn prepare(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        create_temporary_tables(&self.factory_tables(ctx.metamodel), ctx, access)
    }

    fn release(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        drop_temporary_tables(&self.factory_tables(ctx.metamodel), ctx, access)
    }

    fn build_handler(
        &self,
        statement: &SqmDeleteOrUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<MultiTableHandlerBuildResult, Error> {
        let handler = TableBasedHandler::build(statement, xref, ctx, self.kind)?;
        let first_jdbc_parameter_bindings = handler.create_jdbc_parameter_bindings(ctx)?;

        Ok(MultiTableHandlerBuildResult {
            handler: Arc::new(handler),
            first_jdbc_parameter_bindings,
        })
    }
}

///
/// TableBasedHandler
///
/// Update or delete driven by an id table. The insert into the id table
/// evaluates the original predicate once; the per-table statements only
/// compare keys.
///

#[derive(Debug)]
pub struct TableBasedHandler {
    base: HandlerBase,
    id_table: TemporaryTable,
    id_insert: JdbcOperation,
    statements: Vec<JdbcOperation>,
}

impl TableBasedHandler {
    fn build(
        statement: &SqmDeleteOrUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
        kind: TemporaryTableKind,
    ) -> Result<Self, Error> {
        let expansions = ctx.parameters.expansions(xref);
        let mut converter = SqmToSqlConverter::new(ctx.metamodel, ctx.query, &expansions);

        let (group, mut ids) = matching_ids(&mut converter, statement.target(), statement.predicate())?;
        let entity = Arc::clone(&group.entity);
        let id_table = TemporaryTable::id_table(&entity, kind);
        let session_parameter = id_table
            .has_session_column()
            .then(|| converter.create_parameter());

        let mut columns = vec![entity.id_column().to_string()];
        if let Some(parameter) = session_parameter {
            columns.push(SESSION_UID_COLUMN.to_string());
            ids.selections.push(SelectItem {
                expression: Expression::Parameter(parameter),
                alias: None,
            });
        }
        let id_insert = ctx.operation(Statement::Insert(InsertStatement {
            table: id_table.name().to_string(),
            columns,
            source: InsertSource::Select(Box::new(ids)),
        }));

        let mutations = match statement {
            SqmDeleteOrUpdateStatement::Delete(_) => delete_mutations(ctx.metamodel, &entity),
            SqmDeleteOrUpdateStatement::Update(update) => {
                update_mutations(&mut converter, update, ctx.query)?.1
            }
        };
        let id_select = SelectStatement::column_from(
            id_table.name(),
            entity.id_column(),
            session_parameter.and_then(|p| id_table.session_restriction(p)),
        );
        let statements = mutations
            .iter()
            .map(|m| ctx.operation(m.keyed_on(&id_select)))
            .collect();

        let jdbc_xref = converter.finish();
        debug!(
            entity = %entity.name,
            id_table = id_table.name(),
            "built table-based mutation handler"
        );

        Ok(Self {
            base: HandlerBase::new(entity, xref, jdbc_xref, expansions, ctx)
                .with_session_parameter(session_parameter),
            id_table,
            id_insert,
            statements,
        })
    }

    #[must_use]
    pub const fn id_table(&self) -> &TemporaryTable {
        &self.id_table
    }
}

impl Handler for TableBasedHandler {
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
        execute_with_temporary_table(&self.id_table, ctx, || {
            let count = ctx.coordinator.execute_update(&self.id_insert, bindings)?;
            if count == 0 {
                return Ok(0);
            }
            for statement in &self.statements {
                ctx.coordinator.execute_update(statement, bindings)?;
            }

            Ok(count)
        })
    }

    fn sql(&self) -> Vec<String> {
        std::iter::once(&self.id_insert)
            .chain(&self.statements)
            .map(|op| op.sql().to_string())
            .collect()
    }
}

impl MultiTableHandler for TableBasedHandler {}
