use crate::{
    error::{Error, InternalError},
    jdbc::{JdbcConnectionAccess, JdbcOperation, JdbcParameter, JdbcParameterBindings},
    model::{EntityMapping, IdGeneration, MappingError, Metamodel, TableRole},
    mutation::{
        Handler, MultiTableHandler, MultiTableHandlerBuildResult, ROW_NUMBER_COLUMN,
        SESSION_UID_COLUMN, SqmMultiTableInsertStrategy, TemporaryTable, TemporaryTableKind,
        handler::HandlerBase,
        strategy::{create_temporary_tables, drop_temporary_tables},
        temptable::execute_with_temporary_table,
        uses_insert_strategy,
    },
    query::{ExecutionContext, QueryOptions, StrategyContext},
    sql::{
        Assignment, Expression, FromItem, InsertSource, InsertStatement, Predicate, SelectItem,
        SelectStatement, SortSpecification, SqmToSqlConverter, Statement, TableReference,
        UpdateStatement,
    },
    sqm::{DomainParameterXref, SqmInsertSource, SqmInsertStatement},
    value::Value,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

///
/// InsertTarget
/// What one attribute of an insert's column list writes to.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum InsertTarget {
    Identifier,
    Basic {
        attribute: String,
        table: usize,
        column: String,
    },
}

impl InsertTarget {
    /// Resolve an insert's attribute list against `entity`.
    pub(crate) fn resolve_all(
        entity: &EntityMapping,
        attributes: &[String],
        query: &str,
    ) -> Result<Vec<Self>, Error> {
        let mut seen = BTreeSet::new();
        let mut targets = Vec::with_capacity(attributes.len());

        for attribute in attributes {
            if !seen.insert(attribute.as_str()) {
                return Err(Error::semantic(
                    format!("attribute '{attribute}' is listed twice"),
                    query,
                ));
            }
            targets.push(Self::resolve(entity, attribute, query)?);
        }

        Ok(targets)
    }

    fn resolve(entity: &EntityMapping, attribute: &str, query: &str) -> Result<Self, Error> {
        if attribute == "id" || entity.is_identifier(attribute) {
            return Ok(Self::Identifier);
        }
        if entity.is_version(attribute) {
            return Err(Error::semantic(
                format!("version '{attribute}' is seeded by insert and cannot be listed"),
                query,
            ));
        }
        if let Some(basic) = entity.basic(attribute) {
            return Ok(Self::Basic {
                attribute: attribute.to_string(),
                table: basic.table,
                column: basic.column.clone(),
            });
        }
        if entity.collection(attribute).is_some() {
            return Err(Error::semantic(
                format!("collection '{attribute}' cannot be inserted"),
                query,
            ));
        }

        Err(MappingError::UnknownAttribute {
            entity: entity.name.clone(),
            attribute: attribute.to_string(),
        }
        .into())
    }
}

/// Error raised when an assigned identifier is missing from an insert.
pub(crate) fn missing_identifier(entity: &EntityMapping) -> Error {
    MappingError::MissingIdentifier {
        entity: entity.name.clone(),
    }
    .into()
}

/// Seed columns of the root table: version `0` and the discriminator.
pub(crate) fn root_seed(entity: &EntityMapping) -> Vec<(String, Expression)> {
    let mut seed = Vec::new();
    if let Some(version) = &entity.version {
        seed.push((version.column.clone(), Expression::literal(0)));
    }
    if let Some(discriminator) = &entity.discriminator {
        seed.push((
            discriminator.column.clone(),
            Expression::Literal(discriminator.value.clone()),
        ));
    }

    seed
}

///
/// TemporaryTableInsertStrategy
///
/// Multi-table `insert` through an `HTE_<entity>` table: rows land there
/// numbered, missing ids are generated per row, then each physical table
/// is filled from it.
///

#[derive(Clone, Copy, Debug)]
pub struct TemporaryTableInsertStrategy {
    kind: TemporaryTableKind,
}

impl TemporaryTableInsertStrategy {
    #[must_use]
    pub const fn new(kind: TemporaryTableKind) -> Self {
        Self { kind }
    }

    #[must_use]
    pub const fn kind(&self) -> TemporaryTableKind {
        self.kind
    }

    fn factory_tables(&self, metamodel: &Metamodel) -> Vec<TemporaryTable> {
        if self.kind == TemporaryTableKind::Local {
            return Vec::new();
        }

        metamodel
            .entities()
            .filter(|e| uses_insert_strategy(e))
            .map(|e| TemporaryTable::entity_table(e, self.kind))
            .collect()
    }
}

impl SqmMultiTableInsertStrategy for TemporaryTableInsertStrategy {
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
        statement: &SqmInsertStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<MultiTableHandlerBuildResult, Error> {
        let handler = TableBasedInsertHandler::build(statement, xref, ctx, self.kind)?;
        let first_jdbc_parameter_bindings = handler.create_jdbc_parameter_bindings(ctx)?;

        Ok(MultiTableHandlerBuildResult {
            handler: Arc::new(handler),
            first_jdbc_parameter_bindings,
        })
    }
}

///
/// IdAssignment
/// Statements that fill missing ids into the entity table, one row at a time.
///

#[derive(Debug)]
struct IdAssignment {
    row_numbers: JdbcOperation,
    assign: JdbcOperation,
    id_parameter: JdbcParameter,
    row_parameter: JdbcParameter,
}

///
/// TableBasedInsertHandler
///

#[derive(Debug)]
pub struct TableBasedInsertHandler {
    base: HandlerBase,
    entity_table: TemporaryTable,
    entity_insert: JdbcOperation,
    id_assignment: Option<IdAssignment>,
    table_inserts: Vec<JdbcOperation>,
}

impl TableBasedInsertHandler {
    fn build(
        statement: &SqmInsertStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
        kind: TemporaryTableKind,
    ) -> Result<Self, Error> {
        let expansions = ctx.parameters.expansions(xref);
        let mut converter = SqmToSqlConverter::new(ctx.metamodel, ctx.query, &expansions);

        let entity = converter.entity(&statement.target)?;
        let targets = InsertTarget::resolve_all(&entity, &statement.attributes, ctx.query)?;
        let entity_table = TemporaryTable::entity_table(&entity, kind);
        let session_parameter = entity_table
            .has_session_column()
            .then(|| converter.create_parameter());
        let session_restriction =
            session_parameter.and_then(|p| entity_table.session_restriction(p));

        // rows into the entity table, numbered
        let mut columns = vec![ROW_NUMBER_COLUMN.to_string()];
        columns.extend(targets.iter().map(|t| match t {
            InsertTarget::Identifier => entity.id_column().to_string(),
            InsertTarget::Basic { attribute, .. } => attribute.clone(),
        }));
        let mut trailing = Vec::new();
        if let Some(parameter) = session_parameter {
            columns.push(SESSION_UID_COLUMN.to_string());
            trailing.push(Expression::Parameter(parameter));
        }

        let source = match &statement.source {
            SqmInsertSource::Values(rows) => {
                let mut converted = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut values = vec![Expression::RowNumber];
                    for value in row {
                        values.push(converter.expression(value)?);
                    }
                    values.extend(trailing.iter().cloned());
                    converted.push(values);
                }
                InsertSource::Values(converted)
            }
            SqmInsertSource::Select(select) => {
                let mut converted = converter.convert_select(select)?;
                converted.selections.insert(
                    0,
                    SelectItem {
                        expression: Expression::RowNumber,
                        alias: None,
                    },
                );
                converted
                    .selections
                    .extend(trailing.iter().cloned().map(|expression| SelectItem {
                        expression,
                        alias: None,
                    }));
                InsertSource::Select(Box::new(converted))
            }
        };
        let entity_insert = ctx.operation(Statement::Insert(InsertStatement {
            table: entity_table.name().to_string(),
            columns,
            source,
        }));

        // missing ids
        let has_identifier = targets.contains(&InsertTarget::Identifier);
        let id_assignment = if has_identifier {
            None
        } else {
            match entity.identifier.generation {
                IdGeneration::Assigned => return Err(missing_identifier(&entity)),
                IdGeneration::Sequence { .. } => {
                    let id_parameter = converter.create_parameter();
                    let row_parameter = converter.create_parameter();
                    Some(IdAssignment {
                        row_numbers: ctx.operation(Statement::Select(SelectStatement {
                            order_by: vec![SortSpecification {
                                expression: Expression::column(None, ROW_NUMBER_COLUMN),
                                descending: false,
                            }],
                            ..SelectStatement::column_from(
                                entity_table.name(),
                                ROW_NUMBER_COLUMN,
                                session_restriction.clone(),
                            )
                        })),
                        assign: ctx.operation(Statement::Update(UpdateStatement {
                            table: entity_table.name().to_string(),
                            assignments: vec![Assignment {
                                column: entity.id_column().to_string(),
                                value: Expression::Parameter(id_parameter),
                            }],
                            predicate: Predicate::all(
                                std::iter::once(Predicate::eq(
                                    Expression::column(None, ROW_NUMBER_COLUMN),
                                    Expression::Parameter(row_parameter),
                                ))
                                .chain(session_restriction.clone()),
                            ),
                        })),
                        id_parameter,
                        row_parameter,
                    })
                }
            }
        };

        // entity table into every physical table
        let mut table_inserts = Vec::with_capacity(entity.tables.len());
        for (index, table) in entity.tables.iter().enumerate() {
            let listed: Vec<&str> = targets
                .iter()
                .filter_map(|t| match t {
                    InsertTarget::Basic {
                        attribute, table, ..
                    } if *table == index => Some(attribute.as_str()),
                    _ => None,
                })
                .collect();

            let mut predicates: Vec<Predicate> = session_restriction.iter().cloned().collect();
            if table.optional {
                if listed.is_empty() {
                    continue;
                }
                predicates.push(Predicate::Or(
                    listed
                        .iter()
                        .map(|attribute| Predicate::Null {
                            expression: Expression::column(None, attribute),
                            negated: true,
                        })
                        .collect(),
                ));
            }

            let mut columns = vec![table.key_column.clone()];
            let mut selections = vec![Expression::column(None, entity.id_column())];
            for (attribute, basic) in entity.table_attributes(index) {
                columns.push(basic.column.clone());
                selections.push(Expression::column(None, attribute));
            }
            if table.role == TableRole::Root {
                for (column, value) in root_seed(&entity) {
                    columns.push(column);
                    selections.push(value);
                }
            }

            table_inserts.push(ctx.operation(Statement::Insert(InsertStatement {
                table: table.name.clone(),
                columns,
                source: InsertSource::Select(Box::new(SelectStatement {
                    selections: selections
                        .into_iter()
                        .map(|expression| SelectItem {
                            expression,
                            alias: None,
                        })
                        .collect(),
                    from: vec![FromItem {
                        root: TableReference {
                            table: entity_table.name().to_string(),
                            alias: String::new(),
                        },
                        joins: Vec::new(),
                    }],
                    predicate: Predicate::all(predicates),
                    ..SelectStatement::default()
                })),
            })));
        }

        let jdbc_xref = converter.finish();
        debug!(
            entity = %entity.name,
            entity_table = entity_table.name(),
            generates_ids = id_assignment.is_some(),
            "built table-based insert handler"
        );

        Ok(Self {
            base: HandlerBase::new(entity, xref, jdbc_xref, expansions, ctx)
                .with_session_parameter(session_parameter),
            entity_table,
            entity_insert,
            id_assignment,
            table_inserts,
        })
    }

    fn assign_ids(
        &self,
        assignment: &IdAssignment,
        bindings: &JdbcParameterBindings,
        ctx: &ExecutionContext<'_>,
    ) -> Result<(), Error> {
        let entity = &self.base.entity.name;
        let generator = ctx.id_generators.get(entity).ok_or_else(|| {
            InternalError::mutation_invariant(format!("no identifier generator for '{entity}'"))
        })?;

        for row in ctx
            .coordinator
            .execute_query(&assignment.row_numbers, bindings)?
        {
            let row_number = row.into_iter().next().unwrap_or(Value::Null);
            let id = generator.generate(ctx.coordinator)?;
            let row_bindings = bindings
                .clone()
                .with_binding(assignment.id_parameter, id)
                .with_binding(assignment.row_parameter, row_number);
            ctx.coordinator
                .execute_update(&assignment.assign, &row_bindings)?;
        }

        Ok(())
    }

    #[must_use]
    pub const fn entity_table(&self) -> &TemporaryTable {
        &self.entity_table
    }
}

impl Handler for TableBasedInsertHandler {
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
        execute_with_temporary_table(&self.entity_table, ctx, || {
            let count = ctx.coordinator.execute_update(&self.entity_insert, bindings)?;
            if count == 0 {
                return Ok(0);
            }
            if let Some(assignment) = &self.id_assignment {
                self.assign_ids(assignment, bindings, ctx)?;
            }
            for insert in &self.table_inserts {
                ctx.coordinator.execute_update(insert, bindings)?;
            }

            Ok(count)
        })
    }

    fn sql(&self) -> Vec<String> {
        let mut sql = vec![self.entity_insert.sql().to_string()];
        if let Some(assignment) = &self.id_assignment {
            sql.push(assignment.row_numbers.sql().to_string());
            sql.push(assignment.assign.sql().to_string());
        }
        sql.extend(self.table_inserts.iter().map(|op| op.sql().to_string()));

        sql
    }
}

impl MultiTableHandler for TableBasedInsertHandler {}
