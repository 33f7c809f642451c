//! Handlers for mutations that touch exactly one table.

use crate::{
    error::{Error, InternalError},
    jdbc::{JdbcOperation, JdbcParameterBindings},
    model::IdGeneration,
    mutation::{
        Handler,
        handler::HandlerBase,
        insert::{InsertTarget, missing_identifier, root_seed},
        tables::update_mutations,
    },
    query::{ExecutionContext, QueryOptions},
    sql::{
        DeleteStatement, Expression, InsertSource, InsertStatement, Predicate, SelectItem,
        SelectStatement, SqmToSqlConverter, Statement, TableGroup, UpdateStatement,
    },
    sqm::{
        DomainParameterXref, SqmDeleteStatement, SqmInsertSource, SqmInsertStatement,
        SqmUpdateStatement,
    },
};
use std::{collections::BTreeSet, sync::Arc};

macro_rules! delegate_to_base {
    () => {
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

        fn is_compatible_with(
            &self,
            bindings: &JdbcParameterBindings,
            options: &QueryOptions,
        ) -> bool {
            self.base.is_compatible_with(bindings, options)
        }
    };
}

// ─────────────────────────────────────────────
// Delete
// ─────────────────────────────────────────────

///
/// SimpleDeleteHandler
///
/// `delete from <table> where ...`, preceded by one delete per value
/// collection keyed on the same restriction.
///

#[derive(Debug)]
pub struct SimpleDeleteHandler {
    base: HandlerBase,
    collection_deletes: Vec<JdbcOperation>,
    delete: JdbcOperation,
}

impl SimpleDeleteHandler {
    pub(crate) fn build(
        statement: &SqmDeleteStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Self, Error> {
        let expansions = ctx.parameters.expansions(xref);
        let mut converter = SqmToSqlConverter::new(ctx.metamodel, ctx.query, &expansions);
        let group = converter.register_target(&statement.target)?;
        let entity = Arc::clone(&group.entity);

        let mut seen = BTreeSet::new();
        let mut collection_deletes = Vec::new();
        for member in ctx.metamodel.hierarchy_of(&entity) {
            for (_, collection) in member.collections() {
                if !seen.insert(collection.table.to_ascii_lowercase()) {
                    continue;
                }
                let owners = SelectStatement::column_from(
                    &entity.root_table().name,
                    entity.id_column(),
                    restriction(&mut converter, statement, &group, ctx)?,
                );
                collection_deletes.push(ctx.operation(Statement::Delete(DeleteStatement {
                    table: collection.table.clone(),
                    predicate: Some(Predicate::InSubquery {
                        expression: Expression::column(None, &collection.key_column),
                        subquery: Box::new(owners),
                        negated: false,
                    }),
                })));
            }
        }

        let delete = ctx.operation(Statement::Delete(DeleteStatement {
            table: entity.root_table().name.clone(),
            predicate: restriction(&mut converter, statement, &group, ctx)?,
        }));

        let jdbc_xref = converter.finish();

        Ok(Self {
            base: HandlerBase::new(entity, xref, jdbc_xref, expansions, ctx),
            collection_deletes,
            delete,
        })
    }
}

/// The delete's predicate plus the discriminator restriction, converted
/// afresh for each statement that needs it.
fn restriction(
    converter: &mut SqmToSqlConverter<'_>,
    statement: &SqmDeleteStatement,
    group: &TableGroup,
    ctx: &ExecutionContext<'_>,
) -> Result<Option<Predicate>, Error> {
    let mut predicates = Vec::new();
    if let Some(predicate) = &statement.predicate {
        predicates.push(converter.predicate(predicate)?);
    }
    predicates.extend(group.type_restriction(ctx.metamodel));

    Ok(Predicate::all(predicates))
}

impl Handler for SimpleDeleteHandler {
    delegate_to_base!();

    fn execute(
        &self,
        bindings: &JdbcParameterBindings,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        for delete in &self.collection_deletes {
            ctx.coordinator.execute_update(delete, bindings)?;
        }

        ctx.coordinator.execute_update(&self.delete, bindings)
    }

    fn sql(&self) -> Vec<String> {
        self.collection_deletes
            .iter()
            .chain(std::iter::once(&self.delete))
            .map(|op| op.sql().to_string())
            .collect()
    }
}

// ─────────────────────────────────────────────
// Update
// ─────────────────────────────────────────────

///
/// SimpleUpdateHandler
///

#[derive(Debug)]
pub struct SimpleUpdateHandler {
    base: HandlerBase,
    update: JdbcOperation,
}

impl SimpleUpdateHandler {
    pub(crate) fn build(
        statement: &SqmUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Self, Error> {
        let expansions = ctx.parameters.expansions(xref);
        let mut converter = SqmToSqlConverter::new(ctx.metamodel, ctx.query, &expansions);

        let (group, mutations) = update_mutations(&mut converter, statement, ctx.query)?;
        let entity = Arc::clone(&group.entity);
        let assignments = match <[_; 1]>::try_from(mutations) {
            Ok([mutation]) => mutation.assignments.unwrap_or_default(),
            Err(mutations) => {
                return Err(InternalError::mutation_invariant(format!(
                    "single-table update of '{}' spans {} tables",
                    entity.name,
                    mutations.len()
                ))
                .into());
            }
        };

        let mut predicates = Vec::new();
        if let Some(predicate) = &statement.predicate {
            predicates.push(converter.predicate(predicate)?);
        }
        predicates.extend(group.type_restriction(ctx.metamodel));

        let update = ctx.operation(Statement::Update(UpdateStatement {
            table: entity.root_table().name.clone(),
            assignments,
            predicate: Predicate::all(predicates),
        }));
        let jdbc_xref = converter.finish();

        Ok(Self {
            base: HandlerBase::new(entity, xref, jdbc_xref, expansions, ctx),
            update,
        })
    }
}

impl Handler for SimpleUpdateHandler {
    delegate_to_base!();

    fn execute(
        &self,
        bindings: &JdbcParameterBindings,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        ctx.coordinator.execute_update(&self.update, bindings)
    }

    fn sql(&self) -> Vec<String> {
        vec![self.update.sql().to_string()]
    }
}

// ─────────────────────────────────────────────
// Insert
// ─────────────────────────────────────────────

///
/// SimpleInsertHandler
///
/// `insert into <table> (...) values|select ...`. A missing id is drawn
/// inline from an unpooled sequence.
///

#[derive(Debug)]
pub struct SimpleInsertHandler {
    base: HandlerBase,
    insert: JdbcOperation,
}

impl SimpleInsertHandler {
    pub(crate) fn build(
        statement: &SqmInsertStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Self, Error> {
        let expansions = ctx.parameters.expansions(xref);
        let mut converter = SqmToSqlConverter::new(ctx.metamodel, ctx.query, &expansions);

        let entity = converter.entity(&statement.target)?;
        let targets = InsertTarget::resolve_all(&entity, &statement.attributes, ctx.query)?;

        let mut leading = Vec::new();
        let mut columns = Vec::new();
        if !targets.contains(&InsertTarget::Identifier) {
            match &entity.identifier.generation {
                IdGeneration::Sequence {
                    name,
                    increment_size: 1,
                } => {
                    columns.push(entity.id_column().to_string());
                    leading.push(Expression::NextValue(name.clone()));
                }
                IdGeneration::Sequence { .. } => {
                    return Err(InternalError::mutation_unsupported(format!(
                        "pooled identifiers of '{}' need the insert strategy",
                        entity.name
                    ))
                    .into());
                }
                IdGeneration::Assigned => return Err(missing_identifier(&entity)),
            }
        }
        columns.extend(targets.iter().map(|t| match t {
            InsertTarget::Identifier => entity.id_column().to_string(),
            InsertTarget::Basic { column, .. } => column.clone(),
        }));
        let seed = root_seed(&entity);
        columns.extend(seed.iter().map(|(column, _)| column.clone()));
        let trailing: Vec<Expression> = seed.into_iter().map(|(_, value)| value).collect();

        let source = match &statement.source {
            SqmInsertSource::Values(rows) => {
                let mut converted = Vec::with_capacity(rows.len());
                for row in rows {
                    let mut values = leading.clone();
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
                let selected = std::mem::take(&mut converted.selections);
                converted.selections = leading
                    .iter()
                    .cloned()
                    .map(|expression| SelectItem {
                        expression,
                        alias: None,
                    })
                    .chain(selected)
                    .chain(trailing.iter().cloned().map(|expression| SelectItem {
                        expression,
                        alias: None,
                    }))
                    .collect();
                InsertSource::Select(Box::new(converted))
            }
        };

        let insert = ctx.operation(Statement::Insert(InsertStatement {
            table: entity.root_table().name.clone(),
            columns,
            source,
        }));
        let jdbc_xref = converter.finish();

        Ok(Self {
            base: HandlerBase::new(entity, xref, jdbc_xref, expansions, ctx),
            insert,
        })
    }
}

impl Handler for SimpleInsertHandler {
    delegate_to_base!();

    fn execute(
        &self,
        bindings: &JdbcParameterBindings,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        ctx.coordinator.execute_update(&self.insert, bindings)
    }

    fn sql(&self) -> Vec<String> {
        vec![self.insert.sql().to_string()]
    }
}
