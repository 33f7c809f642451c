//! Per-table statement shapes shared by the mutation handlers.

use crate::{
    error::Error,
    model::{EntityMapping, MappingError, Metamodel, TableMapping},
    sql::{
        Assignment, BinaryOperator, DeleteStatement, Expression, Predicate, SelectItem,
        SelectStatement, SqmToSqlConverter, Statement, TableGroup, UpdateStatement,
    },
    sqm::{SqmExpression, SqmPredicate, SqmRoot, SqmUpdateStatement},
};
use std::collections::{BTreeMap, BTreeSet};

///
/// TableMutation
///
/// One physical table touched by a mutation, keyed on the column holding
/// the entity id. `assignments` is `None` for deletes.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TableMutation {
    pub(crate) table: String,
    pub(crate) key_column: String,
    pub(crate) assignments: Option<Vec<Assignment>>,
}

impl TableMutation {
    fn delete(table: &str, key_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            assignments: None,
        }
    }

    fn delete_table(table: &TableMapping) -> Self {
        Self::delete(&table.name, &table.key_column)
    }

    pub(crate) fn key(&self) -> Expression {
        Expression::column(None, &self.key_column)
    }

    /// The statement restricted to the rows `restriction` selects.
    pub(crate) fn statement(&self, restriction: Predicate) -> Statement {
        match &self.assignments {
            Some(assignments) => Statement::Update(UpdateStatement {
                table: self.table.clone(),
                assignments: assignments.clone(),
                predicate: Some(restriction),
            }),
            None => Statement::Delete(DeleteStatement {
                table: self.table.clone(),
                predicate: Some(restriction),
            }),
        }
    }

    /// `key in (select id from <table> [where ...])`
    pub(crate) fn keyed_on(&self, ids: &SelectStatement) -> Statement {
        self.statement(Predicate::InSubquery {
            expression: self.key(),
            subquery: Box::new(ids.clone()),
            negated: false,
        })
    }
}

/// `select <id> from <target tables> where <predicate> [and <discriminator>]`
/// with the target registered under generated aliases.
pub(crate) fn matching_ids(
    converter: &mut SqmToSqlConverter<'_>,
    target: &SqmRoot,
    predicate: Option<&SqmPredicate>,
) -> Result<(TableGroup, SelectStatement), Error> {
    let group = converter.register_root(target)?;

    let mut predicates = Vec::new();
    if let Some(predicate) = predicate {
        predicates.push(converter.predicate(predicate)?);
    }
    predicates.extend(group.type_restriction(converter.metamodel()));

    let select = SelectStatement {
        selections: vec![SelectItem {
            expression: group.id_expression(),
            alias: None,
        }],
        from: vec![group.from_item()],
        predicate: Predicate::all(predicates),
        ..SelectStatement::default()
    };

    Ok((group, select))
}

/// Tables a delete of `entity` must clear, in execution order: value
/// collections of the whole hierarchy, then the hierarchy's own tables from
/// the leaves up, the root table last.
pub(crate) fn delete_mutations(metamodel: &Metamodel, entity: &EntityMapping) -> Vec<TableMutation> {
    let hierarchy = metamodel.hierarchy_of(entity);
    let mut seen = BTreeSet::new();
    let mut mutations = Vec::new();

    for member in &hierarchy {
        for (_, collection) in member.collections() {
            if seen.insert(collection.table.to_ascii_lowercase()) {
                mutations.push(TableMutation::delete(
                    &collection.table,
                    &collection.key_column,
                ));
            }
        }
    }

    let root = entity.root_table();
    seen.insert(root.name.to_ascii_lowercase());
    for member in hierarchy.iter().rev() {
        for table in member.tables.iter().rev() {
            if seen.insert(table.name.to_ascii_lowercase()) {
                mutations.push(TableMutation::delete_table(table));
            }
        }
    }
    mutations.push(TableMutation::delete_table(root));

    mutations
}

/// Group `update`'s assignments by the table their column lives in.
///
/// The target is registered unqualified, so assignment values (and any
/// predicate converted afterwards) reference the target's columns bare.
/// A value may only read columns of the table it is assigned into.
pub(crate) fn update_mutations(
    converter: &mut SqmToSqlConverter<'_>,
    update: &SqmUpdateStatement,
    query: &str,
) -> Result<(TableGroup, Vec<TableMutation>), Error> {
    let group = converter.register_target(&update.target)?;
    let entity = &group.entity;
    let mut per_table: BTreeMap<usize, Vec<Assignment>> = BTreeMap::new();

    for assignment in &update.assignments {
        let (table, column) = assignment_column(entity, &assignment.attribute, query)?;

        let mut referenced = BTreeSet::new();
        referenced_tables(entity, &assignment.value, &mut referenced);
        if referenced.iter().any(|t| *t != table) {
            return Err(Error::semantic(
                format!(
                    "value assigned to '{}' reads columns of another table of '{}'",
                    assignment.attribute, entity.name
                ),
                query,
            ));
        }

        let value = converter.expression(&assignment.value)?;
        per_table
            .entry(table)
            .or_default()
            .push(Assignment { column, value });
    }

    if update.versioned {
        let Some(version) = &entity.version else {
            return Err(Error::semantic(
                format!("update versioned on unversioned entity '{}'", entity.name),
                query,
            ));
        };
        let assignments = per_table.entry(0).or_default();
        if assignments.iter().any(|a| a.column == version.column) {
            return Err(Error::semantic(
                "update versioned cannot also assign the version",
                query,
            ));
        }
        assignments.push(version_increment(&version.column));
    }

    let mutations = per_table
        .into_iter()
        .map(|(index, assignments)| {
            let table = &entity.tables[index];
            TableMutation {
                table: table.name.clone(),
                key_column: table.key_column.clone(),
                assignments: Some(assignments),
            }
        })
        .collect();

    Ok((group, mutations))
}

/// `version = version + 1`
pub(crate) fn version_increment(column: &str) -> Assignment {
    Assignment {
        column: column.to_string(),
        value: Expression::Binary {
            op: BinaryOperator::Add,
            lhs: Box::new(Expression::column(None, column)),
            rhs: Box::new(Expression::literal(1)),
        },
    }
}

fn assignment_column(
    entity: &EntityMapping,
    attribute: &str,
    query: &str,
) -> Result<(usize, String), Error> {
    if attribute == "id" || entity.is_identifier(attribute) {
        return Err(Error::semantic(
            format!("the identifier of '{}' cannot be assigned", entity.name),
            query,
        ));
    }
    if let Some(version) = entity.version.as_ref().filter(|v| v.attribute == attribute) {
        return Ok((0, version.column.clone()));
    }
    if let Some(basic) = entity.basic(attribute) {
        return Ok((basic.table, basic.column.clone()));
    }
    if entity.collection(attribute).is_some() {
        return Err(Error::semantic(
            format!("collection '{attribute}' cannot be assigned"),
            query,
        ));
    }

    Err(MappingError::UnknownAttribute {
        entity: entity.name.clone(),
        attribute: attribute.to_string(),
    }
    .into())
}

fn referenced_tables(entity: &EntityMapping, expression: &SqmExpression, out: &mut BTreeSet<usize>) {
    match expression {
        SqmExpression::Path(path) => {
            if let Some(basic) = entity.basic(&path.attribute) {
                out.insert(basic.table);
            } else {
                // identifier, version and unknown attributes read the root
                out.insert(0);
            }
        }
        SqmExpression::Entity(_) | SqmExpression::CollectionProperty { .. } => {
            out.insert(0);
        }
        SqmExpression::Binary { lhs, rhs, .. } => {
            referenced_tables(entity, lhs, out);
            referenced_tables(entity, rhs, out);
        }
        SqmExpression::Negate(inner) | SqmExpression::Function { argument: inner, .. } => {
            referenced_tables(entity, inner, out);
        }
        SqmExpression::Aggregate { argument, .. } => {
            if let Some(argument) = argument {
                referenced_tables(entity, argument, out);
            }
        }
        SqmExpression::Literal(_) | SqmExpression::Parameter(_) => {}
    }
}
