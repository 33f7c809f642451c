//! Statements that write and read one entity instance by id, spread over
//! the entity's tables.

use crate::{
    error::Error,
    jdbc::{JdbcOperation, JdbcParameterAllocator, JdbcParameterBindings},
    model::{EntityData, EntityMapping, Metamodel},
    mutation::{delete_mutations, root_seed, version_increment},
    sql::{
        Assignment, DeleteStatement, Expression, InsertSource, InsertStatement, Predicate,
        SelectItem, SelectStatement, SqmToSqlConverter, Statement, UpdateStatement,
    },
    sqm::SqmRoot,
    value::Value,
};
use std::collections::BTreeMap;

///
/// PreparedStatement
///
/// One statement with its bindings. `expect_rows` marks the statement whose
/// zero row count means the instance changed or vanished underneath us.
///

#[derive(Debug)]
pub(crate) struct PreparedStatement {
    pub(crate) operation: JdbcOperation,
    pub(crate) bindings: JdbcParameterBindings,
    pub(crate) expect_rows: bool,
}

///
/// Binder
///

#[derive(Default)]
struct Binder {
    allocator: JdbcParameterAllocator,
    bindings: JdbcParameterBindings,
}

impl Binder {
    fn bind(&mut self, value: Value) -> Expression {
        let parameter = self.allocator.create();
        self.bindings.add_binding(parameter, value);

        Expression::Parameter(parameter)
    }

    fn prepare(self, statement: Statement, comment: Option<&str>, expect_rows: bool) -> PreparedStatement {
        PreparedStatement {
            operation: JdbcOperation::new(statement, comment),
            bindings: self.bindings,
            expect_rows,
        }
    }
}

fn key_equals(binder: &mut Binder, column: &str, id: &Value) -> Predicate {
    Predicate::eq(Expression::column(None, column), binder.bind(id.clone()))
}

/// Attribute values of `data` stored in table `index`, in mapping order.
fn table_values(entity: &EntityMapping, index: usize, data: &EntityData) -> Vec<(String, Value)> {
    entity
        .table_attributes(index)
        .map(|(name, basic)| (basic.column.clone(), data.value(name)))
        .collect()
}

// ─────────────────────────────────────────────
// Insert
// ─────────────────────────────────────────────

/// One insert per table, root first. Optional tables are skipped when every
/// value they would hold is null.
pub(crate) fn insert(
    entity: &EntityMapping,
    id: &Value,
    data: &EntityData,
    comment: Option<&str>,
) -> Vec<PreparedStatement> {
    let mut out = Vec::with_capacity(entity.tables.len());

    for (index, table) in entity.tables.iter().enumerate() {
        let values = table_values(entity, index, data);
        if table.optional && values.iter().all(|(_, v)| v.is_null()) {
            continue;
        }

        let mut binder = Binder::default();
        let mut columns = vec![table.key_column.clone()];
        let mut row = vec![binder.bind(id.clone())];
        if index == 0 {
            for (column, value) in root_seed(entity) {
                columns.push(column);
                row.push(value);
            }
        }
        for (column, value) in values {
            columns.push(column);
            row.push(binder.bind(value));
        }

        out.push(binder.prepare(
            Statement::Insert(InsertStatement {
                table: table.name.clone(),
                columns,
                source: InsertSource::Values(vec![row]),
            }),
            comment,
            false,
        ));
    }

    out
}

// ─────────────────────────────────────────────
// Update
// ─────────────────────────────────────────────

/// Full-state update. The root statement bumps and checks the version and
/// runs first; optional tables are rewritten as delete plus insert.
pub(crate) fn update(
    entity: &EntityMapping,
    id: &Value,
    data: &EntityData,
    comment: Option<&str>,
) -> Vec<PreparedStatement> {
    let mut out = Vec::with_capacity(entity.tables.len() + 1);

    for (index, table) in entity.tables.iter().enumerate() {
        let values = table_values(entity, index, data);

        if table.optional {
            let mut binder = Binder::default();
            let predicate = key_equals(&mut binder, &table.key_column, id);
            out.push(binder.prepare(
                Statement::Delete(DeleteStatement {
                    table: table.name.clone(),
                    predicate: Some(predicate),
                }),
                comment,
                false,
            ));

            if values.iter().any(|(_, v)| !v.is_null()) {
                let mut binder = Binder::default();
                let mut columns = vec![table.key_column.clone()];
                let mut row = vec![binder.bind(id.clone())];
                for (column, value) in values {
                    columns.push(column);
                    row.push(binder.bind(value));
                }
                out.push(binder.prepare(
                    Statement::Insert(InsertStatement {
                        table: table.name.clone(),
                        columns,
                        source: InsertSource::Values(vec![row]),
                    }),
                    comment,
                    false,
                ));
            }
            continue;
        }

        let mut binder = Binder::default();
        let mut assignments: Vec<Assignment> = values
            .into_iter()
            .map(|(column, value)| Assignment {
                column,
                value: binder.bind(value),
            })
            .collect();

        let mut predicates = vec![key_equals(&mut binder, &table.key_column, id)];
        if index == 0
            && let Some(version) = &entity.version
        {
            assignments.push(version_increment(&version.column));
            predicates.push(Predicate::eq(
                Expression::column(None, &version.column),
                binder.bind(data.value(&version.attribute)),
            ));
        }

        // the root always runs so the version and row checks happen
        if assignments.is_empty() && index != 0 {
            continue;
        }
        if assignments.is_empty() {
            assignments.push(Assignment {
                column: table.key_column.clone(),
                value: Expression::column(None, &table.key_column),
            });
        }

        out.push(binder.prepare(
            Statement::Update(UpdateStatement {
                table: table.name.clone(),
                assignments,
                predicate: Predicate::all(predicates),
            }),
            comment,
            index == 0,
        ));
    }

    out
}

// ─────────────────────────────────────────────
// Delete
// ─────────────────────────────────────────────

/// Collection rows first, then every table of the hierarchy leaf to root.
pub(crate) fn delete(
    metamodel: &Metamodel,
    entity: &EntityMapping,
    id: &Value,
    comment: Option<&str>,
) -> Vec<PreparedStatement> {
    let root = entity.root_table().name.to_ascii_lowercase();

    delete_mutations(metamodel, entity)
        .into_iter()
        .map(|mutation| {
            let mut binder = Binder::default();
            let restriction = Predicate::eq(mutation.key(), binder.bind(id.clone()));
            let expect_rows = mutation.table.to_ascii_lowercase() == root;

            binder.prepare(mutation.statement(restriction), comment, expect_rows)
        })
        .collect()
}

// ─────────────────────────────────────────────
// Load
// ─────────────────────────────────────────────

///
/// LoadPlan
///
/// `select` of one instance by id, and the attribute each column fills.
///

pub(crate) struct LoadPlan {
    pub(crate) statement: PreparedStatement,
    attributes: Vec<String>,
}

impl LoadPlan {
    pub(crate) fn new(
        metamodel: &Metamodel,
        entity: &EntityMapping,
        id: &Value,
        comment: Option<&str>,
    ) -> Result<Self, Error> {
        let expansions = BTreeMap::new();
        let mut converter = SqmToSqlConverter::new(metamodel, "", &expansions);
        let group = converter.register_root(&SqmRoot {
            entity: entity.name.clone(),
            alias: "this".to_string(),
            implicit_alias: true,
        })?;

        let mut attributes = vec![entity.identifier.attribute.clone()];
        let mut selections = vec![group.id_expression()];
        if let Some(version) = &entity.version {
            attributes.push(version.attribute.clone());
            selections.push(group.column(0, &version.column));
        }
        for (name, basic) in entity.basic_attributes() {
            attributes.push(name.to_string());
            selections.push(group.column(basic.table, &basic.column));
        }

        let id_parameter = converter.create_parameter();
        let mut predicates = vec![Predicate::eq(
            group.id_expression(),
            Expression::Parameter(id_parameter),
        )];
        predicates.extend(group.type_restriction(metamodel));

        let statement = SelectStatement {
            selections: selections
                .into_iter()
                .map(|expression| SelectItem {
                    expression,
                    alias: None,
                })
                .collect(),
            from: vec![group.from_item()],
            predicate: Predicate::all(predicates),
            ..SelectStatement::default()
        };

        Ok(Self {
            statement: PreparedStatement {
                operation: JdbcOperation::new(Statement::Select(statement), comment),
                bindings: JdbcParameterBindings::new().with_binding(id_parameter, id.clone()),
                expect_rows: false,
            },
            attributes,
        })
    }

    /// The loaded state, or `None` when no row matched.
    pub(crate) fn read(&self, rows: Vec<Vec<Value>>) -> Option<EntityData> {
        let row = rows.into_iter().next()?;

        Some(self.attributes.iter().cloned().zip(row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn sql(statements: &[PreparedStatement]) -> Vec<&str> {
        statements.iter().map(|s| s.operation.sql()).collect()
    }

    #[test]
    fn insert_skips_optional_tables_without_values() {
        let metamodel = test_support::metamodel();
        let person = metamodel.entity("Person").expect("Person should exist");

        let bare = insert(person, &Value::Int(1), &EntityData::new().with("name", "Ann"), None);
        let full = insert(
            person,
            &Value::Int(1),
            &EntityData::new()
                .with("name", "Ann")
                .with("email", "ann@example.com"),
            None,
        );

        assert_eq!(bare.len(), 1);
        assert_eq!(full.len(), 2);
        assert!(sql(&full)[1].starts_with("insert into person_detail"));
    }

    #[test]
    fn update_checks_the_version_on_the_root_table() {
        let metamodel = test_support::metamodel();
        let dog = metamodel.entity("Dog").expect("Dog should exist");

        let statements = update(
            dog,
            &Value::Int(1),
            &EntityData::new()
                .with("version", 0)
                .with("name", "Rex")
                .with("breed", "lab"),
            None,
        );

        assert_eq!(statements.len(), 2);
        assert!(statements[0].expect_rows);
        assert!(sql(&statements)[0].contains("version = version + 1"), "{:?}", sql(&statements));
        assert!(sql(&statements)[1].starts_with("update dog"));
    }

    #[test]
    fn delete_ends_with_the_root_table() {
        let metamodel = test_support::metamodel();
        let dog = metamodel.entity("Dog").expect("Dog should exist");

        let statements = delete(&metamodel, dog, &Value::Int(1), None);

        let last = statements.last().expect("delete should produce statements");
        assert!(last.expect_rows);
        assert!(last.operation.sql().starts_with("delete from animal"));
        assert_eq!(statements.iter().filter(|s| s.expect_rows).count(), 1);
    }
}
