use super::*;
use crate::sql::{
    DeleteStatement, Expression, FromItem, InsertStatement, SelectItem, SelectStatement,
    TableReference, UpdateStatement,
};

fn flights() -> InMemoryDatabase {
    let database = InMemoryDatabase::new();
    database
        .create_table(
            TableDefinition::new("flight")
                .column("id", false)
                .column("name", true)
                .column("duration", false)
                .primary_key(&["id"]),
        )
        .expect("create flight should succeed");
    database
}

fn insert_flight(id: i64, name: &str, duration: i64) -> JdbcOperation {
    JdbcOperation::new(
        Statement::Insert(InsertStatement {
            table: "flight".to_string(),
            columns: vec!["id".into(), "name".into(), "duration".into()],
            source: InsertSource::Values(vec![vec![
                Expression::literal(id),
                Expression::literal(name),
                Expression::literal(duration),
            ]]),
        }),
        None,
    )
}

fn select_names(predicate: Option<Predicate>) -> JdbcOperation {
    JdbcOperation::new(
        Statement::Select(SelectStatement {
            selections: vec![SelectItem {
                expression: Expression::column(Some("f"), "name"),
                alias: None,
            }],
            from: vec![FromItem {
                root: TableReference {
                    table: "flight".to_string(),
                    alias: "f".to_string(),
                },
                joins: Vec::new(),
            }],
            predicate,
            ..SelectStatement::default()
        }),
        None,
    )
}

#[test]
fn insert_and_select_round_trip_through_a_connection() {
    let database = flights();
    let mut connection = database.connect();

    for (id, name) in [(1, "AF123"), (2, "BA456")] {
        connection
            .execute_update(&insert_flight(id, name, 90), &[])
            .expect("insert should succeed");
    }

    let rows = connection
        .execute_query(
            &select_names(Some(Predicate::eq(
                Expression::column(Some("f"), "id"),
                Expression::literal(2),
            ))),
            &[],
        )
        .expect("select should succeed");

    assert_eq!(rows, vec![vec![Value::from("BA456")]]);
}

#[test]
fn not_null_column_rejects_null() {
    let database = flights();
    let mut connection = database.connect();

    let operation = JdbcOperation::new(
        Statement::Insert(InsertStatement {
            table: "flight".to_string(),
            columns: vec!["id".into(), "name".into()],
            source: InsertSource::Values(vec![vec![
                Expression::literal(1),
                Expression::literal("AF123"),
            ]]),
        }),
        None,
    );
    let err = connection
        .execute_update(&operation, &[])
        .expect_err("null duration should be rejected");

    assert!(matches!(
        err,
        JdbcError::ConstraintViolation { ref constraint, .. } if constraint == "flight.duration not null"
    ));
    assert_eq!(database.row_count("flight"), 0);
}

#[test]
fn duplicate_primary_key_is_a_constraint_violation() {
    let database = flights();
    let mut connection = database.connect();
    connection
        .execute_update(&insert_flight(1, "AF123", 90), &[])
        .expect("first insert should succeed");

    let err = connection
        .execute_update(&insert_flight(1, "AF124", 95), &[])
        .expect_err("second insert should fail");

    assert!(matches!(
        err,
        JdbcError::ConstraintViolation { ref constraint, .. } if constraint == "PK_flight"
    ));
}

#[test]
fn unique_key_ignores_rows_with_null_members() {
    let database = InMemoryDatabase::new();
    database
        .create_table(
            TableDefinition::new("sky")
                .column("id", false)
                .column("color", true)
                .column("day", true)
                .primary_key(&["id"])
                .unique_key("UK_sky", &["color", "day"]),
        )
        .expect("create should succeed");
    let mut connection = database.connect();

    let insert = |id: i64, color: Value| {
        JdbcOperation::new(
            Statement::Insert(InsertStatement {
                table: "sky".to_string(),
                columns: vec!["id".into(), "color".into(), "day".into()],
                source: InsertSource::Values(vec![vec![
                    Expression::literal(id),
                    Expression::Literal(color),
                    Expression::literal("monday"),
                ]]),
            }),
            None,
        )
    };

    connection
        .execute_update(&insert(1, Value::Null), &[])
        .expect("null color should succeed");
    connection
        .execute_update(&insert(2, Value::Null), &[])
        .expect("second null color should succeed");
    connection
        .execute_update(&insert(3, Value::from("blue")), &[])
        .expect("blue should succeed");
    let err = connection
        .execute_update(&insert(4, Value::from("blue")), &[])
        .expect_err("duplicate blue should fail");

    assert!(matches!(err, JdbcError::ConstraintViolation { ref constraint, .. } if constraint == "UK_sky"));
}

#[test]
fn rollback_restores_inserted_updated_and_deleted_rows() {
    let database = flights();
    let mut connection = database.connect();
    connection
        .execute_update(&insert_flight(1, "AF123", 90), &[])
        .expect("seed insert should succeed");

    connection.begin().expect("begin should succeed");
    connection
        .execute_update(&insert_flight(2, "BA456", 60), &[])
        .expect("insert should succeed");
    connection
        .execute_update(
            &JdbcOperation::new(
                Statement::Update(UpdateStatement {
                    table: "flight".to_string(),
                    assignments: vec![Assignment {
                        column: "duration".to_string(),
                        value: Expression::literal(120),
                    }],
                    predicate: None,
                }),
                None,
            ),
            &[],
        )
        .expect("update should succeed");
    connection
        .execute_update(
            &JdbcOperation::new(
                Statement::Delete(DeleteStatement {
                    table: "flight".to_string(),
                    predicate: Some(Predicate::eq(
                        Expression::column(None, "id"),
                        Expression::literal(1),
                    )),
                }),
                None,
            ),
            &[],
        )
        .expect("delete should succeed");
    connection.rollback().expect("rollback should succeed");

    assert_eq!(
        database.rows("flight"),
        vec![vec![Value::from(1), Value::from("AF123"), Value::from(90)]]
    );
}

#[test]
fn local_temporary_tables_are_private_to_a_connection() {
    let database = InMemoryDatabase::new();
    let mut first = database.connect();
    let mut second = database.connect();

    let create = JdbcOperation::new(
        Statement::CreateTable(
            TableDefinition::new("HT_flight")
                .column("id", false)
                .kind(TableKind::LocalTemporary),
        ),
        None,
    );
    first
        .execute_update(&create, &[])
        .expect("first create should succeed");
    second
        .execute_update(&create, &[])
        .expect("second connection gets its own table");

    assert!(!database.has_table("HT_flight"));
}

#[test]
fn global_temporary_rows_are_private_to_a_connection() {
    let database = InMemoryDatabase::new();
    database
        .create_table(
            TableDefinition::new("HT_flight")
                .column("id", false)
                .kind(TableKind::GlobalTemporary),
        )
        .expect("create should succeed");
    let mut first = database.connect();
    let mut second = database.connect();

    let insert = JdbcOperation::new(
        Statement::Insert(InsertStatement {
            table: "HT_flight".to_string(),
            columns: vec!["id".into()],
            source: InsertSource::Values(vec![vec![Expression::literal(7)]]),
        }),
        None,
    );
    first
        .execute_update(&insert, &[])
        .expect("insert should succeed");

    let count = JdbcOperation::new(
        Statement::Select(SelectStatement {
            selections: vec![SelectItem {
                expression: Expression::count_star(),
                alias: None,
            }],
            from: vec![FromItem {
                root: TableReference {
                    table: "HT_flight".to_string(),
                    alias: String::new(),
                },
                joins: Vec::new(),
            }],
            ..SelectStatement::default()
        }),
        None,
    );
    let mine = first.execute_query(&count, &[]).expect("count should succeed");
    let theirs = second.execute_query(&count, &[]).expect("count should succeed");

    assert_eq!(mine, vec![vec![Value::from(1)]]);
    assert_eq!(theirs, vec![vec![Value::from(0)]]);
}

#[test]
fn in_subquery_and_bound_parameters_filter_rows() {
    let database = flights();
    let mut connection = database.connect();
    for (id, name, duration) in [(1, "AF123", 90), (2, "BA456", 60), (3, "LH789", 45)] {
        connection
            .execute_update(&insert_flight(id, name, duration), &[])
            .expect("insert should succeed");
    }

    let subquery = SelectStatement::column_from(
        "flight",
        "id",
        Some(Predicate::Comparison {
            lhs: Expression::column(None, "duration"),
            op: crate::sql::ComparisonOperator::LessThan,
            rhs: Expression::Parameter(crate::jdbc::JdbcParameter(0)),
        }),
    );
    let operation = select_names(Some(Predicate::InSubquery {
        expression: Expression::column(Some("f"), "id"),
        subquery: Box::new(subquery),
        negated: false,
    }));
    let rows = connection
        .execute_query(&operation, &[Value::from(70)])
        .expect("select should succeed");

    assert_eq!(
        rows,
        vec![vec![Value::from("BA456")], vec![Value::from("LH789")]]
    );
}

#[test]
fn sequences_advance_by_their_increment() {
    let database = InMemoryDatabase::new();
    database.create_sequence("animal_seq", 1, 10);
    let mut connection = database.connect();

    let next = JdbcOperation::new(
        Statement::Select(SelectStatement {
            selections: vec![SelectItem {
                expression: Expression::NextValue("animal_seq".to_string()),
                alias: None,
            }],
            ..SelectStatement::default()
        }),
        None,
    );

    let first = connection.execute_query(&next, &[]).expect("next should succeed");
    let second = connection.execute_query(&next, &[]).expect("next should succeed");

    assert_eq!(first, vec![vec![Value::from(1)]]);
    assert_eq!(second, vec![vec![Value::from(11)]]);
}
