use crate::{
    error::Error,
    hql::parse,
    model::MappingError,
    sql::{
        Assignment, DeleteStatement, Expression, Predicate, SelectStatement, Statement,
        SqmToSqlConverter, TableDefinition, TableKind, UpdateStatement,
        create_jdbc_parameter_bindings, render,
    },
    sqm::{QueryParameter, QueryParameterBindings, SqmStatement},
    test_support,
    value::Value,
};
use std::collections::BTreeMap;

fn convert(query: &str, bindings: &QueryParameterBindings) -> (String, Vec<Value>) {
    let metamodel = test_support::metamodel();
    let parsed = parse(query, &metamodel).expect("parse should succeed");
    let SqmStatement::Select(select) = &parsed.statement else {
        panic!("expected a select");
    };

    let expansions = bindings.expansions(&parsed.parameters);
    let mut converter = SqmToSqlConverter::new(&metamodel, query, &expansions);
    let statement = converter
        .convert_select(select)
        .expect("conversion should succeed");
    let jdbc_xref = converter.finish();

    let jdbc_bindings = create_jdbc_parameter_bindings(&parsed.parameters, &jdbc_xref, bindings)
        .expect("bindings should succeed");
    let rendered = render(&Statement::Select(statement), None);
    let values = rendered
        .parameters
        .iter()
        .map(|p| jdbc_bindings.value(*p).cloned().unwrap_or_default())
        .collect();

    (rendered.sql, values)
}

// ─────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────

#[test]
fn update_and_delete_render_unqualified_columns() {
    let update = Statement::Update(UpdateStatement {
        table: "flight".to_string(),
        assignments: vec![Assignment {
            column: "duration".to_string(),
            value: Expression::Binary {
                op: crate::sql::BinaryOperator::Add,
                lhs: Box::new(Expression::column(None, "duration")),
                rhs: Box::new(Expression::literal(5)),
            },
        }],
        predicate: Some(Predicate::eq(
            Expression::column(None, "name"),
            Expression::literal("AF1"),
        )),
    });
    let delete = Statement::Delete(DeleteStatement {
        table: "flight".to_string(),
        predicate: None,
    });

    assert_eq!(
        render(&update, None).sql,
        "update flight set duration = duration + 5 where name = 'AF1'"
    );
    assert_eq!(render(&delete, None).sql, "delete from flight");
}

#[test]
fn comments_prefix_the_statement() {
    let select = Statement::Select(SelectStatement::column_from("flight", "id", None));

    assert_eq!(
        render(&select, Some("load flights")).sql,
        "/* load flights */ select id from flight"
    );
}

#[test]
fn temporary_table_ddl_names_its_kind() {
    let definition = TableDefinition::new("HT_animal")
        .column("id", false)
        .kind(TableKind::LocalTemporary);

    assert_eq!(
        render(&Statement::CreateTable(definition), None).sql,
        "create local temporary table HT_animal (id not null)"
    );
}

#[test]
fn nested_junctions_are_parenthesized() {
    let a = Predicate::eq(Expression::column(None, "a"), Expression::literal(1));
    let b = Predicate::eq(Expression::column(None, "b"), Expression::literal(2));
    let c = Predicate::eq(Expression::column(None, "c"), Expression::literal(3));
    let select = SelectStatement::column_from(
        "t",
        "a",
        Some(Predicate::And(vec![a, Predicate::Or(vec![b, c])])),
    );

    assert_eq!(
        render(&Statement::Select(select), None).sql,
        "select a from t where a = 1 and (b = 2 or c = 3)"
    );
}

// ─────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────

#[test]
fn joined_subclass_joins_its_own_tables() {
    let (sql, values) = convert(
        "select d.breed from Dog d where d.name = :name",
        &QueryParameterBindings::new().with("name", "Rex"),
    );

    assert_eq!(
        sql,
        "select dog0_1_.breed as col_0_0_ from animal dog0_ join dog dog0_1_ on dog0_1_.animal_id = dog0_.id where dog0_.name = ?"
    );
    assert_eq!(values, vec![Value::from("Rex")]);
}

#[test]
fn single_table_subclass_is_restricted_by_discriminator() {
    let (sql, _) = convert("select e.salary from Employee e", &QueryParameterBindings::new());

    assert_eq!(
        sql,
        "select employee0_.salary as col_0_0_ from person employee0_ left join person_detail employee0_1_ on employee0_1_.person_id = employee0_.id where employee0_.kind in ('E')"
    );
}

#[test]
fn list_parameters_expand_to_their_cardinality() {
    let mut bindings = QueryParameterBindings::new();
    bindings.bind_list(
        QueryParameter::named("ids"),
        vec![Value::Int(1), Value::Int(2), Value::Int(3)],
    );

    let (sql, values) = convert("select f.name from Flight f where f.id in (:ids)", &bindings);

    assert_eq!(
        sql,
        "select flight0_.name as col_0_0_ from flight flight0_ where flight0_.id in (?, ?, ?)"
    );
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn repeated_parameters_bind_every_occurrence() {
    let (sql, values) = convert(
        "select f.id from Flight f where f.duration > ?1 or f.duration < ?1",
        &QueryParameterBindings::new().with(1u32, 90),
    );

    assert!(sql.ends_with("where flight0_.duration > ? or flight0_.duration < ?"));
    assert_eq!(values, vec![Value::Int(90), Value::Int(90)]);
}

#[test]
fn collection_size_becomes_a_correlated_subquery() {
    let (sql, _) = convert(
        "select a.id from Animal a where size(a.nicknames) > 1",
        &QueryParameterBindings::new(),
    );

    assert_eq!(
        sql,
        "select animal0_.id as col_0_0_ from animal animal0_ where (select count(*) from animal_nicknames where animal_nicknames.animal_id = animal0_.id) > 1"
    );
}

#[test]
fn entity_selection_is_its_identifier() {
    let (sql, _) = convert("from Flight", &QueryParameterBindings::new());

    assert_eq!(sql, "select flight0_.id as col_0_0_ from flight flight0_");
}

#[test]
fn unknown_attributes_are_mapping_errors() {
    let metamodel = test_support::metamodel();
    let query = "select f.altitude from Flight f";
    let parsed = parse(query, &metamodel).expect("parse should succeed");
    let SqmStatement::Select(select) = &parsed.statement else {
        panic!("expected a select");
    };
    let expansions = BTreeMap::new();

    let err = SqmToSqlConverter::new(&metamodel, query, &expansions)
        .convert_select(select)
        .expect_err("conversion should fail");

    assert!(matches!(
        err,
        Error::Mapping(MappingError::UnknownAttribute { ref attribute, .. }) if attribute == "altitude"
    ));
}

#[test]
fn interface_roots_must_be_split_first() {
    let metamodel = test_support::metamodel();
    let query = "from Named";
    let parsed = parse(query, &metamodel).expect("parse should succeed");
    let SqmStatement::Select(select) = &parsed.statement else {
        panic!("expected a select");
    };
    let expansions = BTreeMap::new();

    let err = SqmToSqlConverter::new(&metamodel, query, &expansions)
        .convert_select(select)
        .expect_err("conversion should fail");

    assert!(matches!(err, Error::Internal(_)));
}
