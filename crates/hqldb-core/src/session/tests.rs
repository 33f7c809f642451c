use super::*;
use crate::{
    config::{MutationStrategyKind, Settings},
    error::Error,
    jdbc::memory::InMemoryDatabase,
    model::{EntityData, MappingError},
    query::{Instantiator, QueryRow, ToListResultTransformer},
    test_support,
    value::Value,
};
use std::{any::Any, sync::Arc};

fn factory_with(settings: Settings) -> (SessionFactory, InMemoryDatabase) {
    let metamodel = test_support::metamodel();
    let database = test_support::database(&metamodel);
    let factory = SessionFactory::builder(metamodel, Arc::new(database.clone()))
        .settings(settings)
        .build()
        .expect("factory should build");

    (factory, database)
}

fn factory() -> (SessionFactory, InMemoryDatabase) {
    factory_with(Settings::default())
}

fn open(factory: &SessionFactory) -> Session {
    factory.open_session().expect("session should open")
}

fn flight(id: i64, name: &str, duration: i64) -> EntityData {
    EntityData::new()
        .with("id", id)
        .with("name", name)
        .with("duration", duration)
}

fn dog(name: &str, weight: i64, breed: &str) -> EntityData {
    EntityData::new()
        .with("name", name)
        .with("weight", weight)
        .with("breed", breed)
}

/// First column of every tuple row, as text.
fn texts(rows: &[QueryRow]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let tuple = row.as_tuple().expect("row should be a tuple");
            tuple[0].as_text().unwrap_or_default().to_string()
        })
        .collect()
}

// ─────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────

#[test]
fn not_null_violation_fails_commit_and_leaves_no_row() {
    let (factory, database) = factory();
    let mut session = open(&factory);

    session.begin_transaction().expect("begin should succeed");
    session
        .persist("Flight", EntityData::new().with("id", 1).with("name", "AF1"))
        .expect("persist should succeed");
    let err = session.commit().expect_err("commit should fail");

    assert!(err.is_constraint_violation(), "{err:?}");
    assert_eq!(session.transaction_status(), TransactionStatus::RolledBack);
    assert_eq!(database.row_count("flight"), 0);
}

#[test]
fn failed_flush_makes_the_transaction_rollback_only() {
    let (factory, database) = factory();
    let mut session = open(&factory);
    let sky = |id: i64| {
        EntityData::new()
            .with("id", id)
            .with("color", "blue")
            .with("day", "01")
            .with("month", "01")
    };

    session.begin_transaction().expect("begin should succeed");
    session.persist("Sky", sky(1)).expect("persist should succeed");
    session.flush().expect("first flush should succeed");
    session.persist("Sky", sky(2)).expect("persist should succeed");

    let err = session.flush().expect_err("duplicate should fail");
    assert!(err.is_constraint_violation(), "{err:?}");
    assert!(err.to_string().contains("UK_sky"), "{err}");
    assert_eq!(session.transaction_status(), TransactionStatus::MarkedRollback);

    let err = session.commit().expect_err("commit should fail");
    assert!(
        matches!(err, Error::Transaction(TransactionError::RollbackOnly)),
        "{err:?}"
    );
    assert_eq!(database.row_count("sky"), 0);
}

#[test]
fn committed_writes_survive_and_statistics_count_them() {
    let (factory, database) = factory();
    let mut session = open(&factory);

    session.begin_transaction().expect("begin should succeed");
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");
    session.commit().expect("commit should succeed");

    assert_eq!(session.transaction_status(), TransactionStatus::Committed);
    assert_eq!(database.row_count("flight"), 1);

    let snapshot = factory.statistics().snapshot();
    assert_eq!(snapshot.transactions_committed, 1);
    assert_eq!(snapshot.flushes, 1);
    assert_eq!(snapshot.entities["Flight"].inserts, 1);
}

#[test]
fn transaction_state_is_checked() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    let err = session.commit().expect_err("nothing to commit");
    assert!(matches!(err, Error::Transaction(TransactionError::NotActive)));

    session.begin_transaction().expect("begin should succeed");
    let err = session.begin_transaction().expect_err("nested begin");
    assert!(matches!(err, Error::Transaction(TransactionError::AlreadyActive)));

    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");
    session.rollback().expect("rollback should succeed");
    assert_eq!(session.pending_actions(), 0);
    assert_eq!(session.transaction_status(), TransactionStatus::RolledBack);
}

#[test]
fn query_errors_leave_the_transaction_active() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    session.begin_transaction().expect("begin should succeed");
    let err = session
        .create_query("from Flight f f2")
        .list()
        .expect_err("malformed query should fail");

    assert!(err.is_query_error(), "{err:?}");
    assert_eq!(session.transaction_status(), TransactionStatus::Active);
}

#[test]
fn failed_mutations_make_the_transaction_rollback_only() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");
    session.flush().expect("flush should succeed");

    session.begin_transaction().expect("begin should succeed");
    let err = session
        .create_query("update Flight set duration = null")
        .execute_update()
        .expect_err("not-null column should reject null");

    assert!(err.is_constraint_violation(), "{err:?}");
    assert_eq!(session.transaction_status(), TransactionStatus::MarkedRollback);
}

// ─────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────

#[test]
fn persist_then_get_spans_the_joined_tables() {
    let (factory, database) = factory();
    let mut session = open(&factory);

    let id = session
        .persist("Dog", dog("Rex", 30, "lab"))
        .expect("persist should succeed");
    assert_eq!(id, Value::Int(1));

    let loaded = session
        .get("Dog", 1)
        .expect("get should succeed")
        .expect("dog should exist");

    assert_eq!(loaded.value("name"), Value::from("Rex"));
    assert_eq!(loaded.value("breed"), Value::from("lab"));
    assert_eq!(loaded.value("version"), Value::Int(0));
    assert_eq!(database.row_count("animal"), 1);
    assert_eq!(database.row_count("dog"), 1);
    assert_eq!(factory.statistics().snapshot().entities["Dog"].loads, 1);
}

#[test]
fn get_of_a_missing_id_is_none() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    assert!(session.get("Flight", 42).expect("get should succeed").is_none());
}

#[test]
fn optional_secondary_table_rows_follow_their_values() {
    let (factory, database) = factory();
    let mut session = open(&factory);

    session
        .persist("Person", EntityData::new().with("id", 1).with("name", "Ann"))
        .expect("persist should succeed");
    session.flush().expect("flush should succeed");
    assert_eq!(database.row_count("person_detail"), 0);

    let mut ann = session
        .get("Person", 1)
        .expect("get should succeed")
        .expect("person should exist");
    ann.set("email", "ann@example.com");
    session.update("Person", ann).expect("update should queue");
    session.flush().expect("flush should succeed");

    assert_eq!(database.row_count("person_detail"), 1);
    let reloaded = session
        .get("Person", 1)
        .expect("get should succeed")
        .expect("person should exist");
    assert_eq!(reloaded.value("email"), Value::from("ann@example.com"));
}

#[test]
fn assigned_ids_must_be_set() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    let err = session
        .persist("Flight", EntityData::new().with("name", "AF1"))
        .expect_err("missing id should fail");

    assert!(
        matches!(err, Error::Mapping(MappingError::MissingIdentifier { .. })),
        "{err:?}"
    );
}

#[test]
fn versioned_updates_bump_the_version() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    session
        .persist("Dog", dog("Rex", 30, "lab"))
        .expect("persist should succeed");

    let rex = session
        .get("Dog", 1)
        .expect("get should succeed")
        .expect("dog should exist");
    session
        .update("Dog", rex.with("breed", "husky"))
        .expect("update should queue");

    let rex = session
        .get("Dog", 1)
        .expect("get should succeed")
        .expect("dog should exist");
    assert_eq!(rex.value("version"), Value::Int(1));
    assert_eq!(rex.value("breed"), Value::from("husky"));
}

#[test]
fn concurrent_update_of_a_versioned_entity_is_stale() {
    let (factory, database) = factory();
    let mut first = open(&factory);
    let mut second = open(&factory);

    first
        .persist("Document", EntityData::new().with("id", 1).with("title", "draft"))
        .expect("persist should succeed");
    first.flush().expect("flush should succeed");
    let seen_by_first = first
        .get("Document", 1)
        .expect("get should succeed")
        .expect("document should exist");

    second.begin_transaction().expect("begin should succeed");
    let seen_by_second = second
        .get("Document", 1)
        .expect("get should succeed")
        .expect("document should exist");
    second
        .update("Document", seen_by_second.with("title", "reviewed"))
        .expect("update should queue");
    second.commit().expect("commit should succeed");

    first
        .update("Document", seen_by_first.with("title", "final"))
        .expect("update should queue");
    let err = first.flush().expect_err("stale update should fail");

    assert!(err.is_stale_state(), "{err:?}");
    assert_eq!(database.rows("document")[0][1], Value::Int(1));
    let snapshot = factory.statistics().snapshot();
    assert_eq!(snapshot.optimistic_failures, 1);
    assert_eq!(snapshot.entities["Document"].optimistic_failures, 1);
}

#[test]
fn remove_clears_every_table_of_the_instance() {
    let (factory, database) = factory();
    let mut session = open(&factory);
    session
        .persist("Dog", dog("Rex", 30, "lab"))
        .expect("persist should succeed");
    session.flush().expect("flush should succeed");

    session.remove("Dog", 1).expect("remove should queue");
    session.flush().expect("flush should succeed");

    assert_eq!(database.row_count("animal"), 0);
    assert_eq!(database.row_count("dog"), 0);
}

#[test]
fn removing_a_missing_row_is_stale() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    session.remove("Flight", 99).expect("remove should queue");
    let err = session.flush().expect_err("missing row should fail");

    assert!(err.is_stale_state(), "{err:?}");
}

// ─────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────

#[test]
fn queries_flush_pending_writes_first() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");

    let rows = session
        .create_query("select f.name from Flight f")
        .list()
        .expect("list should succeed");

    assert_eq!(session.pending_actions(), 0);
    assert_eq!(texts(&rows), vec!["AF1"]);
}

#[test]
fn named_and_positional_parameters_bind() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    for (id, name, duration) in [(1, "AF1", 95), (2, "AF2", 40), (3, "BA3", 120)] {
        session
            .persist("Flight", flight(id, name, duration))
            .expect("persist should succeed");
    }

    let rows = session
        .create_query("select f.name from Flight f where f.duration > :min order by f.id")
        .set_parameter("min", 60)
        .list()
        .expect("list should succeed");
    assert_eq!(texts(&rows), vec!["AF1", "BA3"]);

    let rows = session
        .create_query("select f.name from Flight f where f.duration < ?1 or f.name = ?1")
        .set_parameter(1u32, 50)
        .list()
        .expect("list should succeed");
    assert_eq!(texts(&rows), vec!["AF2"]);

    let rows = session
        .create_query("select f.name from Flight f where f.id in (:ids) order by f.id")
        .set_parameter_list("ids", [1, 3])
        .list()
        .expect("list should succeed");
    assert_eq!(texts(&rows), vec!["AF1", "BA3"]);
}

#[test]
fn unbound_parameters_are_rejected() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    let err = session
        .create_query("select f.name from Flight f where f.id = :id")
        .list()
        .expect_err("unbound parameter should fail");

    assert!(matches!(err, Error::ParameterBinding(_)), "{err:?}");
}

#[test]
fn polymorphic_selects_concatenate_implementors() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    session
        .persist("Dog", dog("Rex", 30, "lab"))
        .expect("persist should succeed");
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");

    let rows = session
        .create_query("select n.name from Named n")
        .list()
        .expect("list should succeed");

    assert_eq!(texts(&rows), vec!["Rex", "AF1"]);
}

#[test]
fn interface_without_implementors_yields_nothing() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    let rows = session
        .create_query("from Thing")
        .list()
        .expect("list should succeed");
    assert!(rows.is_empty());

    let affected = session
        .create_query("delete from Thing")
        .execute_update()
        .expect("execute_update should succeed");
    assert_eq!(affected, 0);
}

#[test]
fn wrong_statement_kind_is_rejected() {
    let (factory, _database) = factory();
    let mut session = open(&factory);

    let err = session
        .create_query("delete from Flight")
        .list()
        .expect_err("list of a delete should fail");
    assert!(matches!(err, Error::QueryExecutionRequest { .. }), "{err:?}");
    assert!(err.to_string().contains("Not supported for DML operations"));

    let err = session
        .create_query("from Flight")
        .execute_update()
        .expect_err("execute_update of a select should fail");
    assert!(matches!(err, Error::QueryExecutionRequest { .. }), "{err:?}");
}

#[test]
fn select_new_map_and_list_shape_rows() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");

    let rows = session
        .create_query("select new map(f.name as n, f.duration) from Flight f")
        .list()
        .expect("list should succeed");
    let map = rows[0].as_map().expect("row should be a map");
    assert_eq!(map["n"], Value::from("AF1"));
    assert_eq!(map["1"], Value::Int(95));

    let rows = session
        .create_query("select new list(f.name, f.duration) from Flight f")
        .list()
        .expect("list should succeed");
    assert_eq!(
        rows[0].as_list(),
        Some(&[Value::from("AF1"), Value::Int(95)][..])
    );
}

#[derive(Debug, PartialEq)]
struct FlightSummary {
    name: String,
    minutes: i64,
}

#[test]
fn select_new_uses_the_registered_constructor() {
    let metamodel = test_support::metamodel();
    let database = test_support::database(&metamodel);
    let summary: Instantiator = Arc::new(|values: Vec<Value>| {
        Ok(Box::new(FlightSummary {
            name: values[0].as_text().unwrap_or_default().to_string(),
            minutes: values[1].as_int().unwrap_or_default(),
        }) as Box<dyn Any + Send>)
    });
    let factory = SessionFactory::builder(metamodel, Arc::new(database))
        .constructor("FlightSummary", summary)
        .build()
        .expect("factory should build");
    let mut session = open(&factory);
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");

    let rows = session
        .create_query("select new FlightSummary(f.name, f.duration) from Flight f")
        .list()
        .expect("list should succeed");
    let summary = rows
        .into_iter()
        .next()
        .and_then(|row| row.downcast::<FlightSummary>())
        .expect("row should be a FlightSummary");
    assert_eq!(
        summary,
        FlightSummary {
            name: "AF1".to_string(),
            minutes: 95
        }
    );

    let err = session
        .create_query("select new Unknown(f.name) from Flight f")
        .list()
        .expect_err("unregistered class should fail");
    assert!(matches!(err, Error::Semantic { .. }), "{err:?}");
}

#[test]
fn custom_transformer_applies_without_select_new() {
    let (factory, _database) = factory();
    let mut session = open(&factory);
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");

    let rows = session
        .create_query("select f.name from Flight f")
        .set_result_transformer(Arc::new(ToListResultTransformer))
        .list()
        .expect("list should succeed");

    assert_eq!(rows[0].as_list(), Some(&[Value::from("AF1")][..]));
}

#[test]
fn multi_table_mutations_run_through_the_session() {
    let (factory, database) = factory();
    let mut session = open(&factory);
    session
        .persist("Dog", dog("Rex", 30, "lab"))
        .expect("persist should succeed");
    session
        .persist("Dog", dog("Fido", 12, "pug"))
        .expect("persist should succeed");

    let updated = session
        .create_query("update Dog set breed = :breed where weight < 20")
        .set_parameter("breed", "mutt")
        .execute_update()
        .expect("update should succeed");
    assert_eq!(updated, 1);

    let deleted = session
        .create_query("delete from Dog where weight > :weight")
        .set_parameter("weight", 20)
        .execute_update()
        .expect("delete should succeed");
    assert_eq!(deleted, 1);

    let inserted = session
        .create_query("insert into Dog (name, breed) values ('Rex', 'lab')")
        .execute_update()
        .expect("insert should succeed");
    assert_eq!(inserted, 1);

    assert_eq!(database.row_count("animal"), 2);
    assert_eq!(database.row_count("dog"), 2);
    let fido = session
        .get("Dog", 2)
        .expect("get should succeed")
        .expect("Fido should exist");
    assert_eq!(fido.value("breed"), Value::from("mutt"));
}

const ALL_STRATEGIES: [MutationStrategyKind; 4] = [
    MutationStrategyKind::LocalTemporary,
    MutationStrategyKind::GlobalTemporary,
    MutationStrategyKind::Persistent,
    MutationStrategyKind::Inline,
];

fn factory_using(mutation_strategy: MutationStrategyKind) -> (SessionFactory, InMemoryDatabase) {
    factory_with(Settings {
        mutation_strategy,
        ..Settings::default()
    })
}

#[test]
fn cached_plans_reuse_their_handlers() {
    for kind in ALL_STRATEGIES {
        let (factory, database) = factory_using(kind);
        let mut session = open(&factory);
        for (name, weight) in [("Rex", 30), ("Fido", 12), ("Max", 50), ("Bo", 45)] {
            session
                .persist("Dog", dog(name, weight, "lab"))
                .expect("persist should succeed");
        }

        let counts: Vec<u64> = [40, 20, 5]
            .into_iter()
            .map(|weight| {
                session
                    .create_query("delete from Dog where weight > :weight")
                    .set_parameter("weight", weight)
                    .execute_update()
                    .expect("delete should succeed")
            })
            .collect();

        assert_eq!(counts, vec![2, 1, 1], "{kind:?}");
        assert_eq!(database.row_count("animal"), 0, "{kind:?}");
        assert_eq!(database.row_count("dog"), 0, "{kind:?}");

        let snapshot = factory.statistics().snapshot();
        assert_eq!(snapshot.plan_cache_misses, 1, "{kind:?}");
        assert_eq!(snapshot.plan_cache_hits, 2, "{kind:?}");
        assert_eq!(snapshot.handlers_built, 1, "{kind:?}");
        assert_eq!(snapshot.handlers_reused, 2, "{kind:?}");
        assert_eq!(factory.plan_cache().len(), 1, "{kind:?}");
    }
}

#[test]
fn sessions_on_many_threads_share_one_cached_handler() {
    const DELETE: &str = "delete from Dog where weight > :low and weight <= :high";

    for kind in ALL_STRATEGIES {
        let (factory, database) = factory_using(kind);
        let mut session = open(&factory);
        for weight in 1..=40 {
            session
                .persist("Dog", dog(&format!("dog{weight}"), weight, "lab"))
                .expect("persist should succeed");
        }
        session.flush().expect("flush should succeed");

        // warm the plan cache so every thread replays the same handler
        let warmed = session
            .create_query(DELETE)
            .set_parameter("low", 100)
            .set_parameter("high", 200)
            .execute_update()
            .expect("delete should succeed");
        assert_eq!(warmed, 0);

        let total: u64 = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4)
                .map(|i| {
                    let factory = factory.clone();
                    scope.spawn(move || {
                        let mut session = factory.open_session().expect("session should open");
                        let deleted = session
                            .create_query(DELETE)
                            .set_parameter("low", i * 10)
                            .set_parameter("high", i * 10 + 10)
                            .execute_update()
                            .expect("delete should succeed");
                        session.close().expect("close should succeed");

                        deleted
                    })
                })
                .collect();

            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker should not panic"))
                .sum()
        });

        assert_eq!(total, 40, "{kind:?}");
        assert_eq!(database.row_count("animal"), 0, "{kind:?}");
        assert_eq!(database.row_count("dog"), 0, "{kind:?}");

        let snapshot = factory.statistics().snapshot();
        assert_eq!(snapshot.handlers_built, 1, "{kind:?}");
        assert_eq!(snapshot.handlers_reused, 4, "{kind:?}");
    }
}

#[test]
fn classic_translator_runs_the_same_queries() {
    let (factory, _database) = factory_with(Settings {
        query_translator: "classic".to_string(),
        ..Settings::default()
    });
    let mut session = open(&factory);
    session
        .persist("Dog", dog("Rex", 30, "lab"))
        .expect("persist should succeed");
    session
        .persist("Flight", flight(1, "AF1", 95))
        .expect("persist should succeed");

    let rows = session
        .create_query("select n.name from Named n where n.name <> :skip")
        .set_parameter("skip", "nobody")
        .list()
        .expect("list should succeed");

    assert_eq!(factory.query_translator().name(), "classic");
    assert_eq!(texts(&rows), vec!["Rex", "AF1"]);
}

// ─────────────────────────────────────────────
// Factory
// ─────────────────────────────────────────────

#[test]
fn unknown_translator_fails_the_build() {
    let metamodel = test_support::metamodel();
    let database = test_support::database(&metamodel);

    let err = SessionFactory::builder(metamodel, Arc::new(database))
        .settings(Settings {
            query_translator: "antlr2".to_string(),
            ..Settings::default()
        })
        .build()
        .expect_err("unknown translator should fail");

    assert!(matches!(err, Error::Config { .. }), "{err:?}");
}

#[test]
fn closed_factory_refuses_new_sessions() {
    let (factory, _database) = factory();
    let session = open(&factory);

    factory.close().expect("close should succeed");
    factory.close().expect("second close is a no-op");

    assert!(factory.is_closed());
    let err = factory.open_session().expect_err("closed factory should refuse");
    assert!(matches!(err, Error::Transaction(TransactionError::FactoryClosed)));
    session.close().expect("session close should succeed");
}

#[test]
fn sessions_get_distinct_uids() {
    let (factory, _database) = factory();

    let a = open(&factory);
    let b = open(&factory);

    assert_ne!(a.uid(), b.uid());
    assert_eq!(factory.statistics().snapshot().sessions_opened, 2);
}
