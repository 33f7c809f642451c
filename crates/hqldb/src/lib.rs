//! ## Crate layout
//! - `core`: metamodel, HQL parsing and splitting, SQM and SQL AST
//!   conversion, JDBC binding, mutation strategies and sessions.
//! - `config`: TOML settings and entity descriptions (feature `config`).
//!
//! The `prelude` module mirrors the surface used at call sites: build a
//! `SessionFactory`, open a `Session`, run queries.

pub use hqldb_core as core;

#[cfg(feature = "config")]
pub use hqldb_config as config;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use core::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        config::{InsertStrategyKind, MutationStrategyKind, Settings},
        error::Error,
        hql::concrete_queries,
        jdbc::memory::InMemoryDatabase,
        model::{CollectionMapping, EntityData, EntityMapping, InheritanceType, Metamodel},
        query::{QueryRow, ResultTransformer},
        session::{Query, Session, SessionFactory, TransactionStatus},
        value::Value,
    };
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn version_matches_the_workspace() {
        assert_eq!(super::VERSION, "0.4.0");
    }

    #[test]
    fn prelude_drives_a_session_end_to_end() {
        let metamodel = Metamodel::builder()
            .entity(
                EntityMapping::builder("Flight", "flight")
                    .basic("name", "name")
                    .build(),
            )
            .build()
            .expect("metamodel should build");
        let database =
            InMemoryDatabase::with_mapped_tables(&metamodel).expect("tables should create");
        let factory = SessionFactory::builder(metamodel, Arc::new(database))
            .build()
            .expect("factory should build");

        let mut session = factory.open_session().expect("session should open");
        session.begin_transaction().expect("begin should succeed");
        session
            .persist("Flight", EntityData::new().with("id", 7).with("name", "AF1"))
            .expect("persist should succeed");
        session.commit().expect("commit should succeed");

        let rows = session
            .create_query("select f.name from Flight f")
            .list()
            .expect("query should succeed");
        let names: Vec<Value> = rows.into_iter().filter_map(QueryRow::into_tuple).flatten().collect();

        assert_eq!(names, vec![Value::from("AF1")]);
    }

    #[cfg(feature = "config")]
    #[test]
    fn config_re_export_resolves_documents() {
        let config = crate::config::from_toml_str(
            "[[entities]]\nname = \"Flight\"\ntable = \"flight\"\n",
        )
        .expect("config should resolve");

        assert!(config.metamodel.entity("Flight").is_some());
        let json = serde_json::to_value(&config.settings).expect("settings should serialize");
        assert_eq!(json["query_translator"], "ast");
    }
}
