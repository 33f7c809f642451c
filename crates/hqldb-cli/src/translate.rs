use crate::{
    CliError,
    args::{Binding, BoundArg},
};
use hqldb::core::{
    config::Settings,
    hql::concrete_queries,
    id::IdentifierGenerators,
    jdbc::{JdbcConnectionAccess, JdbcCoordinator},
    model::Metamodel,
    mutation::MutationStrategies,
    obs::Statistics,
    query::{ExecutionContext, QueryOptions, QueryTranslator, QueryTranslatorFactory},
    sql::{SqmToSqlConverter, Statement, render},
    sqm::{QueryParameterBindings, SqmStatement},
};
use serde_json::json;
use std::{fmt::Write as _, sync::Arc};
use tracing::debug;

///
/// TranslatedQuery
///
/// SQL for one concrete statement, in execution order.
///

#[derive(Debug)]
pub struct TranslatedQuery {
    pub kind: &'static str,
    pub sql: Vec<String>,
}

/// Concrete queries, one per line or as a JSON array.
pub fn split(metamodel: &Metamodel, query: &str, as_json: bool) -> Result<String, CliError> {
    let queries = concrete_queries(query, metamodel);
    debug!(query, variants = queries.len(), "split");

    if as_json {
        Ok(serde_json::to_string_pretty(&queries)?)
    } else {
        Ok(queries.join("\n"))
    }
}

/// Every concrete statement of `query` with the SQL it would run. Mutations
/// go through the configured strategies, so multi-table statements show the
/// full temporary-table or inline sequence.
pub fn translate(
    metamodel: &Metamodel,
    settings: &Settings,
    access: &dyn JdbcConnectionAccess,
    translator: &dyn QueryTranslator,
    query: &str,
    params: &[Binding],
) -> Result<Vec<TranslatedQuery>, CliError> {
    let translation = translator.translate(query, metamodel)?;
    let parameters = bindings(params);

    let coordinator = JdbcCoordinator::new(
        access.obtain_connection()?,
        Arc::new(Statistics::default()),
    );
    let id_generators = IdentifierGenerators::from_metamodel(metamodel);
    let strategies = MutationStrategies::from_settings(settings);
    let options = QueryOptions::default();
    let ctx = ExecutionContext {
        query,
        metamodel,
        settings,
        coordinator: &coordinator,
        id_generators: &id_generators,
        session_uid: "translate",
        parameters: &parameters,
        options: &options,
    };

    translation
        .statements
        .iter()
        .map(|translated| match &translated.statement {
            SqmStatement::Select(select) => {
                let expansions = parameters.expansions(&translated.parameters);
                let sql =
                    SqmToSqlConverter::translate_select(metamodel, query, &expansions, select)?;
                let rendered = render(&Statement::Select(sql.statement), ctx.sql_comment());

                Ok(TranslatedQuery {
                    kind: "select",
                    sql: vec![rendered.sql],
                })
            }
            statement => {
                let built = strategies.build_handler(statement, &translated.parameters, &ctx)?;

                Ok(TranslatedQuery {
                    kind: if built.multi_table {
                        "multi-table mutation"
                    } else {
                        "mutation"
                    },
                    sql: built.handler.sql(),
                })
            }
        })
        .collect()
}

pub fn resolve_translator(
    settings: &Settings,
    name: Option<&str>,
) -> Result<Arc<dyn QueryTranslator>, CliError> {
    let name = name.unwrap_or(&settings.query_translator);

    Ok(QueryTranslatorFactory::new().resolve(name)?)
}

pub fn bindings(params: &[Binding]) -> QueryParameterBindings {
    let mut bindings = QueryParameterBindings::new();
    for param in params {
        match &param.value {
            BoundArg::Single(value) => bindings.bind(param.parameter.clone(), value.clone()),
            BoundArg::List(values) => bindings.bind_list(param.parameter.clone(), values.clone()),
        }
    }

    bindings
}

pub fn format(translated: &[TranslatedQuery], as_json: bool) -> Result<String, CliError> {
    if as_json {
        let statements: Vec<_> = translated
            .iter()
            .map(|t| json!({ "kind": t.kind, "sql": t.sql }))
            .collect();

        let mut out = serde_json::to_string_pretty(&statements)?;
        out.push('\n');

        return Ok(out);
    }

    let mut out = String::new();
    for (i, statement) in translated.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "-- {} #{}", statement.kind, i + 1);
        for sql in &statement.sql {
            out.push_str(sql);
            out.push_str(";\n");
        }
    }

    Ok(out)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::parse_binding;
    use hqldb::config::Config;

    const MODEL: &str = r#"
interfaces = ["Named"]

[[entities]]
name = "Flight"
table = "flight"
implements = ["Named"]
attributes = [{ name = "name" }]

[[entities]]
name = "Animal"
table = "animal"
inheritance = "joined"
implements = ["Named"]
attributes = [{ name = "name" }, { name = "weight" }]

[[entities]]
name = "Dog"
extends = "Animal"
joined_table = { name = "dog", key_column = "animal_id" }
attributes = [{ name = "breed" }]
"#;

    fn config() -> Config {
        hqldb::config::from_toml_str(MODEL).expect("model should resolve")
    }

    fn run(query: &str, params: &[&str]) -> Result<Vec<TranslatedQuery>, CliError> {
        let config = config();
        let database = config.database()?;
        let translator = resolve_translator(&config.settings, None)?;
        let params: Vec<Binding> = params
            .iter()
            .map(|p| parse_binding(p).expect("binding should parse"))
            .collect();

        translate(
            &config.metamodel,
            &config.settings,
            &database,
            translator.as_ref(),
            query,
            &params,
        )
    }

    #[test]
    fn split_lists_one_query_per_implementor() {
        let out = split(&config().metamodel, "from Named n", false).expect("split should succeed");

        assert_eq!(out, "from Animal n\nfrom Flight n");
    }

    #[test]
    fn split_json_is_an_array() {
        let out = split(&config().metamodel, "from Flight f", true).expect("split should succeed");
        let parsed: Vec<String> = serde_json::from_str(&out).expect("output should be JSON");

        assert_eq!(parsed, vec!["from Flight f"]);
    }

    #[test]
    fn polymorphic_selects_translate_per_implementor() {
        let out = run("select n.name from Named n", &[]).expect("translate should succeed");

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t.kind == "select" && t.sql.len() == 1));
        assert!(out[0].sql[0].to_lowercase().contains("animal"));
        assert!(out[1].sql[0].to_lowercase().contains("flight"));
    }

    #[test]
    fn multi_table_deletes_show_every_statement() {
        let out = run("delete from Dog d where d.weight > :w", &["w=10"])
            .expect("translate should succeed");

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, "multi-table mutation");
        assert!(out[0].sql.len() > 1, "{:?}", out[0].sql);
    }

    #[test]
    fn single_table_updates_are_plain_mutations() {
        let out = run("update Flight f set f.name = :n", &["n=\"AF2\""])
            .expect("translate should succeed");

        assert_eq!(out[0].kind, "mutation");
    }

    #[test]
    fn unknown_translators_fail() {
        let err = resolve_translator(&config().settings, Some("legacy")).err().expect("should fail");

        assert!(matches!(err, CliError::Core(_)), "{err:?}");
    }

    #[test]
    fn json_output_carries_kind_and_sql() {
        let translated = vec![TranslatedQuery {
            kind: "select",
            sql: vec!["select 1".to_string()],
        }];
        let out = format(&translated, true).expect("format should succeed");
        let parsed: serde_json::Value = serde_json::from_str(&out).expect("output should be JSON");

        assert_eq!(parsed[0]["kind"], "select");
        assert_eq!(parsed[0]["sql"][0], "select 1");
    }
}
