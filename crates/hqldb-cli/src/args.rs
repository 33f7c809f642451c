use clap::{Parser, Subcommand};
use hqldb::core::{sqm::QueryParameter, value::Value};
use std::path::PathBuf;

/// hqldb - translate HQL against a mapped model
#[derive(Debug, Parser)]
#[command(name = "hqldb", version, about = "HQL splitter, translator and shell", long_about = None)]
pub struct Cli {
    /// Configuration file with `[settings]` and the mapped entities
    #[arg(short = 'c', long = "config", env = "HQLDB_CONFIG", default_value = "hqldb.toml")]
    pub config: PathBuf,

    /// Query translator to use instead of the configured one
    #[arg(short = 't', long = "translator")]
    pub translator: Option<String>,

    /// Log generated SQL and handler builds to stderr
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the concrete queries a polymorphic query expands to
    Split {
        query: String,

        #[arg(long = "json")]
        json: bool,
    },

    /// Print the SQL every concrete statement of a query runs
    Translate {
        query: String,

        /// Parameter binding, `name=value` or `1=value`; values are JSON,
        /// arrays bind a list, anything else binds as text
        #[arg(short = 'p', long = "param", value_parser = parse_binding)]
        params: Vec<Binding>,

        #[arg(long = "json")]
        json: bool,
    },

    /// Interactive session over an in-memory database built from the config
    Shell,
}

///
/// Binding
///

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub parameter: QueryParameter,
    pub value: BoundArg,
}

///
/// BoundArg
///

#[derive(Clone, Debug, PartialEq)]
pub enum BoundArg {
    Single(Value),
    List(Vec<Value>),
}

/// `name=value`, `:name=value` or `N=value`.
pub fn parse_binding(arg: &str) -> Result<Binding, String> {
    let (name, raw) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{arg}'"));
    }

    Ok(Binding {
        parameter: parse_parameter(name),
        value: parse_value(raw.trim()),
    })
}

pub fn parse_parameter(name: &str) -> QueryParameter {
    let name = name.trim_start_matches('?');

    match name.parse::<u32>() {
        Ok(position) => QueryParameter::positional(position),
        Err(_) => QueryParameter::from(name),
    }
}

pub fn parse_value(raw: &str) -> BoundArg {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => BoundArg::List(
            items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        ),
        Ok(json) => BoundArg::Single(
            serde_json::from_value(json).unwrap_or_else(|_| Value::Text(raw.to_string())),
        ),
        Err(_) => BoundArg::Single(Value::Text(raw.to_string())),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_parse_names_positions_and_json_values() {
        let named = parse_binding(":name=\"AF1\"").expect("named binding should parse");
        assert_eq!(named.parameter, QueryParameter::named("name"));
        assert_eq!(named.value, BoundArg::Single(Value::from("AF1")));

        let positional = parse_binding("?2=42").expect("positional binding should parse");
        assert_eq!(positional.parameter, QueryParameter::positional(2));
        assert_eq!(positional.value, BoundArg::Single(Value::Int(42)));

        let list = parse_binding("ids=[1, 2]").expect("list binding should parse");
        assert_eq!(list.value, BoundArg::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn bare_words_bind_as_text() {
        let binding = parse_binding("color=blue").expect("binding should parse");

        assert_eq!(binding.value, BoundArg::Single(Value::from("blue")));
    }

    #[test]
    fn bindings_need_a_name_and_a_value() {
        assert!(parse_binding("name").is_err());
        assert!(parse_binding("=1").is_err());
    }

    #[test]
    fn cli_parses_translate_with_params() {
        let cli = Cli::try_parse_from([
            "hqldb",
            "--config",
            "model.toml",
            "translate",
            "delete from Dog d where d.weight > :w",
            "-p",
            "w=10",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.config, PathBuf::from("model.toml"));
        let Command::Translate { params, json, .. } = cli.command else {
            panic!("expected translate");
        };
        assert!(!json);
        assert_eq!(params.len(), 1);
    }
}
