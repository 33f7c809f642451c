//! Interactive session over an in-memory database.
//!
//! Lines starting with `\` are shell commands; anything else is HQL, run as
//! a select or as a mutation depending on what it parses to.

use crate::{
    CliError,
    args::{Binding, BoundArg, parse_parameter, parse_value},
    translate,
};
use hqldb::core::{
    jdbc::memory::InMemoryDatabase,
    query::QueryRow,
    session::{Session, SessionFactory},
};
use rustyline::{DefaultEditor, error::ReadlineError};
use serde_json::json;
use tracing::debug;

const HELP: &str = "\
\\q                 quit
\\help              this text
\\begin             start a transaction
\\commit            flush and commit
\\rollback          discard pending writes and roll back
\\set NAME VALUE    bind a parameter for the following queries
\\unset [NAME]      clear one binding, or all of them
\\params            list bindings
\\split QUERY       concrete queries of a polymorphic query
\\sql QUERY         SQL a query would run
\\stats             factory statistics as JSON
\\entities          mapped entities";

///
/// Outcome
///

#[derive(Debug, Eq, PartialEq)]
pub enum Outcome {
    Continue,
    Quit,
}

///
/// Shell
///

pub struct Shell {
    factory: SessionFactory,
    database: InMemoryDatabase,
    session: Session,
    bindings: Vec<Binding>,
}

impl Shell {
    pub fn new(factory: SessionFactory, database: InMemoryDatabase) -> Result<Self, CliError> {
        let session = factory.open_session()?;

        Ok(Self {
            factory,
            database,
            session,
            bindings: Vec::new(),
        })
    }

    /// Read-eval-print until `\q` or end of input.
    pub fn run(mut self) -> Result<(), CliError> {
        let mut editor = DefaultEditor::new()?;
        println!("hqldb {} shell, \\help for commands", hqldb::VERSION);

        loop {
            match editor.readline("hqldb> ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(line)?;

                    match self.execute(line) {
                        Ok((Outcome::Quit, _)) => break,
                        Ok((Outcome::Continue, output)) => {
                            if !output.is_empty() {
                                println!("{output}");
                            }
                        }
                        Err(err) => eprintln!("error: {err}"),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("use \\q to exit");
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        self.session.close()?;
        Ok(())
    }

    /// Run one input line and return the text to print.
    pub fn execute(&mut self, line: &str) -> Result<(Outcome, String), CliError> {
        let line = line.trim().trim_end_matches(';').trim_end();

        let Some(command) = line.strip_prefix('\\') else {
            return Ok((Outcome::Continue, self.query(line)?));
        };
        let (name, rest) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, rest)| (name, rest.trim()));

        let output = match name {
            "q" | "quit" => return Ok((Outcome::Quit, String::new())),
            "help" | "?" => HELP.to_string(),
            "begin" => {
                self.session.begin_transaction()?;
                "transaction started".to_string()
            }
            "commit" => {
                self.session.commit()?;
                "committed".to_string()
            }
            "rollback" => {
                self.session.rollback()?;
                "rolled back".to_string()
            }
            "set" => self.set(rest)?,
            "unset" => self.unset(rest),
            "params" => self
                .bindings
                .iter()
                .map(|b| format!("{} = {:?}", b.parameter, b.value))
                .collect::<Vec<_>>()
                .join("\n"),
            "split" => translate::split(self.factory.metamodel(), rest, false)?,
            "sql" => {
                let translated = translate::translate(
                    self.factory.metamodel(),
                    self.factory.settings(),
                    &self.database,
                    self.factory.query_translator(),
                    rest,
                    &self.bindings,
                )?;
                translate::format(&translated, false)?
            }
            "stats" => serde_json::to_string_pretty(&self.factory.statistics().snapshot())?,
            "entities" => self
                .factory
                .metamodel()
                .entities()
                .map(|e| e.name.clone())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => return Err(CliError::UnknownCommand(name.to_string())),
        };

        Ok((Outcome::Continue, output))
    }

    fn set(&mut self, rest: &str) -> Result<String, CliError> {
        let (name, raw) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| CliError::UnknownCommand(format!("set {rest}")))?;
        let parameter = parse_parameter(name);
        let value = parse_value(raw.trim());

        self.bindings.retain(|b| b.parameter != parameter);
        self.bindings.push(Binding {
            parameter: parameter.clone(),
            value,
        });

        Ok(format!("{parameter} bound"))
    }

    fn unset(&mut self, rest: &str) -> String {
        if rest.is_empty() {
            self.bindings.clear();
            return "bindings cleared".to_string();
        }

        let parameter = parse_parameter(rest);
        self.bindings.retain(|b| b.parameter != parameter);

        format!("{parameter} unbound")
    }

    fn query(&mut self, hql: &str) -> Result<String, CliError> {
        let translation = self
            .factory
            .query_translator()
            .translate(hql, self.factory.metamodel())?;
        debug!(query = hql, select = translation.select, "shell query");

        // only bind what the query declares; unknown bindings are rejected
        let declared: Vec<&Binding> = match translation.statements.first() {
            Some(first) => self
                .bindings
                .iter()
                .filter(|b| first.parameters.contains(&b.parameter))
                .collect(),
            None => Vec::new(),
        };

        let mut query = self.session.create_query(hql);
        for binding in declared {
            match &binding.value {
                BoundArg::Single(value) => {
                    query.set_parameter(binding.parameter.clone(), value.clone());
                }
                BoundArg::List(values) => {
                    query.set_parameter_list(binding.parameter.clone(), values.clone());
                }
            }
        }

        if translation.select {
            let rows = query.list()?;
            let count = rows.len();
            let mut lines: Vec<String> = rows.iter().map(render_row).collect();
            lines.push(format!("({count} row{})", if count == 1 { "" } else { "s" }));

            Ok(lines.join("\n"))
        } else {
            let affected = query.execute_update()?;

            Ok(format!("{affected} affected"))
        }
    }
}

fn render_row(row: &QueryRow) -> String {
    let json = match row {
        QueryRow::Tuple(values) | QueryRow::List(values) => json!(values),
        QueryRow::Map(map) => json!(map),
        QueryRow::Instance(_) => json!("<instance>"),
    };

    json.to_string()
}

///
/// TESTS
///
