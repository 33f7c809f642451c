mod args;
mod shell;
mod translate;

use args::{Cli, Command};
use clap::Parser;
use hqldb::{
    config::ConfigError,
    core::{Error, jdbc::JdbcError, session::SessionFactory},
};
use rustyline::error::ReadlineError;
use shell::Shell;
use std::{process::ExitCode, sync::Arc};
use thiserror::Error as ThisError;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

///
/// CliError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] Error),

    #[error(transparent)]
    Jdbc(#[from] JdbcError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Readline(#[from] ReadlineError),

    #[error("unknown shell command '\\{0}', try \\help")]
    UnknownCommand(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

// RUST_LOG wins; --verbose shows the generated SQL.
fn init_logging(verbose: bool) {
    let default = if verbose { "warn,hqldb=debug,hqldb_core=debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = hqldb::config::load(&cli.config)?;
    if let Some(name) = &cli.translator {
        config.settings.query_translator.clone_from(name);
    }
    debug!(config = %cli.config.display(), translator = %config.settings.query_translator, "starting");

    match cli.command {
        Command::Split { query, json } => {
            println!("{}", translate::split(&config.metamodel, &query, json)?);
        }
        Command::Translate {
            query,
            params,
            json,
        } => {
            let database = config.database()?;
            let translator = translate::resolve_translator(&config.settings, None)?;
            let translated = translate::translate(
                &config.metamodel,
                &config.settings,
                &database,
                translator.as_ref(),
                &query,
                &params,
            )?;
            print!("{}", translate::format(&translated, json)?);
        }
        Command::Shell => {
            let database = config.database()?;
            let factory = SessionFactory::builder(config.metamodel, Arc::new(database.clone()))
                .settings(config.settings)
                .build()?;

            let result = Shell::new(factory.clone(), database)?.run();
            factory.close()?;
            result?;
        }
    }

    Ok(())
}
