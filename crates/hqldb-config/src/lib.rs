//! TOML configuration for hqldb: factory `[settings]` plus a description of
//! the mapped entities, resolved into a validated `Metamodel`.
//!
//! ```toml
//! interfaces = ["Named"]
//!
//! [settings]
//! mutation_strategy = "inline"
//!
//! [[entities]]
//! name = "Flight"
//! table = "flight"
//! implements = ["Named"]
//! attributes = [{ name = "name" }, { name = "duration", not_null = true }]
//! ```

mod document;
mod error;

#[cfg(test)]
mod tests;

pub use document::{
    AttributeDescription, CollectionDescription, ColumnDescription, ConfigDocument,
    DiscriminatorDescription, EntityDescription, JoinedTableDescription,
    SecondaryTableDescription, SequenceDescription, UniqueKeyDescription,
};
pub use error::ConfigError;

use hqldb_core::{config::Settings, jdbc::memory::InMemoryDatabase, model::Metamodel};
use std::{fs, path::Path};
use tracing::debug;

///
/// Config
///
/// A resolved configuration file.
///

#[derive(Debug)]
pub struct Config {
    pub settings: Settings,
    pub metamodel: Metamodel,
    pub unique_keys: Vec<UniqueKeyDescription>,
}

impl Config {
    /// Reference database holding every mapped table, sequence and the
    /// configured unique keys.
    pub fn database(&self) -> Result<InMemoryDatabase, ConfigError> {
        let database = InMemoryDatabase::with_mapped_tables(&self.metamodel)?;

        for key in &self.unique_keys {
            let columns: Vec<&str> = key.columns.iter().map(String::as_str).collect();
            database.add_unique_key(&key.table, &key.name, &columns)?;
        }

        Ok(database)
    }
}

impl TryFrom<ConfigDocument> for Config {
    type Error = ConfigError;

    fn try_from(document: ConfigDocument) -> Result<Self, Self::Error> {
        let metamodel = document.metamodel()?;

        Ok(Self {
            settings: document.settings,
            metamodel,
            unique_keys: document.unique_keys,
        })
    }
}

/// Parse and resolve a configuration from TOML source.
pub fn from_toml_str(source: &str) -> Result<Config, ConfigError> {
    Config::try_from(ConfigDocument::parse(source)?)
}

/// Read, parse and resolve the configuration file at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config = from_toml_str(&source)?;
    debug!(
        path = %path.display(),
        entities = config.metamodel.entities().count(),
        "configuration loaded"
    );

    Ok(config)
}
