use hqldb_core::{jdbc::JdbcError, model::MappingError};
use std::path::PathBuf;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("database setup failed: {0}")]
    Database(#[from] JdbcError),

    #[error("entity '{entity}' is part of an inheritance cycle")]
    InheritanceCycle { entity: String },

    #[error("invalid entity '{entity}': {message}")]
    InvalidEntity { entity: String, message: String },

    #[error("could not read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid_entity(entity: &str, message: impl Into<String>) -> Self {
        Self::InvalidEntity {
            entity: entity.to_string(),
            message: message.into(),
        }
    }
}
