//! Mapping metamodel: entities, their tables and columns, and the type
//! lookups the query layer needs (imports, implementors, hierarchies).

mod data;
mod entity;
mod metamodel;


pub use data::EntityData;
pub use entity::{
    AttributeKind, AttributeMapping, BasicMapping, CollectionMapping, DiscriminatorMapping,
    EntityMapping, EntityMappingBuilder, IdGeneration, IdentifierMapping, InheritanceType,
    TableMapping, TableRole, VersionMapping,
};
pub use metamodel::{Metamodel, MetamodelBuilder};

use thiserror::Error as ThisError;

///
/// MappingError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum MappingError {
    #[error("duplicate attribute '{attribute}' on entity '{entity}'")]
    DuplicateAttribute { entity: String, attribute: String },

    #[error("duplicate mapped type name '{entity}'")]
    DuplicateEntity { entity: String },

    #[error("invalid inheritance mapping for '{entity}': {message}")]
    InvalidInheritance { entity: String, message: String },

    #[error("ids for this class must be manually assigned before calling persist(): {entity}")]
    MissingIdentifier { entity: String },

    #[error("entity '{entity}' has no root table")]
    NoTables { entity: String },

    #[error("attribute '{attribute}' of '{entity}' refers to missing table #{table}")]
    TableIndexOutOfRange {
        entity: String,
        attribute: String,
        table: usize,
    },

    #[error("could not resolve property '{attribute}' of '{entity}'")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("unknown entity: {entity}")]
    UnknownEntity { entity: String },

    #[error("import '{name}' refers to unmapped type '{target}'")]
    UnknownImport { name: String, target: String },

    #[error("entity '{entity}' extends unmapped type '{super_type}'")]
    UnknownSuperType { entity: String, super_type: String },
}
