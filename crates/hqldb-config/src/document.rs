use crate::error::ConfigError;
use hqldb_core::{
    config::Settings,
    model::{
        CollectionMapping, EntityMapping, EntityMappingBuilder, InheritanceType, MappingError,
        Metamodel,
    },
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

///
/// ConfigDocument
///
/// One configuration file: factory settings, the mapped entities, and the
/// constraints to add when a reference database is created from it.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigDocument {
    pub settings: Settings,
    pub interfaces: Vec<String>,
    pub imports: BTreeMap<String, String>,
    pub entities: Vec<EntityDescription>,
    pub unique_keys: Vec<UniqueKeyDescription>,
}

impl ConfigDocument {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Resolve every entity description, parents before subclasses, into a
    /// validated metamodel. Entities keep their declaration order.
    pub fn metamodel(&self) -> Result<Metamodel, ConfigError> {
        let mut seen = BTreeSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.name.as_str()) {
                return Err(MappingError::DuplicateEntity {
                    entity: entity.name.clone(),
                }
                .into());
            }
        }

        let mut resolved: BTreeMap<&str, EntityMapping> = BTreeMap::new();
        let mut pending: Vec<&EntityDescription> = self.entities.iter().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut waiting = Vec::new();

            for description in pending {
                let mapping = match description.extends.as_deref() {
                    None => description.root()?,
                    Some(parent) => match resolved.get(parent) {
                        Some(parent) => description.subclass(parent)?,
                        None => {
                            waiting.push(description);
                            continue;
                        }
                    },
                };
                resolved.insert(description.name.as_str(), mapping);
            }

            if waiting.len() == before {
                return Err(self.unresolvable(&waiting));
            }
            pending = waiting;
        }

        let mut builder = Metamodel::builder();
        for description in &self.entities {
            if let Some(mapping) = resolved.remove(description.name.as_str()) {
                builder = builder.entity(mapping);
            }
        }
        for interface in &self.interfaces {
            builder = builder.interface(interface);
        }
        for (short_name, name) in &self.imports {
            builder = builder.import(short_name, name);
        }

        Ok(builder.build()?)
    }

    // Every stuck entity waits on a parent; one that is never declared is
    // reported first, otherwise the stuck entities form a cycle.
    fn unresolvable(&self, stuck: &[&EntityDescription]) -> ConfigError {
        let declared = |name: &str| self.entities.iter().any(|e| e.name == name);

        for description in stuck {
            if let Some(parent) = &description.extends
                && !declared(parent)
            {
                return MappingError::UnknownSuperType {
                    entity: description.name.clone(),
                    super_type: parent.clone(),
                }
                .into();
            }
        }

        ConfigError::InheritanceCycle {
            entity: stuck
                .first()
                .map(|e| e.name.clone())
                .unwrap_or_default(),
        }
    }
}

///
/// EntityDescription
///
/// A root names its `table`; a subclass names the entity it `extends` and
/// inherits the root's tables, identifier, version and discriminator column.
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityDescription {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ColumnDescription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceDescription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ColumnDescription>,

    pub inheritance: InheritanceType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<DiscriminatorDescription>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator_value: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_table: Option<JoinedTableDescription>,

    pub attributes: Vec<AttributeDescription>,
    pub secondary_tables: Vec<SecondaryTableDescription>,
    pub collections: Vec<CollectionDescription>,
    pub implements: Vec<String>,

    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub explicit_polymorphism: bool,
}

impl EntityDescription {
    fn root(&self) -> Result<EntityMapping, ConfigError> {
        let Some(table) = &self.table else {
            return Err(ConfigError::invalid_entity(
                &self.name,
                "a root entity needs a table",
            ));
        };
        if self.joined_table.is_some() || self.discriminator_value.is_some() {
            return Err(ConfigError::invalid_entity(
                &self.name,
                "joined_table and discriminator_value need 'extends'",
            ));
        }

        let mut builder = EntityMapping::builder(&self.name, table).inheritance(self.inheritance);
        if let Some(id) = &self.id {
            builder = builder.identifier(&id.attribute, &id.column);
        }
        if let Some(sequence) = &self.sequence {
            builder = builder.sequence(&sequence.name, sequence.increment_size);
        }
        if let Some(version) = &self.version {
            builder = builder.version(&version.attribute, &version.column);
        }
        if let Some(discriminator) = &self.discriminator {
            builder = builder.discriminator(&discriminator.column, discriminator.value.clone());
        }

        Ok(self.finish(builder))
    }

    fn subclass(&self, parent: &EntityMapping) -> Result<EntityMapping, ConfigError> {
        let root_only = [
            ("table", self.table.is_some()),
            ("id", self.id.is_some()),
            ("sequence", self.sequence.is_some()),
            ("version", self.version.is_some()),
            ("discriminator", self.discriminator.is_some()),
            ("inheritance", self.inheritance != InheritanceType::None),
        ];
        if let Some((field, _)) = root_only.iter().find(|(_, set)| *set) {
            return Err(ConfigError::invalid_entity(
                &self.name,
                format!("'{field}' is inherited from the hierarchy root"),
            ));
        }

        let mut builder = EntityMapping::subclass_of(parent, &self.name);
        if let Some(value) = &self.discriminator_value {
            builder = builder.discriminator_value(value.clone());
        }
        if let Some(joined) = &self.joined_table {
            builder = builder.joined_table(&joined.name, &joined.key_column);
        }

        Ok(self.finish(builder))
    }

    fn finish(&self, mut builder: EntityMappingBuilder) -> EntityMapping {
        builder = apply_attributes(builder, &self.attributes);

        for secondary in &self.secondary_tables {
            builder = builder.secondary_table(&secondary.name, &secondary.key_column, secondary.optional);
            builder = apply_attributes(builder, &secondary.attributes);
        }

        for collection in &self.collections {
            let mut mapping = CollectionMapping::new(
                &collection.table,
                &collection.key_column,
                &collection.element_column,
            );
            if let Some(index_column) = &collection.index_column {
                mapping = mapping.indexed(index_column);
            }
            builder = builder.collection(&collection.name, mapping);
        }

        for interface in &self.implements {
            builder = builder.implements(interface);
        }
        if self.is_abstract {
            builder = builder.abstract_type();
        }
        if self.explicit_polymorphism {
            builder = builder.explicit_polymorphism();
        }

        builder.build()
    }
}

// attributes land in the table most recently opened on the builder
fn apply_attributes(
    mut builder: EntityMappingBuilder,
    attributes: &[AttributeDescription],
) -> EntityMappingBuilder {
    for attribute in attributes {
        let column = attribute.column.as_deref().unwrap_or(&attribute.name);
        builder = if attribute.not_null {
            builder.not_null(&attribute.name, column)
        } else {
            builder.basic(&attribute.name, column)
        };
    }

    builder
}

///
/// ColumnDescription
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDescription {
    pub attribute: String,
    pub column: String,
}

///
/// SequenceDescription
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceDescription {
    pub name: String,

    #[serde(default = "SequenceDescription::default_increment_size")]
    pub increment_size: i64,
}

impl SequenceDescription {
    const fn default_increment_size() -> i64 {
        1
    }
}

///
/// DiscriminatorDescription
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscriminatorDescription {
    pub column: String,
    pub value: Value,
}

///
/// JoinedTableDescription
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JoinedTableDescription {
    pub name: String,
    pub key_column: String,
}

///
/// SecondaryTableDescription
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SecondaryTableDescription {
    pub name: String,
    pub key_column: String,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub attributes: Vec<AttributeDescription>,
}

///
/// AttributeDescription
///
/// `column` defaults to the attribute name.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeDescription {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,

    #[serde(default)]
    pub not_null: bool,
}

///
/// CollectionDescription
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionDescription {
    pub name: String,
    pub table: String,
    pub key_column: String,
    pub element_column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_column: Option<String>,
}

///
/// UniqueKeyDescription
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueKeyDescription {
    pub table: String,
    pub name: String,
    pub columns: Vec<String>,
}
