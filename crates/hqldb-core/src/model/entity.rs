use crate::value::Value;
use serde::{Deserialize, Serialize};

///
/// InheritanceType
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceType {
    #[default]
    None,
    SingleTable,
    Joined,
}

///
/// TableRole
///
/// Position of a table inside an entity's table list. Order is always
/// root, subclass tables root to leaf, then secondary tables.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableRole {
    Root,
    Subclass,
    Secondary,
}

///
/// TableMapping
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableMapping {
    pub name: String,

    /// Column holding the entity identifier in this table.
    pub key_column: String,
    pub role: TableRole,

    /// Rows may be absent (secondary tables only).
    pub optional: bool,
}

///
/// IdGeneration
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum IdGeneration {
    #[default]
    Assigned,
    Sequence {
        name: String,
        increment_size: i64,
    },
}

///
/// IdentifierMapping
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentifierMapping {
    pub attribute: String,
    pub generation: IdGeneration,
}

///
/// BasicMapping
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BasicMapping {
    /// Index into `EntityMapping::tables`.
    pub table: usize,
    pub column: String,
    pub nullable: bool,
}

///
/// CollectionMapping
///
/// Value collection stored in its own table, keyed by the owner's id.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CollectionMapping {
    pub table: String,
    pub key_column: String,
    pub element_column: String,
    pub index_column: Option<String>,
}

impl CollectionMapping {
    #[must_use]
    pub fn new(table: &str, key_column: &str, element_column: &str) -> Self {
        Self {
            table: table.to_string(),
            key_column: key_column.to_string(),
            element_column: element_column.to_string(),
            index_column: None,
        }
    }

    #[must_use]
    pub fn indexed(mut self, index_column: &str) -> Self {
        self.index_column = Some(index_column.to_string());
        self
    }
}

///
/// AttributeKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttributeKind {
    Basic(BasicMapping),
    Collection(CollectionMapping),
}

///
/// AttributeMapping
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeMapping {
    pub name: String,
    pub kind: AttributeKind,
}

///
/// VersionMapping
/// Optimistic-lock counter stored on the root table.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionMapping {
    pub attribute: String,
    pub column: String,
}

///
/// DiscriminatorMapping
/// Discriminator column on the root table and this entity's value in it.
///

#[derive(Clone, Debug, PartialEq)]
pub struct DiscriminatorMapping {
    pub column: String,
    pub value: Value,
}

///
/// EntityMapping
///
/// Resolved, immutable description of one mapped entity. Subclasses carry
/// the full table list and attribute set of their hierarchy.
///

#[derive(Clone, Debug, PartialEq)]
pub struct EntityMapping {
    pub name: String,
    pub super_type: Option<String>,
    pub implements: Vec<String>,
    pub is_abstract: bool,
    pub explicit_polymorphism: bool,
    pub inheritance: InheritanceType,
    pub tables: Vec<TableMapping>,
    pub identifier: IdentifierMapping,
    pub attributes: Vec<AttributeMapping>,
    pub version: Option<VersionMapping>,
    pub discriminator: Option<DiscriminatorMapping>,
}

impl EntityMapping {
    /// Start a hierarchy root stored in `table`, keyed by an assigned `id`.
    #[must_use]
    pub fn builder(name: &str, table: &str) -> EntityMappingBuilder {
        EntityMappingBuilder {
            mapping: Self {
                name: name.to_string(),
                super_type: None,
                implements: Vec::new(),
                is_abstract: false,
                explicit_polymorphism: false,
                inheritance: InheritanceType::None,
                tables: vec![TableMapping {
                    name: table.to_string(),
                    key_column: "id".to_string(),
                    role: TableRole::Root,
                    optional: false,
                }],
                identifier: IdentifierMapping {
                    attribute: "id".to_string(),
                    generation: IdGeneration::Assigned,
                },
                attributes: Vec::new(),
                version: None,
                discriminator: None,
            },
            current_table: 0,
        }
    }

    /// Start a subclass inheriting `parent`'s tables and attributes.
    #[must_use]
    pub fn subclass_of(parent: &Self, name: &str) -> EntityMappingBuilder {
        let mut mapping = parent.clone();
        mapping.name = name.to_string();
        mapping.super_type = Some(parent.name.clone());
        mapping.implements = Vec::new();
        mapping.is_abstract = false;
        mapping.explicit_polymorphism = false;
        // secondary tables of the parent stay at the tail
        let current_table = mapping
            .tables
            .iter()
            .rposition(|t| t.role != TableRole::Secondary)
            .unwrap_or(0);

        EntityMappingBuilder {
            mapping,
            current_table,
        }
    }

    #[must_use]
    pub fn unqualified_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn root_table(&self) -> &TableMapping {
        &self.tables[0]
    }

    #[must_use]
    pub fn id_column(&self) -> &str {
        &self.root_table().key_column
    }

    #[must_use]
    pub fn is_multi_table(&self) -> bool {
        self.tables.len() > 1
    }

    #[must_use]
    pub const fn is_subclass(&self) -> bool {
        self.super_type.is_some()
    }

    #[must_use]
    pub const fn uses_generated_id(&self) -> bool {
        matches!(self.identifier.generation, IdGeneration::Sequence { .. })
    }

    #[must_use]
    pub fn is_identifier(&self, attribute: &str) -> bool {
        self.identifier.attribute == attribute
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeMapping> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn basic(&self, name: &str) -> Option<&BasicMapping> {
        match self.attribute(name).map(|a| &a.kind) {
            Some(AttributeKind::Basic(basic)) => Some(basic),
            _ => None,
        }
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionMapping> {
        match self.attribute(name).map(|a| &a.kind) {
            Some(AttributeKind::Collection(collection)) => Some(collection),
            _ => None,
        }
    }

    pub fn basic_attributes(&self) -> impl Iterator<Item = (&str, &BasicMapping)> {
        self.attributes.iter().filter_map(|a| match &a.kind {
            AttributeKind::Basic(basic) => Some((a.name.as_str(), basic)),
            AttributeKind::Collection(_) => None,
        })
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &CollectionMapping)> {
        self.attributes.iter().filter_map(|a| match &a.kind {
            AttributeKind::Collection(collection) => Some((a.name.as_str(), collection)),
            AttributeKind::Basic(_) => None,
        })
    }

    /// Basic attributes stored in table `index`, in declaration order.
    pub fn table_attributes(&self, index: usize) -> impl Iterator<Item = (&str, &BasicMapping)> {
        self.basic_attributes()
            .filter(move |(_, basic)| basic.table == index)
    }

    #[must_use]
    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    #[must_use]
    pub fn is_version(&self, attribute: &str) -> bool {
        self.version.as_ref().is_some_and(|v| v.attribute == attribute)
    }
}

///
/// EntityMappingBuilder
///
/// Basic attributes land in the most recently added table.
///

#[derive(Debug)]
pub struct EntityMappingBuilder {
    mapping: EntityMapping,
    current_table: usize,
}

impl EntityMappingBuilder {
    /// Identifier attribute and its column in the root table.
    #[must_use]
    pub fn identifier(mut self, attribute: &str, column: &str) -> Self {
        self.mapping.identifier.attribute = attribute.to_string();
        self.mapping.tables[0].key_column = column.to_string();
        self
    }

    #[must_use]
    pub fn sequence(mut self, name: &str, increment_size: i64) -> Self {
        self.mapping.identifier.generation = IdGeneration::Sequence {
            name: name.to_string(),
            increment_size: increment_size.max(1),
        };
        self
    }

    #[must_use]
    pub fn basic(self, name: &str, column: &str) -> Self {
        self.push_basic(name, column, true)
    }

    #[must_use]
    pub fn not_null(self, name: &str, column: &str) -> Self {
        self.push_basic(name, column, false)
    }

    fn push_basic(mut self, name: &str, column: &str, nullable: bool) -> Self {
        self.mapping.attributes.push(AttributeMapping {
            name: name.to_string(),
            kind: AttributeKind::Basic(BasicMapping {
                table: self.current_table,
                column: column.to_string(),
                nullable,
            }),
        });
        self
    }

    #[must_use]
    pub fn collection(mut self, name: &str, collection: CollectionMapping) -> Self {
        self.mapping.attributes.push(AttributeMapping {
            name: name.to_string(),
            kind: AttributeKind::Collection(collection),
        });
        self
    }

    #[must_use]
    pub fn version(mut self, attribute: &str, column: &str) -> Self {
        self.mapping.version = Some(VersionMapping {
            attribute: attribute.to_string(),
            column: column.to_string(),
        });
        self
    }

    #[must_use]
    pub const fn inheritance(mut self, inheritance: InheritanceType) -> Self {
        self.mapping.inheritance = inheritance;
        self
    }

    #[must_use]
    pub fn discriminator(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.mapping.discriminator = Some(DiscriminatorMapping {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Replace this subclass's discriminator value, keeping the column.
    #[must_use]
    pub fn discriminator_value(mut self, value: impl Into<Value>) -> Self {
        if let Some(discriminator) = &mut self.mapping.discriminator {
            discriminator.value = value.into();
        }
        self
    }

    /// Joined-subclass table, inserted before any secondary tables.
    #[must_use]
    pub fn joined_table(mut self, name: &str, key_column: &str) -> Self {
        let position = self
            .mapping
            .tables
            .iter()
            .position(|t| t.role == TableRole::Secondary)
            .unwrap_or(self.mapping.tables.len());

        // shift attribute table indexes past the insertion point
        for attribute in &mut self.mapping.attributes {
            if let AttributeKind::Basic(basic) = &mut attribute.kind
                && basic.table >= position
            {
                basic.table += 1;
            }
        }

        self.mapping.tables.insert(
            position,
            TableMapping {
                name: name.to_string(),
                key_column: key_column.to_string(),
                role: TableRole::Subclass,
                optional: false,
            },
        );
        self.current_table = position;
        self
    }

    #[must_use]
    pub fn secondary_table(mut self, name: &str, key_column: &str, optional: bool) -> Self {
        self.mapping.tables.push(TableMapping {
            name: name.to_string(),
            key_column: key_column.to_string(),
            role: TableRole::Secondary,
            optional,
        });
        self.current_table = self.mapping.tables.len() - 1;
        self
    }

    #[must_use]
    pub fn implements(mut self, interface: &str) -> Self {
        self.mapping.implements.push(interface.to_string());
        self
    }

    #[must_use]
    pub const fn abstract_type(mut self) -> Self {
        self.mapping.is_abstract = true;
        self
    }

    #[must_use]
    pub const fn explicit_polymorphism(mut self) -> Self {
        self.mapping.explicit_polymorphism = true;
        self
    }

    #[must_use]
    pub fn build(self) -> EntityMapping {
        self.mapping
    }
}
