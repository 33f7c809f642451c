use super::InMemoryDatabase;
use crate::{
    jdbc::JdbcError,
    model::{EntityMapping, IdGeneration, InheritanceType, Metamodel},
    sql::{ColumnDefinition, TableDefinition},
};
use std::collections::BTreeMap;

impl InMemoryDatabase {
    /// Database holding the mapped tables and sequences of `metamodel`.
    pub fn with_mapped_tables(metamodel: &Metamodel) -> Result<Self, JdbcError> {
        let database = Self::new();
        database.create_mapped_tables(metamodel)?;

        Ok(database)
    }

    /// Create every table, collection table and sequence the metamodel maps.
    /// Columns shared by a hierarchy are merged into one definition per table.
    pub fn create_mapped_tables(&self, metamodel: &Metamodel) -> Result<(), JdbcError> {
        let mut tables: BTreeMap<String, TableDefinition> = BTreeMap::new();

        // parents first, so inherited columns keep the parent's nullability
        let entities = metamodel
            .entities()
            .filter(|e| !e.is_subclass())
            .flat_map(|root| metamodel.hierarchy_of(root));

        for entity in entities {
            let shares_root_table =
                entity.is_subclass() && entity.inheritance == InheritanceType::SingleTable;

            for (index, table) in entity.tables.iter().enumerate() {
                let definition = tables
                    .entry(table.name.to_ascii_lowercase())
                    .or_insert_with(|| {
                        TableDefinition::new(&table.name)
                            .column(&table.key_column, false)
                            .primary_key(&[&table.key_column])
                    });

                if index == 0 {
                    add_root_columns(definition, entity);
                }
                for (_, basic) in entity.table_attributes(index) {
                    let nullable = basic.nullable || (shares_root_table && index == 0);
                    add_column(definition, &basic.column, nullable);
                }
            }

            for (_, collection) in entity.collections() {
                let definition = tables
                    .entry(collection.table.to_ascii_lowercase())
                    .or_insert_with(|| TableDefinition::new(&collection.table));
                add_column(definition, &collection.key_column, false);
                if let Some(index_column) = &collection.index_column {
                    add_column(definition, index_column, false);
                }
                add_column(definition, &collection.element_column, true);
            }

            if let IdGeneration::Sequence {
                name,
                increment_size,
            } = &entity.identifier.generation
                && !entity.is_subclass()
            {
                self.create_sequence(name, 1, *increment_size);
            }
        }

        for definition in tables.into_values() {
            self.create_table(definition)?;
        }

        Ok(())
    }
}

fn add_root_columns(definition: &mut TableDefinition, entity: &EntityMapping) {
    if let Some(version) = &entity.version {
        add_column(definition, &version.column, false);
    }
    if let Some(discriminator) = &entity.discriminator {
        add_column(definition, &discriminator.column, false);
    }
}

fn add_column(definition: &mut TableDefinition, column: &str, nullable: bool) {
    if definition.column_index(column).is_none() {
        definition.columns.push(ColumnDefinition::new(column, nullable));
    }
}
