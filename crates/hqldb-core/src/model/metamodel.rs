use crate::{
    model::{
        MappingError,
        entity::{AttributeKind, EntityMapping, InheritanceType, TableRole},
    },
    value::Value,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// Metamodel
///
/// Immutable registry of mapped entities, interfaces and imported names.
/// Built once, then shared read-only by every factory component.
///

#[derive(Debug, Default)]
pub struct Metamodel {
    entities: BTreeMap<String, Arc<EntityMapping>>,
    interfaces: BTreeSet<String>,
    imports: BTreeMap<String, String>,
}

impl Metamodel {
    #[must_use]
    pub fn builder() -> MetamodelBuilder {
        MetamodelBuilder::default()
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Arc<EntityMapping>> {
        self.entities.get(name)
    }

    pub fn require_entity(&self, name: &str) -> Result<&Arc<EntityMapping>, MappingError> {
        self.entity(name)
            .ok_or_else(|| MappingError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityMapping>> {
        self.entities.values()
    }

    #[must_use]
    pub fn is_interface(&self, name: &str) -> bool {
        self.interfaces.contains(name)
    }

    /// Resolve an imported short name to a mapped entity or interface name.
    /// Names that resolve to neither yield `None`.
    #[must_use]
    pub fn imported_type(&self, name: &str) -> Option<&str> {
        let resolved = self.imports.get(name).map_or(name, String::as_str);

        if let Some((key, _)) = self.entities.get_key_value(resolved) {
            return Some(key);
        }

        self.interfaces.get(resolved).map(String::as_str)
    }

    /// Resolve a name (possibly imported) to an entity mapping.
    #[must_use]
    pub fn resolve_entity(&self, name: &str) -> Option<&Arc<EntityMapping>> {
        self.imported_type(name).and_then(|n| self.entity(n))
    }

    /// Whether `entity` is `type_name`, implements it, or descends from a
    /// type that does.
    #[must_use]
    pub fn is_assignable(&self, type_name: &str, entity: &EntityMapping) -> bool {
        let mut current = Some(entity);

        while let Some(e) = current {
            if e.name == type_name || e.implements.iter().any(|i| i == type_name) {
                return true;
            }
            current = e.super_type.as_deref().and_then(|s| self.entity(s).map(Arc::as_ref));
        }

        false
    }

    /// Topmost mapped entities assignable to `type_name`.
    ///
    /// A mapped entity name yields itself. Entities whose mapped supertype is
    /// already assignable are left out, since querying the supertype covers
    /// them. An explicitly polymorphic entity is only returned when it is
    /// named directly.
    #[must_use]
    pub fn implementors(&self, type_name: &str) -> Vec<String> {
        let mut results = Vec::new();

        for entity in self.entities.values() {
            let is_mapped_type = entity.name == type_name;

            if entity.explicit_polymorphism {
                if is_mapped_type {
                    return vec![entity.name.clone()];
                }
                continue;
            }

            if is_mapped_type {
                results.push(entity.name.clone());
            } else if self.is_assignable(type_name, entity) {
                let assignable_super = entity
                    .super_type
                    .as_deref()
                    .and_then(|s| self.entity(s))
                    .is_some_and(|parent| self.is_assignable(type_name, parent));

                if !assignable_super {
                    results.push(entity.name.clone());
                }
            }
        }

        results
    }

    /// `entity` and every mapped descendant, parents first.
    #[must_use]
    pub fn hierarchy_of<'a>(&'a self, entity: &'a EntityMapping) -> Vec<&'a EntityMapping> {
        let mut out = vec![entity];
        let mut i = 0;
        while i < out.len() {
            let parent = out[i].name.as_str();
            out.extend(
                self.entities
                    .values()
                    .filter(|e| e.super_type.as_deref() == Some(parent))
                    .map(Arc::as_ref),
            );
            i += 1;
        }

        out
    }

    /// Discriminator values selecting `entity` and its descendants.
    #[must_use]
    pub fn discriminator_values(&self, entity: &EntityMapping) -> Vec<Value> {
        self.hierarchy_of(entity)
            .into_iter()
            .filter(|e| !e.is_abstract)
            .filter_map(|e| e.discriminator.as_ref().map(|d| d.value.clone()))
            .collect()
    }

    /// Entity owning physical table `table` as its root.
    #[must_use]
    pub fn entity_for_table(&self, table: &str) -> Option<&Arc<EntityMapping>> {
        self.entities
            .values()
            .find(|e| e.super_type.is_none() && e.root_table().name.eq_ignore_ascii_case(table))
    }
}

///
/// MetamodelBuilder
///

#[derive(Debug, Default)]
pub struct MetamodelBuilder {
    entities: Vec<EntityMapping>,
    interfaces: BTreeSet<String>,
    imports: BTreeMap<String, String>,
}

impl MetamodelBuilder {
    #[must_use]
    pub fn entity(mut self, entity: EntityMapping) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn import(mut self, short_name: &str, name: &str) -> Self {
        self.imports.insert(short_name.to_string(), name.to_string());
        self
    }

    pub fn build(self) -> Result<Metamodel, MappingError> {
        let mut entities = BTreeMap::new();
        for entity in self.entities {
            validate_entity(&entity)?;
            let name = entity.name.clone();
            if entities.insert(name.clone(), Arc::new(entity)).is_some() {
                return Err(MappingError::DuplicateEntity { entity: name });
            }
        }

        for entity in entities.values() {
            if let Some(super_type) = &entity.super_type {
                let parent: &Arc<EntityMapping> =
                    entities
                        .get(super_type)
                        .ok_or_else(|| MappingError::UnknownSuperType {
                            entity: entity.name.clone(),
                            super_type: super_type.clone(),
                        })?;
                if parent.inheritance == InheritanceType::None {
                    return Err(MappingError::InvalidInheritance {
                        entity: entity.name.clone(),
                        message: format!("supertype '{super_type}' declares no inheritance type"),
                    });
                }
            }
        }

        if let Some(name) = self.interfaces.iter().find(|i| entities.contains_key(*i)) {
            return Err(MappingError::DuplicateEntity {
                entity: name.clone(),
            });
        }

        let imports = build_imports(&entities, &self.interfaces, self.imports)?;

        Ok(Metamodel {
            entities,
            interfaces: self.interfaces,
            imports,
        })
    }
}

fn validate_entity(entity: &EntityMapping) -> Result<(), MappingError> {
    let name = &entity.name;

    match entity.tables.first() {
        Some(root) if root.role == TableRole::Root => {}
        _ => return Err(MappingError::NoTables { entity: name.clone() }),
    }

    let mut seen = BTreeSet::new();
    for attribute in &entity.attributes {
        if !seen.insert(attribute.name.as_str()) || entity.is_identifier(&attribute.name) {
            return Err(MappingError::DuplicateAttribute {
                entity: name.clone(),
                attribute: attribute.name.clone(),
            });
        }
        if let AttributeKind::Basic(basic) = &attribute.kind
            && basic.table >= entity.tables.len()
        {
            return Err(MappingError::TableIndexOutOfRange {
                entity: name.clone(),
                attribute: attribute.name.clone(),
                table: basic.table,
            });
        }
    }

    if let Some(version) = &entity.version
        && seen.contains(version.attribute.as_str())
    {
        return Err(MappingError::DuplicateAttribute {
            entity: name.clone(),
            attribute: version.attribute.clone(),
        });
    }

    let has_subclass_tables = entity.tables.iter().any(|t| t.role == TableRole::Subclass);
    if has_subclass_tables && entity.inheritance != InheritanceType::Joined {
        return Err(MappingError::InvalidInheritance {
            entity: name.clone(),
            message: "subclass tables require joined inheritance".to_string(),
        });
    }
    if entity.inheritance == InheritanceType::SingleTable && entity.discriminator.is_none() {
        return Err(MappingError::InvalidInheritance {
            entity: name.clone(),
            message: "single-table inheritance requires a discriminator".to_string(),
        });
    }

    Ok(())
}

// Explicit imports win; unqualified names are auto-imported unless two
// mapped types share one.
fn build_imports(
    entities: &BTreeMap<String, Arc<EntityMapping>>,
    interfaces: &BTreeSet<String>,
    explicit: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, MappingError> {
    let mut auto: BTreeMap<String, Option<String>> = BTreeMap::new();
    for name in entities.keys().chain(interfaces.iter()) {
        let short = name.rsplit('.').next().unwrap_or(name);
        if short == name {
            continue;
        }
        auto.entry(short.to_string())
            .and_modify(|existing| *existing = None)
            .or_insert_with(|| Some(name.clone()));
    }

    let mut imports: BTreeMap<String, String> = auto
        .into_iter()
        .filter_map(|(short, name)| name.map(|n| (short, n)))
        .collect();

    for (short, name) in explicit {
        if !entities.contains_key(&name) && !interfaces.contains(&name) {
            return Err(MappingError::UnknownImport {
                name: short,
                target: name,
            });
        }
        imports.insert(short, name);
    }

    Ok(imports)
}
