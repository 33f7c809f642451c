use super::*;
use hqldb_core::{
    config::MutationStrategyKind,
    model::{IdGeneration, MappingError},
    value::Value,
};

const FIXTURE: &str = r#"
interfaces = ["Named", "Thing"]
imports = { Plane = "Flight" }

[settings]
mutation_strategy = "inline"
use_sql_comments = true

[[entities]]
name = "Flight"
table = "flight"
implements = ["Named"]
attributes = [{ name = "name" }, { name = "duration", not_null = true }]

[[entities]]
name = "Dog"
extends = "Animal"
joined_table = { name = "dog", key_column = "animal_id" }
attributes = [{ name = "breed" }]

[[entities]]
name = "Animal"
table = "animal"
inheritance = "joined"
sequence = { name = "animal_seq", increment_size = 10 }
version = { attribute = "version", column = "version" }
implements = ["Named"]
attributes = [{ name = "name" }, { name = "weight", column = "weight_kg" }]
collections = [
    { name = "nicknames", table = "animal_nicknames", key_column = "animal_id", element_column = "nickname" },
]

[[entities]]
name = "Person"
table = "person"
inheritance = "single_table"
discriminator = { column = "kind", value = "P" }
attributes = [{ name = "name" }]

[[entities.secondary_tables]]
name = "person_detail"
key_column = "person_id"
optional = true
attributes = [{ name = "email" }]

[[entities]]
name = "Employee"
extends = "Person"
discriminator_value = "E"
attributes = [{ name = "salary" }]

[[entities]]
name = "Sky"
table = "sky"
attributes = [{ name = "color" }, { name = "day" }, { name = "month" }]

[[unique_keys]]
table = "sky"
name = "UK_sky"
columns = ["color", "day", "month"]
"#;

fn fixture() -> Config {
    from_toml_str(FIXTURE).expect("fixture should resolve")
}

fn tables(config: &Config, entity: &str) -> Vec<String> {
    config
        .metamodel
        .entity(entity)
        .expect("entity should exist")
        .tables
        .iter()
        .map(|t| t.name.clone())
        .collect()
}

// ─────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────

#[test]
fn fixture_resolves_settings_and_metamodel() {
    let config = fixture();

    assert_eq!(config.settings.mutation_strategy, MutationStrategyKind::Inline);
    assert!(config.settings.use_sql_comments);
    assert_eq!(config.settings.query_translator, "ast");

    assert_eq!(config.metamodel.implementors("Named"), vec!["Animal", "Flight"]);
    assert!(config.metamodel.implementors("Thing").is_empty());
    assert_eq!(config.metamodel.imported_type("Plane"), Some("Flight"));
}

#[test]
fn subclasses_inherit_their_root_tables() {
    let config = fixture();

    assert_eq!(tables(&config, "Dog"), vec!["animal", "dog"]);
    assert_eq!(tables(&config, "Employee"), vec!["person", "person_detail"]);

    let dog = config.metamodel.entity("Dog").expect("Dog should exist");
    assert_eq!(dog.super_type.as_deref(), Some("Animal"));
    assert_eq!(dog.basic("breed").map(|b| b.table), Some(1));
    assert_eq!(dog.basic("weight").map(|b| b.column.as_str()), Some("weight_kg"));
    assert!(dog.is_versioned());
    assert!(matches!(
        dog.identifier.generation,
        IdGeneration::Sequence { increment_size: 10, .. }
    ));
}

#[test]
fn secondary_tables_keep_their_attributes() {
    let config = fixture();
    let person = config.metamodel.entity("Person").expect("Person should exist");

    assert_eq!(person.basic("email").map(|b| b.table), Some(1));
    assert!(person.tables[1].optional);
    assert_eq!(
        config.metamodel.discriminator_values(person),
        vec![Value::from("P"), Value::from("E")]
    );
}

#[test]
fn flags_and_collections_carry_over() {
    let config = fixture();
    let flight = config.metamodel.entity("Flight").expect("Flight should exist");
    let animal = config.metamodel.entity("Animal").expect("Animal should exist");

    assert_eq!(flight.basic("duration").map(|b| b.nullable), Some(false));
    assert_eq!(
        animal.collection("nicknames").map(|c| c.table.as_str()),
        Some("animal_nicknames")
    );
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = from_toml_str("").expect("empty file should resolve");

    assert_eq!(config.settings, Settings::default());
    assert_eq!(config.metamodel.entities().count(), 0);
}

// ─────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────

#[test]
fn unknown_settings_keys_are_rejected() {
    let err = from_toml_str("[settings]\nquery_cache = true\n").expect_err("unknown key should fail");

    assert!(matches!(err, ConfigError::Parse(_)), "{err:?}");
}

#[test]
fn undeclared_parents_are_unknown_super_types() {
    let source = r#"
[[entities]]
name = "Dog"
extends = "Animal"
"#;
    let err = from_toml_str(source).expect_err("missing parent should fail");

    assert!(
        matches!(err, ConfigError::Mapping(MappingError::UnknownSuperType { .. })),
        "{err:?}"
    );
}

#[test]
fn undeclared_grandparents_are_reported_before_cycles() {
    let source = r#"
[[entities]]
name = "Puppy"
extends = "Dog"

[[entities]]
name = "Dog"
extends = "Animal"
"#;
    let err = from_toml_str(source).expect_err("missing root should fail");

    assert!(
        matches!(
            &err,
            ConfigError::Mapping(MappingError::UnknownSuperType { entity, .. }) if entity == "Dog"
        ),
        "{err:?}"
    );
}

#[test]
fn inheritance_cycles_are_rejected() {
    let source = r#"
[[entities]]
name = "A"
extends = "B"

[[entities]]
name = "B"
extends = "A"
"#;
    let err = from_toml_str(source).expect_err("cycle should fail");

    assert!(matches!(err, ConfigError::InheritanceCycle { .. }), "{err:?}");
}

#[test]
fn subclasses_cannot_redeclare_root_fields() {
    let source = r#"
[[entities]]
name = "Animal"
table = "animal"
inheritance = "joined"

[[entities]]
name = "Dog"
extends = "Animal"
table = "dog"
"#;
    let err = from_toml_str(source).expect_err("subclass table should fail");

    assert!(
        matches!(&err, ConfigError::InvalidEntity { entity, .. } if entity == "Dog"),
        "{err:?}"
    );
}

#[test]
fn roots_need_a_table() {
    let err = from_toml_str("[[entities]]\nname = \"Flight\"\n").expect_err("no table should fail");

    assert!(matches!(err, ConfigError::InvalidEntity { .. }), "{err:?}");
}

#[test]
fn duplicate_entities_are_rejected() {
    let source = r#"
[[entities]]
name = "Flight"
table = "flight"

[[entities]]
name = "Flight"
table = "flight2"
"#;
    let err = from_toml_str(source).expect_err("duplicate should fail");

    assert!(
        matches!(err, ConfigError::Mapping(MappingError::DuplicateEntity { .. })),
        "{err:?}"
    );
}

#[test]
fn missing_files_report_their_path() {
    let err = load("/nonexistent/hqldb.toml").expect_err("missing file should fail");

    assert!(
        matches!(&err, ConfigError::Io { path, .. } if path.ends_with("hqldb.toml")),
        "{err:?}"
    );
}

// ─────────────────────────────────────────────
// Database
// ─────────────────────────────────────────────

#[test]
fn database_holds_mapped_tables() {
    let database = fixture().database().expect("database should build");

    for table in ["flight", "animal", "dog", "animal_nicknames", "person", "person_detail", "sky"] {
        assert!(database.has_table(table), "{table} should exist");
    }
}

#[test]
fn unique_keys_on_unmapped_tables_fail() {
    let mut config = fixture();
    config.unique_keys.push(UniqueKeyDescription {
        table: "cloud".to_string(),
        name: "UK_cloud".to_string(),
        columns: vec!["shape".to_string()],
    });

    let err = config.database().expect_err("unknown table should fail");

    assert!(matches!(err, ConfigError::Database(_)), "{err:?}");
}

// ─────────────────────────────────────────────
// Serde
// ─────────────────────────────────────────────

#[test]
fn documents_survive_a_json_round_trip() {
    let document = ConfigDocument::parse(FIXTURE).expect("fixture should parse");

    let json = serde_json::to_string(&document).expect("document should serialize");
    let back: ConfigDocument = serde_json::from_str(&json).expect("document should deserialize");

    assert_eq!(back, document);
    assert_eq!(
        back.entities[1].discriminator_value.as_ref(),
        None,
        "Dog carries no discriminator value"
    );
    assert_eq!(back.entities[4].discriminator_value, Some(Value::from("E")));
}
