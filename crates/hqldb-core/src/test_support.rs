use crate::{
    jdbc::memory::InMemoryDatabase,
    model::{CollectionMapping, EntityMapping, InheritanceType, Metamodel},
};

/// Shared fixture model.
///
/// - `Flight`: one table, not-null `duration`, implements `Named`.
/// - `Sky`: one table, unique (color, day, month) once the database is built.
/// - `Animal` <- `Dog`, `Cat`: joined inheritance, pooled sequence, version,
///   `nicknames` value collection; `Animal` implements `Named`.
/// - `Person` <- `Employee`: single table plus an optional secondary table.
/// - `Document`: one versioned table with assigned ids.
/// - `Named` has two implementors, `Thing` none; `Plane` imports `Flight`.
pub(crate) fn metamodel() -> Metamodel {
    let flight = EntityMapping::builder("Flight", "flight")
        .basic("name", "name")
        .not_null("duration", "duration")
        .implements("Named")
        .build();

    let sky = EntityMapping::builder("Sky", "sky")
        .basic("color", "color")
        .basic("day", "day")
        .basic("month", "month")
        .build();

    let animal = EntityMapping::builder("Animal", "animal")
        .sequence("animal_seq", 10)
        .version("version", "version")
        .inheritance(InheritanceType::Joined)
        .basic("name", "name")
        .basic("weight", "weight")
        .collection(
            "nicknames",
            CollectionMapping::new("animal_nicknames", "animal_id", "nickname"),
        )
        .implements("Named")
        .build();
    let dog = EntityMapping::subclass_of(&animal, "Dog")
        .joined_table("dog", "animal_id")
        .basic("breed", "breed")
        .build();
    let cat = EntityMapping::subclass_of(&animal, "Cat")
        .joined_table("cat", "animal_id")
        .basic("lives", "lives")
        .build();

    let person = EntityMapping::builder("Person", "person")
        .inheritance(InheritanceType::SingleTable)
        .discriminator("kind", "P")
        .basic("name", "name")
        .secondary_table("person_detail", "person_id", true)
        .basic("email", "email")
        .build();
    let employee = EntityMapping::subclass_of(&person, "Employee")
        .discriminator_value("E")
        .basic("salary", "salary")
        .build();

    let document = EntityMapping::builder("Document", "document")
        .version("version", "version")
        .basic("title", "title")
        .build();

    Metamodel::builder()
        .entity(flight)
        .entity(sky)
        .entity(animal)
        .entity(dog)
        .entity(cat)
        .entity(person)
        .entity(employee)
        .entity(document)
        .interface("Named")
        .interface("Thing")
        .import("Plane", "Flight")
        .build()
        .expect("fixture metamodel should build")
}

/// Database holding every mapped table of `metamodel`, with `UK_sky`.
pub(crate) fn database(metamodel: &Metamodel) -> InMemoryDatabase {
    let database =
        InMemoryDatabase::with_mapped_tables(metamodel).expect("mapped tables should create");
    database
        .add_unique_key("sky", "UK_sky", &["color", "day", "month"])
        .expect("unique key should apply");

    database
}
