use hqldb_core::{
    hql::{
        CollectionProperty, LoweredCollectionProperty, concrete_queries,
        is_any_collection_property, is_collection_property, lower_collection_property,
        normalized_property_name,
    },
    model::{CollectionMapping, EntityMapping, Metamodel},
    sql::Expression,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const IMPLEMENTORS: [&str; 2] = ["Animal", "Flight"];

fn metamodel() -> Metamodel {
    Metamodel::builder()
        .entity(
            EntityMapping::builder("Animal", "animal")
                .basic("name", "name")
                .implements("Named")
                .build(),
        )
        .entity(
            EntityMapping::builder("Flight", "flight")
                .basic("name", "name")
                .implements("Named")
                .build(),
        )
        .interface("Named")
        .interface("Thing")
        .build()
        .expect("metamodel should build")
}

fn arb_word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn arb_whitespace() -> impl Strategy<Value = String> {
    "[ \t\n]{1,3}"
}

// Canonical property name with its letters' case scrambled.
fn arb_spelling() -> impl Strategy<Value = (CollectionProperty, String)> {
    (0..CollectionProperty::ALL.len(), prop::collection::vec(any::<bool>(), 12)).prop_map(
        |(i, upper)| {
            let property = CollectionProperty::ALL[i];
            let spelled = property
                .canonical_name()
                .chars()
                .zip(upper.iter().cycle())
                .map(|(c, up)| {
                    if *up {
                        c.to_ascii_uppercase()
                    } else {
                        c.to_ascii_lowercase()
                    }
                })
                .collect();

            (property, spelled)
        },
    )
}

///
/// Query splitter
///

proptest! {
    #[test]
    fn queries_without_type_references_pass_through(
        entity in arb_word(),
        alias in arb_word(),
        column in arb_word(),
    ) {
        let query = format!("from {entity} {alias} where {alias}.{column} = :p");

        prop_assert_eq!(concrete_queries(&query, &metamodel()), vec![query]);
    }

    #[test]
    fn every_reference_expands_to_each_implementor(count in 1usize..=3) {
        let roots: Vec<String> = (0..count).map(|i| format!("Named n{i}")).collect();
        let query = format!("from {}", roots.join(", "));

        let out = concrete_queries(&query, &metamodel());

        prop_assert_eq!(out.len(), IMPLEMENTORS.len().pow(u32::try_from(count).unwrap_or(0)));
        prop_assert!(out.iter().all(|q| !q.contains("Named")));
        prop_assert_eq!(out.iter().collect::<BTreeSet<_>>().len(), out.len());
    }

    #[test]
    fn delimiters_survive_the_rewrite(
        before in arb_whitespace(),
        after in arb_whitespace(),
        trailing in arb_whitespace(),
    ) {
        let query = format!("from{before}Named{after}n{trailing}where n.name = :name");

        let out: BTreeSet<String> = concrete_queries(&query, &metamodel()).into_iter().collect();
        let expected: BTreeSet<String> = IMPLEMENTORS
            .iter()
            .map(|implementor| query.replacen("Named", implementor, 1))
            .collect();

        prop_assert_eq!(out, expected);
    }

    #[test]
    fn types_without_implementors_yield_nothing(alias in arb_word()) {
        let query = format!("from Thing {alias}");

        prop_assert!(concrete_queries(&query, &metamodel()).is_empty());
    }
}

///
/// Collection-property resolver
///

proptest! {
    #[test]
    fn property_names_resolve_in_any_case((property, spelled) in arb_spelling()) {
        prop_assert_eq!(CollectionProperty::from_name(&spelled), Some(property));
        prop_assert_eq!(normalized_property_name(&spelled), Some(property.canonical_name()));
        prop_assert!(is_any_collection_property(&spelled));
        prop_assert_eq!(
            is_collection_property(&spelled),
            property != CollectionProperty::Index
        );
    }

    #[test]
    fn other_names_are_not_properties(name in "[a-zA-Z]{1,12}") {
        let known = CollectionProperty::ALL
            .iter()
            .any(|p| p.canonical_name().eq_ignore_ascii_case(&name));
        prop_assume!(!known);

        prop_assert!(!is_any_collection_property(&name));
        prop_assert!(normalized_property_name(&name).is_none());
    }

    #[test]
    fn index_properties_need_an_index_column(
        table in arb_word(),
        indexed in any::<bool>(),
    ) {
        let mut collection = CollectionMapping::new(&table, "owner_id", "element");
        if indexed {
            collection = collection.indexed("position");
        }
        let owner = Expression::column(Some("o"), "id");

        for property in [CollectionProperty::MaxIndex, CollectionProperty::MinIndex] {
            let lowered = lower_collection_property(property, &collection, owner.clone());
            prop_assert_eq!(lowered.is_some(), indexed);
        }

        let size = lower_collection_property(CollectionProperty::Size, &collection, owner);
        prop_assert!(matches!(size, Some(LoweredCollectionProperty::Scalar(_))));
    }
}
