use crate::{
    model::Metamodel,
    sqm::{SqmRoot, SqmStatement},
};
use tracing::warn;

/// Split a statement whose roots name polymorphic types into one statement
/// per combination of concrete implementors.
///
/// Roots naming a mapped entity resolve to that entity alone; its
/// subclasses are covered by the entity's own table group. An empty result
/// means some root has no persistent implementor.
#[must_use]
pub fn split_polymorphic(statement: &SqmStatement, metamodel: &Metamodel) -> Vec<SqmStatement> {
    let roots: Vec<&SqmRoot> = match statement {
        SqmStatement::Select(select) => select.roots.iter().collect(),
        SqmStatement::Update(update) => vec![&update.target],
        SqmStatement::Delete(delete) => vec![&delete.target],
        SqmStatement::Insert(_) => return vec![statement.clone()],
    };

    let mut combinations: Vec<Vec<String>> = vec![Vec::new()];
    for root in &roots {
        let implementors = metamodel.implementors(&root.entity);
        combinations = combinations
            .into_iter()
            .flat_map(|prefix| {
                implementors.iter().map(move |implementor| {
                    let mut next = prefix.clone();
                    next.push(implementor.clone());
                    next
                })
            })
            .collect();
    }

    if combinations.is_empty() {
        let names: Vec<&str> = roots.iter().map(|r| r.entity.as_str()).collect();
        warn!(types = ?names, "no persistent classes found for query");
        return Vec::new();
    }

    combinations
        .into_iter()
        .map(|entities| with_root_entities(statement, &entities))
        .collect()
}

fn with_root_entities(statement: &SqmStatement, entities: &[String]) -> SqmStatement {
    let mut statement = statement.clone();
    let roots: Vec<&mut SqmRoot> = match &mut statement {
        SqmStatement::Select(select) => select.roots.iter_mut().collect(),
        SqmStatement::Update(update) => vec![&mut update.target],
        SqmStatement::Delete(delete) => vec![&mut delete.target],
        SqmStatement::Insert(insert) => vec![&mut insert.target],
    };
    for (root, entity) in roots.into_iter().zip(entities) {
        root.entity.clone_from(entity);
    }

    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sqm::{SqmDeleteStatement, SqmSelectStatement},
        test_support,
    };

    fn root(entity: &str, alias: &str) -> SqmRoot {
        SqmRoot {
            entity: entity.to_string(),
            alias: alias.to_string(),
            implicit_alias: false,
        }
    }

    fn root_entities(statement: &SqmStatement) -> Vec<String> {
        match statement {
            SqmStatement::Select(select) => select.roots.iter().map(|r| r.entity.clone()).collect(),
            SqmStatement::Delete(delete) => vec![delete.target.entity.clone()],
            _ => Vec::new(),
        }
    }

    #[test]
    fn interface_root_splits_per_implementor() {
        let metamodel = test_support::metamodel();
        let statement = SqmStatement::Select(SqmSelectStatement {
            roots: vec![root("Named", "n")],
            ..SqmSelectStatement::default()
        });

        let split = split_polymorphic(&statement, &metamodel);
        let entities: Vec<Vec<String>> = split.iter().map(root_entities).collect();

        assert_eq!(
            entities,
            vec![vec!["Animal".to_string()], vec!["Flight".to_string()]]
        );
    }

    #[test]
    fn two_polymorphic_roots_multiply() {
        let metamodel = test_support::metamodel();
        let statement = SqmStatement::Select(SqmSelectStatement {
            roots: vec![root("Named", "a"), root("Named", "b")],
            ..SqmSelectStatement::default()
        });

        assert_eq!(split_polymorphic(&statement, &metamodel).len(), 4);
    }

    #[test]
    fn entity_root_is_left_alone() {
        let metamodel = test_support::metamodel();
        let statement = SqmStatement::Delete(SqmDeleteStatement {
            target: root("Animal", "a"),
            predicate: None,
        });

        let split = split_polymorphic(&statement, &metamodel);

        assert_eq!(split, vec![statement]);
    }

    #[test]
    fn interface_without_implementors_yields_nothing() {
        let metamodel = test_support::metamodel();
        let statement = SqmStatement::Select(SqmSelectStatement {
            roots: vec![root("Thing", "t")],
            ..SqmSelectStatement::default()
        });

        assert!(split_polymorphic(&statement, &metamodel).is_empty());
    }
}
