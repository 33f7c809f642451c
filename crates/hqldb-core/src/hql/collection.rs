//! Collection pseudo-properties (`size`, `elements`, `maxIndex`, ...) and
//! their lowering against a collection table.

use crate::{
    model::CollectionMapping,
    sql::{
        AggregateFunction, Expression, FromItem, Predicate, SelectItem, SelectStatement,
        TableReference,
    },
};
use std::fmt;

///
/// CollectionProperty
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CollectionProperty {
    Elements,
    Indices,
    Size,
    MaxIndex,
    MinIndex,
    MaxElement,
    MinElement,
    Index,
}

impl CollectionProperty {
    pub const ALL: [Self; 8] = [
        Self::Elements,
        Self::Indices,
        Self::Size,
        Self::MaxIndex,
        Self::MinIndex,
        Self::MaxElement,
        Self::MinElement,
        Self::Index,
    ];

    #[must_use]
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Elements => "elements",
            Self::Indices => "indices",
            Self::Size => "size",
            Self::MaxIndex => "maxIndex",
            Self::MinIndex => "minIndex",
            Self::MaxElement => "maxElement",
            Self::MinElement => "minElement",
            Self::Index => "index",
        }
    }

    /// Case-insensitive lookup over every pseudo-property, `index` included.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lowered = name.to_lowercase();

        Self::ALL
            .into_iter()
            .find(|p| p.canonical_name().to_lowercase() == lowered)
    }

    /// Evaluates to one value per owner rather than a set of values.
    #[must_use]
    pub const fn is_scalar(self) -> bool {
        !matches!(self, Self::Elements | Self::Indices | Self::Index)
    }
}

impl fmt::Display for CollectionProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Whether `name` is a collection pseudo-property handled here.
///
/// `index` is recognised but left out: it only means something on a joined
/// collection alias and is resolved by the path mapping, not by this pass.
#[must_use]
pub fn is_collection_property(name: &str) -> bool {
    CollectionProperty::from_name(name).is_some_and(|p| p != CollectionProperty::Index)
}

/// Whether `name` is any collection pseudo-property, `index` included.
#[must_use]
pub fn is_any_collection_property(name: &str) -> bool {
    CollectionProperty::from_name(name).is_some()
}

/// Canonical spelling of a recognised pseudo-property name.
#[must_use]
pub fn normalized_property_name(name: &str) -> Option<&'static str> {
    CollectionProperty::from_name(name).map(CollectionProperty::canonical_name)
}

///
/// LoweredCollectionProperty
///

#[derive(Clone, Debug, PartialEq)]
pub enum LoweredCollectionProperty {
    /// Scalar subquery yielding one value per owner.
    Scalar(Expression),

    /// Subquery listing the collection's elements or indices.
    Values(SelectStatement),
}

/// Lower `property` of `collection` owned by the row keyed `owner_key`.
///
/// Returns `None` when the property cannot apply: index properties on an
/// unindexed collection, and `index` itself.
#[must_use]
pub fn lower(
    property: CollectionProperty,
    collection: &CollectionMapping,
    owner_key: Expression,
) -> Option<LoweredCollectionProperty> {
    let column = |name: &str| Expression::column(Some(&collection.table), name);
    let index = collection.index_column.as_deref();

    let subquery = |expression: Expression| SelectStatement {
        selections: vec![SelectItem {
            expression,
            alias: None,
        }],
        from: vec![FromItem {
            root: TableReference {
                table: collection.table.clone(),
                alias: String::new(),
            },
            joins: Vec::new(),
        }],
        predicate: Some(Predicate::eq(column(&collection.key_column), owner_key.clone())),
        ..SelectStatement::default()
    };
    let aggregate = |function: AggregateFunction, name: &str| {
        LoweredCollectionProperty::Scalar(Expression::Subquery(Box::new(subquery(
            Expression::Aggregate {
                function,
                argument: Some(Box::new(column(name))),
                distinct: false,
            },
        ))))
    };

    let lowered = match property {
        CollectionProperty::Size => LoweredCollectionProperty::Scalar(Expression::Subquery(
            Box::new(subquery(Expression::count_star())),
        )),
        CollectionProperty::MaxElement => aggregate(AggregateFunction::Max, &collection.element_column),
        CollectionProperty::MinElement => aggregate(AggregateFunction::Min, &collection.element_column),
        CollectionProperty::MaxIndex => aggregate(AggregateFunction::Max, index?),
        CollectionProperty::MinIndex => aggregate(AggregateFunction::Min, index?),
        CollectionProperty::Elements => {
            LoweredCollectionProperty::Values(subquery(column(&collection.element_column)))
        }
        CollectionProperty::Indices => LoweredCollectionProperty::Values(subquery(column(index?))),
        CollectionProperty::Index => return None,
    };

    Some(lowered)
}
