use crate::{
    hql::CollectionProperty,
    sql::{AggregateFunction, BinaryOperator, ComparisonOperator, ScalarFunction},
    sqm::SqmParameterId,
    value::Value,
};

// ─────────────────────────────────────────────
// Roots and paths
// ─────────────────────────────────────────────

///
/// SqmRoot
///
/// A `from` root: a mapped type name (entity or interface before the
/// polymorphic split) and the alias paths are resolved against.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SqmRoot {
    pub entity: String,
    pub alias: String,

    /// The alias was generated, not written in the query.
    pub implicit_alias: bool,
}

///
/// SqmPath
/// `alias.attribute`; attribute `id` always names the identifier.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SqmPath {
    pub alias: String,
    pub attribute: String,
}

impl SqmPath {
    #[must_use]
    pub fn new(alias: &str, attribute: &str) -> Self {
        Self {
            alias: alias.to_string(),
            attribute: attribute.to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Expressions and predicates
// ─────────────────────────────────────────────

///
/// SqmExpression
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqmExpression {
    Path(SqmPath),

    /// A root alias used as a value; stands for its identifier.
    Entity(String),
    Literal(Value),
    Parameter(SqmParameterId),
    Binary {
        op: BinaryOperator,
        lhs: Box<Self>,
        rhs: Box<Self>,
    },
    Negate(Box<Self>),
    Function {
        function: ScalarFunction,
        argument: Box<Self>,
    },
    Aggregate {
        function: AggregateFunction,
        argument: Option<Box<Self>>,
        distinct: bool,
    },
    CollectionProperty {
        collection: SqmPath,
        property: CollectionProperty,
    },
}

impl SqmExpression {
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate { .. } => true,
            Self::Binary { lhs, rhs, .. } => lhs.contains_aggregate() || rhs.contains_aggregate(),
            Self::Negate(inner) | Self::Function { argument: inner, .. } => {
                inner.contains_aggregate()
            }
            _ => false,
        }
    }
}

///
/// SqmPredicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqmPredicate {
    Comparison {
        lhs: SqmExpression,
        op: ComparisonOperator,
        rhs: SqmExpression,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Null {
        expression: SqmExpression,
        negated: bool,
    },
    Between {
        expression: SqmExpression,
        lower: SqmExpression,
        upper: SqmExpression,
        negated: bool,
    },
    Like {
        expression: SqmExpression,
        pattern: SqmExpression,
        negated: bool,
    },
    InList {
        expression: SqmExpression,
        list: Vec<SqmExpression>,
        negated: bool,
    },

    /// `x in elements(c)`, `x in indices(c)` and `x member of c`.
    InCollection {
        expression: SqmExpression,
        collection: SqmPath,
        property: CollectionProperty,
        negated: bool,
    },
    EmptyCollection {
        collection: SqmPath,
        negated: bool,
    },
}

// ─────────────────────────────────────────────
// Statements
// ─────────────────────────────────────────────

///
/// SqmInstantiation
/// `select new ...` target.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SqmInstantiation {
    Constructor(String),
    Map,
    List,
}

///
/// SqmSelection
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqmSelection {
    pub expression: SqmExpression,
    pub alias: Option<String>,
}

///
/// SqmSortSpecification
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqmSortSpecification {
    pub expression: SqmExpression,
    pub descending: bool,
}

///
/// SqmSelectStatement
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqmSelectStatement {
    pub distinct: bool,
    pub instantiation: Option<SqmInstantiation>,
    pub selections: Vec<SqmSelection>,
    pub roots: Vec<SqmRoot>,
    pub predicate: Option<SqmPredicate>,
    pub order_by: Vec<SqmSortSpecification>,
}

impl SqmSelectStatement {
    /// Result aliases: the written alias, else the selection position.
    #[must_use]
    pub fn result_aliases(&self) -> Vec<String> {
        self.selections
            .iter()
            .enumerate()
            .map(|(i, s)| s.alias.clone().unwrap_or_else(|| i.to_string()))
            .collect()
    }
}

///
/// SqmAssignment
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqmAssignment {
    pub attribute: String,
    pub value: SqmExpression,
}

///
/// SqmUpdateStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqmUpdateStatement {
    pub target: SqmRoot,

    /// `update versioned`: bump the version column.
    pub versioned: bool,
    pub assignments: Vec<SqmAssignment>,
    pub predicate: Option<SqmPredicate>,
}

///
/// SqmDeleteStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqmDeleteStatement {
    pub target: SqmRoot,
    pub predicate: Option<SqmPredicate>,
}

///
/// SqmInsertSource
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqmInsertSource {
    Values(Vec<Vec<SqmExpression>>),
    Select(Box<SqmSelectStatement>),
}

///
/// SqmInsertStatement
///

#[derive(Clone, Debug, PartialEq)]
pub struct SqmInsertStatement {
    pub target: SqmRoot,
    pub attributes: Vec<String>,
    pub source: SqmInsertSource,
}

///
/// SqmDeleteOrUpdateStatement
/// The statement kinds a multi-table mutation strategy handles.
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqmDeleteOrUpdateStatement {
    Update(SqmUpdateStatement),
    Delete(SqmDeleteStatement),
}

impl SqmDeleteOrUpdateStatement {
    #[must_use]
    pub const fn target(&self) -> &SqmRoot {
        match self {
            Self::Update(update) => &update.target,
            Self::Delete(delete) => &delete.target,
        }
    }

    #[must_use]
    pub const fn predicate(&self) -> Option<&SqmPredicate> {
        match self {
            Self::Update(update) => update.predicate.as_ref(),
            Self::Delete(delete) => delete.predicate.as_ref(),
        }
    }
}

///
/// SqmStatement
///

#[derive(Clone, Debug, PartialEq)]
pub enum SqmStatement {
    Select(SqmSelectStatement),
    Update(SqmUpdateStatement),
    Delete(SqmDeleteStatement),
    Insert(SqmInsertStatement),
}

impl SqmStatement {
    #[must_use]
    pub const fn is_select(&self) -> bool {
        matches!(self, Self::Select(_))
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Select(_) => "select",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::Insert(_) => "insert",
        }
    }

    /// Mutation target entity, `None` for queries.
    #[must_use]
    pub const fn target(&self) -> Option<&SqmRoot> {
        match self {
            Self::Select(_) => None,
            Self::Update(update) => Some(&update.target),
            Self::Delete(delete) => Some(&delete.target),
            Self::Insert(insert) => Some(&insert.target),
        }
    }
}
