//! Semantic query model: the resolved tree HQL parses into, its parameter
//! cross-reference, and the tree-level polymorphic split.

mod param;
mod split;
mod tree;

pub use param::{
    BoundValue, DomainParameterXref, ParameterError, QueryParameter, QueryParameterBindings,
    SqmParameterId, SqmParameterOccurrence,
};
pub use split::split_polymorphic;
pub use tree::{
    SqmAssignment, SqmDeleteOrUpdateStatement, SqmDeleteStatement, SqmExpression,
    SqmInsertSource, SqmInsertStatement, SqmInstantiation, SqmPath, SqmPredicate, SqmRoot,
    SqmSelectStatement, SqmSelection, SqmSortSpecification, SqmStatement, SqmUpdateStatement,
};
