//! HQL front end: lexer, parser into SQM, the string-level query splitter
//! and collection pseudo-properties.

mod collection;
mod lexer;
mod parser;
mod splitter;

pub use collection::{
    CollectionProperty, LoweredCollectionProperty, is_any_collection_property,
    is_collection_property, lower as lower_collection_property, normalized_property_name,
};
pub use parser::{ParsedQuery, parse};
pub use splitter::concrete_queries;

use thiserror::Error as ThisError;

///
/// SyntaxError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message} near column {column} [{query}]")]
pub struct SyntaxError {
    pub message: String,

    /// 1-based character column.
    pub column: usize,
    pub query: String,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, column: usize, query: &str) -> Self {
        Self {
            message: message.into(),
            column,
            query: query.to_string(),
        }
    }
}
