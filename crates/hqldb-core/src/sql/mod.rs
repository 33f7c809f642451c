//! SQL AST, its renderer, and the SQM-to-SQL converter.

mod ast;
mod convert;
mod render;

#[cfg(test)]
mod tests;

pub use ast::*;
pub use convert::{
    JdbcParameterXref, SqlTranslation, SqmToSqlConverter, TableGroup, create_jdbc_parameter_bindings,
};
pub use render::{RenderedSql, render};
