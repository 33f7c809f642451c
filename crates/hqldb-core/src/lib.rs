//! Core runtime for hqldb: the mapping metamodel, HQL parsing and splitting,
//! SQM trees, SQL AST conversion, JDBC binding, multi-table mutation
//! strategies and the session facade that drives them.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod error;
pub mod hql;
pub mod id;
pub mod jdbc;
pub mod model;
pub mod mutation;
pub mod naming;
pub mod obs;
pub mod query;
pub mod session;
pub mod sql;
pub mod sqm;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

pub use error::Error;

///
/// Prelude
///
/// Prelude contains only domain vocabulary used at call sites.
/// No strategies, handlers, converters or JDBC plumbing are re-exported here.
///

pub mod prelude {
    pub use crate::{
        config::Settings,
        error::Error,
        model::{EntityData, EntityMapping, Metamodel},
        query::{QueryRow, ResultTransformer},
        session::{Session, SessionFactory, TransactionStatus},
        value::Value,
    };
}
