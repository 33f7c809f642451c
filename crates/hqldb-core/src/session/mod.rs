//! Session facade: the factory that owns the model and strategies, the
//! session that owns a connection and a transaction, and the query handle.

mod factory;
mod handle;
mod persister;
mod query;

#[cfg(test)]
mod tests;

pub use factory::{SessionFactory, SessionFactoryBuilder};
pub use handle::Session;
pub use query::Query;

use thiserror::Error as ThisError;

///
/// TransactionError
///

#[remain::sorted]
#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum TransactionError {
    #[error("transaction already active")]
    AlreadyActive,

    #[error("session factory is closed")]
    FactoryClosed,

    #[error("no active transaction")]
    NotActive,

    #[error("transaction was marked for rollback only")]
    RollbackOnly,
}

///
/// TransactionStatus
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TransactionStatus {
    #[default]
    NotActive,
    Active,

    /// A statement failed inside the transaction; only rollback remains.
    MarkedRollback,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::MarkedRollback)
    }
}
