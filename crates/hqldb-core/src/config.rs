use serde::{Deserialize, Serialize};

///
/// Settings
///
/// Factory-wide knobs read once when the session factory is built.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Registered name of the query translator ("ast" or "classic" built in).
    pub query_translator: String,
    pub mutation_strategy: MutationStrategyKind,
    pub insert_strategy: InsertStrategyKind,

    /// Create global/persistent temporary tables when strategies are prepared.
    pub create_temporary_tables: bool,

    /// Drop local temporary tables after each use, and global/persistent
    /// ones when the factory is closed.
    pub drop_temporary_tables: bool,

    /// Prefix generated SQL with a `/* comment */` when a query sets one.
    pub use_sql_comments: bool,
    pub query_plan_cache_max_size: usize,
}

impl Settings {
    pub const DEFAULT_QUERY_TRANSLATOR: &str = "ast";
    pub const DEFAULT_QUERY_PLAN_CACHE_MAX_SIZE: usize = 2048;
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            query_translator: Self::DEFAULT_QUERY_TRANSLATOR.to_string(),
            mutation_strategy: MutationStrategyKind::default(),
            insert_strategy: InsertStrategyKind::default(),
            create_temporary_tables: true,
            drop_temporary_tables: true,
            use_sql_comments: false,
            query_plan_cache_max_size: Self::DEFAULT_QUERY_PLAN_CACHE_MAX_SIZE,
        }
    }
}

///
/// MutationStrategyKind
///
/// Default strategy for multi-table `update`/`delete`.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStrategyKind {
    #[default]
    LocalTemporary,
    GlobalTemporary,
    Persistent,
    Inline,
}

///
/// InsertStrategyKind
///
/// Default strategy for multi-table `insert`.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertStrategyKind {
    #[default]
    LocalTemporary,
    GlobalTemporary,
    Persistent,
}
