//! Query-side plumbing: execution context, translators, the plan cache and
//! result shaping.

mod context;
mod holder;
mod plan;
mod select;
mod translator;

pub use context::{ExecutionContext, QueryOptions, StrategyContext};
pub use holder::{
    AliasToEntityMapResultTransformer, ConstructorResultTransformer, HolderInstantiator,
    Instantiator, QueryRow, ResultTransformer, ToListResultTransformer,
    create_classic_holder_instantiator, create_select_new_transformer, holder_instantiator,
};
pub use plan::{PlanFingerprint, PlannedStatement, QueryPlan, QueryPlanCache};
pub use translator::{
    AstQueryTranslator, ClassicQueryTranslator, QueryTranslator, QueryTranslatorFactory,
    TranslatedStatement, Translation,
};

pub(crate) use select::list;
