//! Per-factory cache of translated query plans, keyed by a fingerprint of
//! the translator and query text. Mutation handlers live on the plan and
//! are replayed while they stay compatible with the execution.

use crate::{
    error::Error,
    jdbc::JdbcParameterBindings,
    model::Metamodel,
    mutation::{Handler, MutationStrategies},
    obs::{MetricsEvent, MetricsSink, Statistics},
    query::{
        ExecutionContext,
        translator::{QueryTranslator, TranslatedStatement},
    },
    sqm::{DomainParameterXref, SqmStatement},
};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::debug;

///
/// PlanFingerprint
///
/// SHA-256 over the translator name and the query text.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    #[must_use]
    pub fn of(translator: &str, query: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"hqlplan:v1");
        write_str(&mut hasher, translator);
        write_str(&mut hasher, query);

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);

        Self(out)
    }

    #[must_use]
    pub fn as_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u32).to_be_bytes());
    hasher.update(value.as_bytes());
}

///
/// PlannedStatement
///
/// One concrete statement of a plan. For mutations, the handler built on
/// first execution is kept here.
///

pub struct PlannedStatement {
    statement: SqmStatement,
    parameters: Arc<DomainParameterXref>,
    handler: Mutex<Option<Arc<dyn Handler>>>,
}

impl PlannedStatement {
    fn new(translated: TranslatedStatement) -> Self {
        Self {
            statement: translated.statement,
            parameters: translated.parameters,
            handler: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn statement(&self) -> &SqmStatement {
        &self.statement
    }

    #[must_use]
    pub const fn parameters(&self) -> &Arc<DomainParameterXref> {
        &self.parameters
    }

    /// The cached handler when it accepts this execution's bindings,
    /// otherwise a freshly built one that replaces it.
    pub fn handler(
        &self,
        strategies: &MutationStrategies,
        ctx: &ExecutionContext<'_>,
    ) -> Result<(Arc<dyn Handler>, JdbcParameterBindings), Error> {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handler) = slot.as_ref() {
            let bindings = handler.create_jdbc_parameter_bindings(ctx)?;
            if handler.is_compatible_with(&bindings, ctx.options) {
                ctx.statistics().record(MetricsEvent::HandlerReused {
                    entity: handler.entity_name(),
                });
                return Ok((Arc::clone(handler), bindings));
            }
            debug!(
                entity = handler.entity_name(),
                "cached handler incompatible with execution, rebuilding"
            );
        }

        let built = strategies.build_handler(&self.statement, &self.parameters, ctx)?;
        *slot = Some(Arc::clone(&built.handler));

        Ok((built.handler, built.first_jdbc_parameter_bindings))
    }
}

impl fmt::Debug for PlannedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannedStatement")
            .field("kind", &self.statement.kind())
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

///
/// QueryPlan
///

#[derive(Debug)]
pub struct QueryPlan {
    fingerprint: PlanFingerprint,
    select: bool,
    statements: Vec<PlannedStatement>,
}

impl QueryPlan {
    #[must_use]
    pub const fn fingerprint(&self) -> PlanFingerprint {
        self.fingerprint
    }

    #[must_use]
    pub fn statements(&self) -> &[PlannedStatement] {
        &self.statements
    }

    #[must_use]
    pub const fn is_select(&self) -> bool {
        self.select
    }
}

///
/// QueryPlanCache
///
/// Bounded by `max_size`; the oldest plan is evicted first.
///

pub struct QueryPlanCache {
    max_size: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    plans: BTreeMap<PlanFingerprint, Arc<QueryPlan>>,
    order: VecDeque<PlanFingerprint>,
}

impl QueryPlanCache {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            state: Mutex::default(),
        }
    }

    /// The cached plan for `query`, translating it on a miss.
    pub fn plan(
        &self,
        query: &str,
        translator: &dyn QueryTranslator,
        metamodel: &Metamodel,
        statistics: &Statistics,
    ) -> Result<Arc<QueryPlan>, Error> {
        let fingerprint = PlanFingerprint::of(translator.name(), query);

        if let Some(plan) = self.get(&fingerprint) {
            statistics.record(MetricsEvent::PlanCache { hit: true });
            return Ok(plan);
        }
        statistics.record(MetricsEvent::PlanCache { hit: false });

        let translation = translator.translate(query, metamodel)?;
        let plan = Arc::new(QueryPlan {
            fingerprint,
            select: translation.select,
            statements: translation
                .statements
                .into_iter()
                .map(PlannedStatement::new)
                .collect(),
        });
        debug!(%fingerprint, statements = plan.statements.len(), "cached query plan");
        self.insert(fingerprint, Arc::clone(&plan));

        Ok(plan)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().plans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.plans.clear();
        state.order.clear();
    }

    fn get(&self, fingerprint: &PlanFingerprint) -> Option<Arc<QueryPlan>> {
        self.lock().plans.get(fingerprint).cloned()
    }

    fn insert(&self, fingerprint: PlanFingerprint, plan: Arc<QueryPlan>) {
        if self.max_size == 0 {
            return;
        }

        let mut state = self.lock();
        if state.plans.insert(fingerprint, plan).is_none() {
            state.order.push_back(fingerprint);
        }
        while state.plans.len() > self.max_size {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.plans.remove(&oldest);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for QueryPlanCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlanCache")
            .field("max_size", &self.max_size)
            .field("len", &self.len())
            .finish()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{query::translator::AstQueryTranslator, test_support};

    fn plan(cache: &QueryPlanCache, query: &str, statistics: &Statistics) -> Arc<QueryPlan> {
        cache
            .plan(
                query,
                &AstQueryTranslator,
                &test_support::metamodel(),
                statistics,
            )
            .expect("plan should succeed")
    }

    #[test]
    fn fingerprint_depends_on_translator_and_text() {
        let a = PlanFingerprint::of("ast", "from Flight");

        assert_eq!(a, PlanFingerprint::of("ast", "from Flight"));
        assert_ne!(a, PlanFingerprint::of("classic", "from Flight"));
        assert_ne!(a, PlanFingerprint::of("ast", "from Flight "));
        assert_eq!(a.as_hex().len(), 64);
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let cache = QueryPlanCache::new(8);
        let statistics = Statistics::default();

        let first = plan(&cache, "from Flight", &statistics);
        let second = plan(&cache, "from Flight", &statistics);

        assert!(Arc::ptr_eq(&first, &second));
        let snapshot = statistics.snapshot();
        assert_eq!(snapshot.plan_cache_misses, 1);
        assert_eq!(snapshot.plan_cache_hits, 1);
    }

    #[test]
    fn oldest_plan_is_evicted_past_max_size() {
        let cache = QueryPlanCache::new(2);
        let statistics = Statistics::default();

        plan(&cache, "from Flight", &statistics);
        plan(&cache, "from Sky", &statistics);
        plan(&cache, "from Dog", &statistics);
        assert_eq!(cache.len(), 2);

        plan(&cache, "from Flight", &statistics);
        assert_eq!(statistics.snapshot().plan_cache_misses, 4);
    }

    #[test]
    fn zero_max_size_disables_caching() {
        let cache = QueryPlanCache::new(0);
        let statistics = Statistics::default();

        plan(&cache, "from Flight", &statistics);
        plan(&cache, "from Flight", &statistics);

        assert!(cache.is_empty());
        assert_eq!(statistics.snapshot().plan_cache_hits, 0);
    }

    #[test]
    fn failed_translations_are_not_cached() {
        let cache = QueryPlanCache::new(8);
        let statistics = Statistics::default();

        let result = cache.plan(
            "from Nowhere",
            &AstQueryTranslator,
            &test_support::metamodel(),
            &statistics,
        );

        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn mutation_plans_are_not_selects() {
        let cache = QueryPlanCache::new(8);
        let statistics = Statistics::default();

        assert!(plan(&cache, "from Flight", &statistics).is_select());
        assert!(!plan(&cache, "delete from Flight", &statistics).is_select());
    }
}
