use crate::{
    config::Settings,
    error::Error,
    id::IdentifierGenerators,
    jdbc::{JdbcConnectionAccess, JdbcCoordinator},
    model::Metamodel,
    mutation::MutationStrategies,
    obs::{MetricsEvent, MetricsSink, Statistics},
    query::{
        Instantiator, QueryPlan, QueryPlanCache, QueryTranslator, QueryTranslatorFactory,
        StrategyContext,
    },
    session::{Session, TransactionError},
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, info};
use ulid::Ulid;

///
/// SessionFactoryBuilder
///

pub struct SessionFactoryBuilder {
    metamodel: Metamodel,
    access: Arc<dyn JdbcConnectionAccess>,
    settings: Settings,
    translators: QueryTranslatorFactory,
    strategies: Option<MutationStrategies>,
    constructors: BTreeMap<String, Instantiator>,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl SessionFactoryBuilder {
    #[must_use]
    pub fn new(metamodel: Metamodel, access: Arc<dyn JdbcConnectionAccess>) -> Self {
        Self {
            metamodel,
            access,
            settings: Settings::default(),
            translators: QueryTranslatorFactory::new(),
            strategies: None,
            constructors: BTreeMap::new(),
            sink: None,
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Make a translator selectable through `Settings::query_translator`.
    #[must_use]
    pub fn query_translator(mut self, translator: Arc<dyn QueryTranslator>) -> Self {
        self.translators.register(translator);
        self
    }

    /// Use these strategies instead of the ones the settings name.
    #[must_use]
    pub fn mutation_strategies(mut self, strategies: MutationStrategies) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Register the class a `select new <name>(...)` instantiates.
    #[must_use]
    pub fn constructor(mut self, name: &str, instantiator: Instantiator) -> Self {
        self.constructors.insert(name.to_string(), instantiator);
        self
    }

    #[must_use]
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Resolve the translator and prepare the mutation strategies.
    pub fn build(self) -> Result<SessionFactory, Error> {
        let translator = self.translators.resolve(&self.settings.query_translator)?;
        let strategies = self
            .strategies
            .unwrap_or_else(|| MutationStrategies::from_settings(&self.settings));
        let statistics = Arc::new(Statistics::new(self.sink));

        strategies.prepare(
            &StrategyContext {
                metamodel: &self.metamodel,
                settings: &self.settings,
                statistics: &statistics,
            },
            self.access.as_ref(),
        )?;

        info!(
            translator = translator.name(),
            mutation = strategies.mutation_strategy().name(),
            insert = strategies.insert_strategy().name(),
            "session factory built"
        );

        Ok(SessionFactory {
            inner: Arc::new(FactoryInner {
                id_generators: IdentifierGenerators::from_metamodel(&self.metamodel),
                plan_cache: QueryPlanCache::new(self.settings.query_plan_cache_max_size),
                metamodel: self.metamodel,
                settings: self.settings,
                access: self.access,
                translator,
                strategies,
                constructors: self.constructors,
                statistics,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl fmt::Debug for SessionFactoryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactoryBuilder")
            .field("settings", &self.settings)
            .field("translators", &self.translators)
            .finish_non_exhaustive()
    }
}

///
/// SessionFactory
///
/// Immutable once built and shared by every session it opens. Cloning
/// shares the same factory.
///

#[derive(Clone)]
pub struct SessionFactory {
    inner: Arc<FactoryInner>,
}

struct FactoryInner {
    metamodel: Metamodel,
    settings: Settings,
    access: Arc<dyn JdbcConnectionAccess>,
    translator: Arc<dyn QueryTranslator>,
    strategies: MutationStrategies,
    id_generators: IdentifierGenerators,
    plan_cache: QueryPlanCache,
    constructors: BTreeMap<String, Instantiator>,
    statistics: Arc<Statistics>,
    closed: AtomicBool,
}

impl SessionFactory {
    #[must_use]
    pub fn builder(metamodel: Metamodel, access: Arc<dyn JdbcConnectionAccess>) -> SessionFactoryBuilder {
        SessionFactoryBuilder::new(metamodel, access)
    }

    pub fn open_session(&self) -> Result<Session, Error> {
        self.ensure_open()?;

        let connection = self
            .inner
            .access
            .obtain_connection()
            .map_err(|e| Error::from_jdbc(e, "obtain connection"))?;
        let coordinator = JdbcCoordinator::new(connection, Arc::clone(&self.inner.statistics));
        let uid = Ulid::new().to_string();

        self.inner.statistics.record(MetricsEvent::SessionOpened);
        debug!(session = %uid, "session opened");

        Ok(Session::new(self.clone(), uid, coordinator))
    }

    /// Release the mutation strategies. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        if self
            .inner
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        self.inner.plan_cache.clear();
        let inner = &self.inner;
        inner.strategies.release(
            &StrategyContext {
                metamodel: &inner.metamodel,
                settings: &inner.settings,
                statistics: &inner.statistics,
            },
            inner.access.as_ref(),
        )?;
        info!("session factory closed");

        Ok(())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn metamodel(&self) -> &Metamodel {
        &self.inner.metamodel
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    #[must_use]
    pub fn statistics(&self) -> &Statistics {
        &self.inner.statistics
    }

    #[must_use]
    pub fn query_translator(&self) -> &dyn QueryTranslator {
        self.inner.translator.as_ref()
    }

    #[must_use]
    pub fn plan_cache(&self) -> &QueryPlanCache {
        &self.inner.plan_cache
    }

    pub(crate) fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(TransactionError::FactoryClosed.into());
        }

        Ok(())
    }

    pub(crate) fn plan(&self, query: &str) -> Result<Arc<QueryPlan>, Error> {
        let inner = &self.inner;

        inner.plan_cache.plan(
            query,
            inner.translator.as_ref(),
            &inner.metamodel,
            &inner.statistics,
        )
    }

    pub(crate) fn strategies(&self) -> &MutationStrategies {
        &self.inner.strategies
    }

    pub(crate) fn id_generators(&self) -> &IdentifierGenerators {
        &self.inner.id_generators
    }

    pub(crate) fn constructors(&self) -> &BTreeMap<String, Instantiator> {
        &self.inner.constructors
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("translator", &self.inner.translator.name())
            .field("strategies", &self.inner.strategies)
            .field("plan_cache", &self.inner.plan_cache)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
