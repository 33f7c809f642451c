use crate::{
    error::Error,
    jdbc::JdbcCoordinator,
    model::{EntityData, EntityMapping},
    mutation::missing_identifier,
    obs::{EntityOperation, MetricsEvent, MetricsSink, Statistics},
    query::{ExecutionContext, QueryOptions},
    session::{
        Query, SessionFactory, TransactionError, TransactionStatus,
        persister::{self, LoadPlan, PreparedStatement},
    },
    sqm::QueryParameterBindings,
    value::Value,
};
use std::{fmt, mem, sync::Arc};
use tracing::{debug, warn};

///
/// EntityAction
///

struct EntityAction {
    entity: Arc<EntityMapping>,
    id: Value,
    data: EntityData,
}

///
/// ActionQueue
///
/// Pending writes, executed on flush as inserts, then updates, then deletes.
///

#[derive(Default)]
struct ActionQueue {
    inserts: Vec<EntityAction>,
    updates: Vec<EntityAction>,
    deletes: Vec<EntityAction>,
}

impl ActionQueue {
    fn len(&self) -> usize {
        self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

///
/// Session
///
/// One connection, at most one transaction at a time, and the queue of
/// writes not yet flushed. Not shareable across threads.
///

pub struct Session {
    factory: SessionFactory,
    uid: String,
    coordinator: JdbcCoordinator,
    status: TransactionStatus,
    actions: ActionQueue,
}

impl Session {
    pub(crate) fn new(factory: SessionFactory, uid: String, coordinator: JdbcCoordinator) -> Self {
        Self {
            factory,
            uid,
            coordinator,
            status: TransactionStatus::NotActive,
            actions: ActionQueue::default(),
        }
    }

    #[must_use]
    pub const fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    #[must_use]
    pub const fn transaction_status(&self) -> TransactionStatus {
        self.status
    }

    /// Number of writes waiting for the next flush.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    // ─────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────

    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        self.factory.ensure_open()?;
        if self.status.is_active() {
            return Err(TransactionError::AlreadyActive.into());
        }

        self.coordinator.begin()?;
        self.status = TransactionStatus::Active;

        Ok(())
    }

    /// Flush, then commit. A rollback-only transaction, or one whose flush
    /// fails, is rolled back instead and the failure returned.
    pub fn commit(&mut self) -> Result<(), Error> {
        match self.status {
            TransactionStatus::Active => {}
            TransactionStatus::MarkedRollback => {
                self.finish_rollback()?;
                return Err(TransactionError::RollbackOnly.into());
            }
            _ => return Err(TransactionError::NotActive.into()),
        }

        if let Err(err) = self.flush() {
            if let Err(rollback) = self.finish_rollback() {
                warn!(error = %rollback, "rollback after failed flush also failed");
            }
            return Err(err);
        }

        self.coordinator.commit()?;
        self.status = TransactionStatus::Committed;
        self.statistics()
            .record(MetricsEvent::TransactionCompleted { committed: true });

        Ok(())
    }

    /// Discard pending writes and roll the transaction back.
    pub fn rollback(&mut self) -> Result<(), Error> {
        if !self.status.is_active() {
            return Err(TransactionError::NotActive.into());
        }

        self.finish_rollback()
    }

    fn finish_rollback(&mut self) -> Result<(), Error> {
        self.actions = ActionQueue::default();
        self.status = TransactionStatus::RolledBack;
        self.statistics()
            .record(MetricsEvent::TransactionCompleted { committed: false });

        self.coordinator.rollback()
    }

    /// Roll back whatever is still active; pending writes are discarded.
    pub fn close(mut self) -> Result<(), Error> {
        if self.status.is_active() {
            self.finish_rollback()?;
        }
        debug!(session = %self.uid, "session closed");

        Ok(())
    }

    // ─────────────────────────────────────────
    // Entities
    // ─────────────────────────────────────────

    /// Schedule an insert and return the identifier it will be stored under.
    /// Generated identifiers are drawn immediately; assigned ones must be set.
    pub fn persist(&mut self, entity: &str, mut data: EntityData) -> Result<Value, Error> {
        self.factory.ensure_open()?;
        let entity = self.entity(entity)?;

        let id = match self.factory.id_generators().get(&entity.name) {
            Some(generator) => generator.generate(&self.coordinator)?,
            None => data.value(&entity.identifier.attribute),
        };
        if id.is_null() {
            return Err(missing_identifier(&entity));
        }

        data.set(&entity.identifier.attribute, id.clone());
        if let Some(version) = &entity.version {
            data.set(&version.attribute, 0);
        }
        debug!(entity = %entity.name, %id, "insert scheduled");

        self.actions.inserts.push(EntityAction {
            entity,
            id: id.clone(),
            data,
        });

        Ok(id)
    }

    /// Load the state stored under `id`, flushing pending writes first.
    pub fn get(&mut self, entity: &str, id: impl Into<Value>) -> Result<Option<EntityData>, Error> {
        self.flush()?;
        let entity = self.entity(entity)?;
        let id = id.into();

        let plan = LoadPlan::new(self.factory.metamodel(), &entity, &id, None)?;
        let result = self
            .coordinator
            .execute_query(&plan.statement.operation, &plan.statement.bindings);
        let rows = self.guard(result)?;

        let loaded = plan.read(rows);
        if loaded.is_some() {
            self.record_entity(&entity.name, EntityOperation::Load);
        }

        Ok(loaded)
    }

    /// Schedule a full-state update. Versioned entities must carry the
    /// version they were loaded with.
    pub fn update(&mut self, entity: &str, data: EntityData) -> Result<(), Error> {
        self.factory.ensure_open()?;
        let entity = self.entity(entity)?;
        let id = data.value(&entity.identifier.attribute);
        if id.is_null() {
            return Err(missing_identifier(&entity));
        }

        self.actions.updates.push(EntityAction { entity, id, data });

        Ok(())
    }

    pub fn remove(&mut self, entity: &str, id: impl Into<Value>) -> Result<(), Error> {
        self.factory.ensure_open()?;
        let entity = self.entity(entity)?;

        self.actions.deletes.push(EntityAction {
            entity,
            id: id.into(),
            data: EntityData::new(),
        });

        Ok(())
    }

    /// Execute every pending write. On failure the remaining writes are
    /// dropped and an active transaction becomes rollback-only.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.factory.ensure_open()?;
        if self.actions.is_empty() {
            return Ok(());
        }

        let actions = mem::take(&mut self.actions);
        debug!(session = %self.uid, actions = actions.len(), "flushing");
        self.statistics().record(MetricsEvent::Flush);

        let result = self.execute_actions(actions);
        if result.is_err() && self.status == TransactionStatus::Active {
            self.status = TransactionStatus::MarkedRollback;
        }

        result
    }

    fn execute_actions(&self, actions: ActionQueue) -> Result<(), Error> {
        let metamodel = self.factory.metamodel();

        for action in actions.inserts {
            let comment = self.comment("insert", &action.entity);
            let statements =
                persister::insert(&action.entity, &action.id, &action.data, comment.as_deref());
            self.execute_statements(&action, &statements)?;
            self.record_entity(&action.entity.name, EntityOperation::Insert);
        }
        for action in actions.updates {
            let comment = self.comment("update", &action.entity);
            let statements =
                persister::update(&action.entity, &action.id, &action.data, comment.as_deref());
            self.execute_statements(&action, &statements)?;
            self.record_entity(&action.entity.name, EntityOperation::Update);
        }
        for action in actions.deletes {
            let comment = self.comment("delete", &action.entity);
            let statements =
                persister::delete(metamodel, &action.entity, &action.id, comment.as_deref());
            self.execute_statements(&action, &statements)?;
            self.record_entity(&action.entity.name, EntityOperation::Delete);
        }

        Ok(())
    }

    fn execute_statements(
        &self,
        action: &EntityAction,
        statements: &[PreparedStatement],
    ) -> Result<(), Error> {
        for statement in statements {
            let rows = self
                .coordinator
                .execute_update(&statement.operation, &statement.bindings)?;

            if statement.expect_rows && rows == 0 {
                self.statistics().record(MetricsEvent::OptimisticFailure {
                    entity: &action.entity.name,
                });
                return Err(Error::StaleState {
                    entity: action.entity.name.clone(),
                    id: action.id.to_string(),
                });
            }
        }

        Ok(())
    }

    // ─────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────

    #[must_use]
    pub fn create_query(&mut self, query: &str) -> Query<'_> {
        Query::new(self, query)
    }

    pub(crate) fn context<'a>(
        &'a self,
        query: &'a str,
        parameters: &'a QueryParameterBindings,
        options: &'a QueryOptions,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            query,
            metamodel: self.factory.metamodel(),
            settings: self.factory.settings(),
            coordinator: &self.coordinator,
            id_generators: self.factory.id_generators(),
            session_uid: &self.uid,
            parameters,
            options,
        }
    }

    /// Mark an active transaction rollback-only when `result` failed while
    /// talking to the database.
    pub(crate) fn guard<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(err) = &result
            && !err.is_query_error()
            && self.status == TransactionStatus::Active
        {
            debug!(session = %self.uid, error = %err, "transaction marked rollback-only");
            self.status = TransactionStatus::MarkedRollback;
        }

        result
    }

    // ─────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────

    fn entity(&self, name: &str) -> Result<Arc<EntityMapping>, Error> {
        Ok(Arc::clone(self.factory.metamodel().require_entity(name)?))
    }

    fn comment(&self, operation: &str, entity: &EntityMapping) -> Option<String> {
        self.factory
            .settings()
            .use_sql_comments
            .then(|| format!("{operation} {}", entity.name))
    }

    fn statistics(&self) -> &Statistics {
        self.coordinator.statistics()
    }

    fn record_entity(&self, entity: &str, operation: EntityOperation) {
        self.statistics()
            .record(MetricsEvent::Entity { entity, operation });
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("status", &self.status)
            .field("pending_actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}
