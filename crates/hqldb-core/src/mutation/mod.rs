//! Mutation execution: the multi-table strategy traits and their default
//! temporary-table and inline implementations, the handlers they build,
//! and single-table handlers for everything else.

mod action;
mod handler;
mod inline;
mod insert;
mod simple;
mod strategy;
mod table_based;
mod tables;
mod temptable;


pub use action::{AfterUseAction, BeforeUseAction};
pub use handler::{Handler, MultiTableHandler, MultiTableHandlerBuildResult};
pub use inline::{InlineHandler, InlineMutationStrategy};
pub use insert::{TableBasedInsertHandler, TemporaryTableInsertStrategy};
pub use simple::{SimpleDeleteHandler, SimpleInsertHandler, SimpleUpdateHandler};
pub use strategy::{SqmMultiTableInsertStrategy, SqmMultiTableMutationStrategy};
pub use table_based::{TableBasedHandler, TemporaryTableMutationStrategy};
pub use temptable::{ROW_NUMBER_COLUMN, SESSION_UID_COLUMN, TemporaryTable, TemporaryTableKind};

pub(crate) use insert::{missing_identifier, root_seed};
pub(crate) use tables::{delete_mutations, version_increment};

use crate::{
    config::{InsertStrategyKind, MutationStrategyKind, Settings},
    error::{Error, InternalError},
    jdbc::{JdbcConnectionAccess, JdbcParameterBindings},
    model::{EntityMapping, IdGeneration, Metamodel},
    obs::{MetricsEvent, MetricsSink},
    query::{ExecutionContext, StrategyContext},
    sqm::{DomainParameterXref, SqmDeleteOrUpdateStatement, SqmStatement},
};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// Whether an update or delete of `entity` touches more than one table,
/// counting the tables of every subclass it may match.
#[must_use]
pub fn requires_multi_table(metamodel: &Metamodel, entity: &EntityMapping) -> bool {
    metamodel
        .hierarchy_of(entity)
        .iter()
        .any(|e| e.is_multi_table())
}

/// Whether an insert into `entity` goes through the insert strategy: it
/// spans several tables or draws pooled ids.
#[must_use]
pub fn uses_insert_strategy(entity: &EntityMapping) -> bool {
    let pooled = matches!(
        entity.identifier.generation,
        IdGeneration::Sequence { increment_size, .. } if increment_size > 1
    );

    entity.is_multi_table() || pooled
}

///
/// HandlerBuildResult
///
/// Any handler plus the bindings its build produced. `multi_table` tells
/// whether a strategy built it.
///

pub struct HandlerBuildResult {
    pub handler: Arc<dyn Handler>,
    pub first_jdbc_parameter_bindings: JdbcParameterBindings,
    pub multi_table: bool,
}

///
/// MutationStrategies
///
/// The factory's configured strategy pair and the dispatch between them and
/// the single-table handlers.
///

#[derive(Clone)]
pub struct MutationStrategies {
    mutation: Arc<dyn SqmMultiTableMutationStrategy>,
    insert: Arc<dyn SqmMultiTableInsertStrategy>,
}

impl MutationStrategies {
    #[must_use]
    pub fn new(
        mutation: Arc<dyn SqmMultiTableMutationStrategy>,
        insert: Arc<dyn SqmMultiTableInsertStrategy>,
    ) -> Self {
        Self { mutation, insert }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let mutation: Arc<dyn SqmMultiTableMutationStrategy> = match settings.mutation_strategy {
            MutationStrategyKind::LocalTemporary => Arc::new(TemporaryTableMutationStrategy::new(
                TemporaryTableKind::Local,
            )),
            MutationStrategyKind::GlobalTemporary => Arc::new(
                TemporaryTableMutationStrategy::new(TemporaryTableKind::Global),
            ),
            MutationStrategyKind::Persistent => Arc::new(TemporaryTableMutationStrategy::new(
                TemporaryTableKind::Persistent,
            )),
            MutationStrategyKind::Inline => Arc::new(InlineMutationStrategy),
        };
        let insert_kind = match settings.insert_strategy {
            InsertStrategyKind::LocalTemporary => TemporaryTableKind::Local,
            InsertStrategyKind::GlobalTemporary => TemporaryTableKind::Global,
            InsertStrategyKind::Persistent => TemporaryTableKind::Persistent,
        };

        Self::new(
            mutation,
            Arc::new(TemporaryTableInsertStrategy::new(insert_kind)),
        )
    }

    #[must_use]
    pub fn mutation_strategy(&self) -> &Arc<dyn SqmMultiTableMutationStrategy> {
        &self.mutation
    }

    #[must_use]
    pub fn insert_strategy(&self) -> &Arc<dyn SqmMultiTableInsertStrategy> {
        &self.insert
    }

    pub fn prepare(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        debug!(
            mutation = self.mutation.name(),
            insert = self.insert.name(),
            "preparing mutation strategies"
        );
        self.mutation.prepare(ctx, access)?;
        self.insert.prepare(ctx, access)
    }

    /// Release both strategies; the first failure is returned after both ran.
    pub fn release(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        let mutation = self.mutation.release(ctx, access);
        let insert = self.insert.release(ctx, access);

        match (mutation, insert) {
            (Err(e), Err(other)) => {
                warn!(error = %other, "insert strategy release failed");
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Build the handler for one concrete mutation statement.
    pub fn build_handler(
        &self,
        statement: &SqmStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<HandlerBuildResult, Error> {
        let target = statement.target().ok_or_else(|| {
            InternalError::mutation_invariant("select statement passed to mutation dispatch")
        })?;
        let entity = ctx.metamodel.entity(&target.entity).ok_or_else(|| {
            InternalError::mutation_invariant(format!(
                "type '{}' reached mutation dispatch without a polymorphic split",
                target.entity
            ))
        })?;

        let result = match statement {
            SqmStatement::Select(_) => {
                return Err(InternalError::mutation_invariant(
                    "select statement passed to mutation dispatch",
                )
                .into());
            }
            SqmStatement::Update(update) if requires_multi_table(ctx.metamodel, entity) => {
                let statement = SqmDeleteOrUpdateStatement::Update(update.clone());
                multi_table(self.mutation.build_handler(&statement, xref, ctx)?)
            }
            SqmStatement::Delete(delete) if requires_multi_table(ctx.metamodel, entity) => {
                let statement = SqmDeleteOrUpdateStatement::Delete(delete.clone());
                multi_table(self.mutation.build_handler(&statement, xref, ctx)?)
            }
            SqmStatement::Insert(insert) if uses_insert_strategy(entity) => {
                multi_table(self.insert.build_handler(insert, xref, ctx)?)
            }
            SqmStatement::Update(update) => {
                single_table(SimpleUpdateHandler::build(update, xref, ctx)?, ctx)?
            }
            SqmStatement::Delete(delete) => {
                single_table(SimpleDeleteHandler::build(delete, xref, ctx)?, ctx)?
            }
            SqmStatement::Insert(insert) => {
                single_table(SimpleInsertHandler::build(insert, xref, ctx)?, ctx)?
            }
        };

        ctx.statistics().record(MetricsEvent::HandlerBuilt {
            entity: &entity.name,
            multi_table: result.multi_table,
        });
        debug!(
            entity = %entity.name,
            kind = statement.kind(),
            multi_table = result.multi_table,
            "built mutation handler"
        );

        Ok(result)
    }
}

impl fmt::Debug for MutationStrategies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationStrategies")
            .field("mutation", &self.mutation.name())
            .field("insert", &self.insert.name())
            .finish()
    }
}

fn multi_table(built: MultiTableHandlerBuildResult) -> HandlerBuildResult {
    let handler: Arc<dyn Handler> = built.handler;

    HandlerBuildResult {
        handler,
        first_jdbc_parameter_bindings: built.first_jdbc_parameter_bindings,
        multi_table: true,
    }
}

fn single_table(
    handler: impl Handler + 'static,
    ctx: &ExecutionContext<'_>,
) -> Result<HandlerBuildResult, Error> {
    let first_jdbc_parameter_bindings = handler.create_jdbc_parameter_bindings(ctx)?;

    Ok(HandlerBuildResult {
        handler: Arc::new(handler),
        first_jdbc_parameter_bindings,
        multi_table: false,
    })
}
