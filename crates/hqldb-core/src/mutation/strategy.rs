use crate::{
    error::Error,
    jdbc::{JdbcConnectionAccess, JdbcCoordinator},
    mutation::{MultiTableHandlerBuildResult, TemporaryTable},
    query::{ExecutionContext, StrategyContext},
    sqm::{
        DomainParameterXref, SqmDeleteOrUpdateStatement, SqmDeleteStatement, SqmInsertStatement,
        SqmUpdateStatement,
    },
};
use std::sync::Arc;
use tracing::debug;

///
/// SqmMultiTableMutationStrategy
///
/// Executes `update` and `delete` against entities spanning several tables.
/// `prepare` and `release` run once each, from the session factory;
/// `build_handler` may run concurrently and keeps no per-call state on the
/// strategy.
///

pub trait SqmMultiTableMutationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        let _ = (ctx, access);
        Ok(())
    }

    fn release(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        let _ = (ctx, access);
        Ok(())
    }

    fn build_handler(
        &self,
        statement: &SqmDeleteOrUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<MultiTableHandlerBuildResult, Error>;

    /// Build a handler and run it once.
    #[deprecated(note = "build a handler with `build_handler` and execute it; nothing is cached here")]
    fn execute_update(
        &self,
        statement: &SqmUpdateStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        let built = self.build_handler(
            &SqmDeleteOrUpdateStatement::Update(statement.clone()),
            xref,
            ctx,
        )?;

        built
            .handler
            .execute(&built.first_jdbc_parameter_bindings, ctx)
    }

    /// Build a handler and run it once.
    #[deprecated(note = "build a handler with `build_handler` and execute it; nothing is cached here")]
    fn execute_delete(
        &self,
        statement: &SqmDeleteStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        let built = self.build_handler(
            &SqmDeleteOrUpdateStatement::Delete(statement.clone()),
            xref,
            ctx,
        )?;

        built
            .handler
            .execute(&built.first_jdbc_parameter_bindings, ctx)
    }
}

///
/// SqmMultiTableInsertStrategy
/// Executes `insert` against entities spanning several tables or using
/// pooled identifiers. Same lifecycle as the mutation strategy.
///

pub trait SqmMultiTableInsertStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        let _ = (ctx, access);
        Ok(())
    }

    fn release(
        &self,
        ctx: &StrategyContext<'_>,
        access: &dyn JdbcConnectionAccess,
    ) -> Result<(), Error> {
        let _ = (ctx, access);
        Ok(())
    }

    fn build_handler(
        &self,
        statement: &SqmInsertStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<MultiTableHandlerBuildResult, Error>;

    /// Build a handler and run it once.
    #[deprecated(note = "build a handler with `build_handler` and execute it; nothing is cached here")]
    fn execute_insert(
        &self,
        statement: &SqmInsertStatement,
        xref: &Arc<DomainParameterXref>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<u64, Error> {
        let built = self.build_handler(statement, xref, ctx)?;

        built
            .handler
            .execute(&built.first_jdbc_parameter_bindings, ctx)
    }
}

// ─────────────────────────────────────────────
// Shared temporary-table lifecycle
// ─────────────────────────────────────────────

fn coordinator(
    ctx: &StrategyContext<'_>,
    access: &dyn JdbcConnectionAccess,
) -> Result<JdbcCoordinator, Error> {
    let connection = access
        .obtain_connection()
        .map_err(|e| Error::from_jdbc(e, "<obtain connection>"))?;

    Ok(JdbcCoordinator::new(connection, Arc::clone(ctx.statistics)))
}

/// Create factory-lifetime temporary tables.
pub(crate) fn create_temporary_tables(
    tables: &[TemporaryTable],
    ctx: &StrategyContext<'_>,
    access: &dyn JdbcConnectionAccess,
) -> Result<(), Error> {
    if tables.is_empty() || !ctx.settings.create_temporary_tables {
        return Ok(());
    }

    let coordinator = coordinator(ctx, access)?;
    for table in tables {
        debug!(table = table.name(), "creating temporary table");
        table.create(&coordinator)?;
    }

    Ok(())
}

/// Drop factory-lifetime temporary tables.
pub(crate) fn drop_temporary_tables(
    tables: &[TemporaryTable],
    ctx: &StrategyContext<'_>,
    access: &dyn JdbcConnectionAccess,
) -> Result<(), Error> {
    if tables.is_empty() || !ctx.settings.drop_temporary_tables {
        return Ok(());
    }

    let coordinator = coordinator(ctx, access)?;
    for table in tables {
        debug!(table = table.name(), "dropping temporary table");
        table.drop_table(&coordinator)?;
    }

    Ok(())
}
