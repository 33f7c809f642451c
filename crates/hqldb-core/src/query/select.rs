use crate::{
    error::Error,
    query::{
        ExecutionContext, QueryPlan,
        holder::{
            ConstructorResultTransformer, HolderInstantiator, Instantiator, QueryRow,
            ResultTransformer, create_classic_holder_instantiator,
        },
    },
    sql::{SqmToSqlConverter, Statement, create_jdbc_parameter_bindings},
    sqm::{SqmInstantiation, SqmSelectStatement, SqmStatement},
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

/// Run every statement of a select plan and shape the concatenated rows.
/// Entity selections yield the entity id.
pub(crate) fn list(
    plan: &QueryPlan,
    ctx: &ExecutionContext<'_>,
    constructors: &BTreeMap<String, Instantiator>,
    custom: Option<Arc<dyn ResultTransformer>>,
) -> Result<Vec<QueryRow>, Error> {
    let mut selects = Vec::with_capacity(plan.statements().len());
    for planned in plan.statements() {
        let SqmStatement::Select(select) = planned.statement() else {
            return Err(Error::query_execution_request(
                "Not supported for DML operations",
                ctx.query,
            ));
        };
        selects.push((select, planned.parameters()));
    }

    let Some((first, _)) = selects.first() else {
        return Ok(Vec::new());
    };
    let holder = holder(first, ctx, constructors, custom)?;

    let mut rows = Vec::new();
    for (select, xref) in selects {
        let expansions = ctx.parameters.expansions(xref);
        let translation =
            SqmToSqlConverter::translate_select(ctx.metamodel, ctx.query, &expansions, select)?;
        let bindings =
            create_jdbc_parameter_bindings(xref, &translation.jdbc_xref, ctx.parameters)?;

        let operation = ctx.operation(Statement::Select(translation.statement));
        let raw = ctx.coordinator.execute_query(&operation, &bindings)?;
        debug!(sql = operation.sql(), rows = raw.len(), "select executed");

        for row in raw {
            rows.push(holder.instantiate(row)?);
        }
    }

    Ok(rows)
}

fn holder(
    select: &SqmSelectStatement,
    ctx: &ExecutionContext<'_>,
    constructors: &BTreeMap<String, Instantiator>,
    custom: Option<Arc<dyn ResultTransformer>>,
) -> Result<HolderInstantiator, Error> {
    let constructor: Option<Arc<dyn ResultTransformer>> = match &select.instantiation {
        Some(SqmInstantiation::Constructor(name)) => {
            let instantiator = constructors.get(name).ok_or_else(|| {
                Error::semantic(format!("unable to locate class [{name}]"), ctx.query)
            })?;
            Some(Arc::new(ConstructorResultTransformer::new(
                name,
                Arc::clone(instantiator),
            )))
        }
        _ => None,
    };
    let return_maps = select.instantiation == Some(SqmInstantiation::Map);
    let return_lists = select.instantiation == Some(SqmInstantiation::List);

    let select = select.clone();
    Ok(create_classic_holder_instantiator(
        constructor,
        return_maps,
        return_lists,
        custom,
        move || select.result_aliases(),
    ))
}
