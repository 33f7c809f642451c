use crate::{
    error::Error,
    obs::{MetricsEvent, MetricsSink},
    query::{QueryOptions, QueryRow, ResultTransformer, list},
    session::Session,
    sqm::{QueryParameter, QueryParameterBindings},
    value::Value,
};
use std::{fmt, sync::Arc};
use tracing::debug;

///
/// Query
///
/// An HQL string bound to a session, with its parameter values and
/// execution options. Executing flushes the session's pending writes first.
///

pub struct Query<'s> {
    session: &'s mut Session,
    query: String,
    parameters: QueryParameterBindings,
    options: QueryOptions,
    transformer: Option<Arc<dyn ResultTransformer>>,
}

impl<'s> Query<'s> {
    pub(crate) fn new(session: &'s mut Session, query: &str) -> Self {
        Self {
            session,
            query: query.to_string(),
            parameters: QueryParameterBindings::new(),
            options: QueryOptions::default(),
            transformer: None,
        }
    }

    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// Bind `:name` (given as `"name"`) or `?N` (given as `N`).
    pub fn set_parameter(
        &mut self,
        parameter: impl Into<QueryParameter>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.parameters.bind(parameter.into(), value.into());
        self
    }

    /// Bind a list; the parameter must appear where a list may expand.
    pub fn set_parameter_list<V: Into<Value>>(
        &mut self,
        parameter: impl Into<QueryParameter>,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.parameters.bind_list(
            parameter.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn set_result_transformer(&mut self, transformer: Arc<dyn ResultTransformer>) -> &mut Self {
        self.transformer = Some(transformer);
        self
    }

    /// SQL comment, rendered when `use_sql_comments` is on.
    pub fn set_comment(&mut self, comment: &str) -> &mut Self {
        self.options.comment = Some(comment.to_string());
        self
    }

    /// Run a select and return its rows, concatenated over every concrete
    /// statement of a polymorphic query.
    pub fn list(&mut self) -> Result<Vec<QueryRow>, Error> {
        self.session.flush()?;
        let factory = self.session.factory().clone();
        let plan = factory.plan(&self.query)?;

        if !plan.is_select() {
            return Err(Error::query_execution_request(
                "Not supported for DML operations",
                &self.query,
            ));
        }

        let result = {
            let ctx = self
                .session
                .context(&self.query, &self.parameters, &self.options);
            list(&plan, &ctx, factory.constructors(), self.transformer.clone())
        };
        let rows = self.session.guard(result)?;

        factory.statistics().record(MetricsEvent::QueryExecuted {
            query: &self.query,
            rows: rows.len() as u64,
        });

        Ok(rows)
    }

    /// Run an `insert`, `update` or `delete` and return the number of
    /// entities affected, summed over every concrete statement.
    pub fn execute_update(&mut self) -> Result<u64, Error> {
        self.session.flush()?;
        let factory = self.session.factory().clone();
        let plan = factory.plan(&self.query)?;

        if plan.is_select() {
            return Err(Error::query_execution_request(
                "Not supported for select queries",
                &self.query,
            ));
        }

        let result = {
            let ctx = self
                .session
                .context(&self.query, &self.parameters, &self.options);

            plan.statements().iter().try_fold(0u64, |total, planned| {
                let (handler, bindings) = planned.handler(factory.strategies(), &ctx)?;
                let affected = handler.execute(&bindings, &ctx)?;
                debug!(entity = handler.entity_name(), affected, "mutation executed");

                Ok::<_, Error>(total + affected)
            })
        };
        let affected = self.session.guard(result)?;

        factory.statistics().record(MetricsEvent::QueryExecuted {
            query: &self.query,
            rows: affected,
        });

        Ok(affected)
    }
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("query", &self.query)
            .field("parameters", &self.parameters)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
