use crate::{
    config::Settings,
    error::Error,
    jdbc::{JdbcCoordinator, JdbcError, JdbcOperation, JdbcParameter, JdbcParameterBindings},
    model::EntityMapping,
    mutation::{AfterUseAction, BeforeUseAction},
    obs::{MetricsEvent, MetricsSink, TemporaryTableEvent},
    query::ExecutionContext,
    sql::{
        ColumnDefinition, DeleteStatement, Expression, Predicate, Statement, TableDefinition,
        TableKind,
    },
    value::Value,
};
use tracing::{debug, warn};

/// Column tagging persistent temporary rows with the owning session.
pub const SESSION_UID_COLUMN: &str = "hib_sess_id";

/// Column numbering the rows of an insert's entity table.
pub const ROW_NUMBER_COLUMN: &str = "rn_";

///
/// TemporaryTableKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TemporaryTableKind {
    /// Created and dropped around each use; private to the connection.
    Local,

    /// Created once by the factory; rows are private to the connection.
    Global,

    /// A regular table created once; rows are tagged with the session uid.
    Persistent,
}

impl TemporaryTableKind {
    const fn table_kind(self) -> TableKind {
        match self {
            Self::Local => TableKind::LocalTemporary,
            Self::Global => TableKind::GlobalTemporary,
            Self::Persistent => TableKind::Permanent,
        }
    }
}

///
/// TemporaryTable
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemporaryTable {
    name: String,
    kind: TemporaryTableKind,
    columns: Vec<ColumnDefinition>,
}

impl TemporaryTable {
    /// `HT_<root table>`: identifiers matched by an update or delete.
    #[must_use]
    pub fn id_table(entity: &EntityMapping, kind: TemporaryTableKind) -> Self {
        let mut columns = vec![ColumnDefinition::new(entity.id_column(), false)];
        if kind == TemporaryTableKind::Persistent {
            columns.push(ColumnDefinition::new(SESSION_UID_COLUMN, false));
        }

        Self {
            name: format!("HT_{}", entity.root_table().name),
            kind,
            columns,
        }
    }

    /// `HTE_<entity>`: rows of an insert, numbered, one column per basic
    /// attribute plus the identifier.
    #[must_use]
    pub fn entity_table(entity: &EntityMapping, kind: TemporaryTableKind) -> Self {
        let mut columns = vec![
            ColumnDefinition::new(ROW_NUMBER_COLUMN, false),
            ColumnDefinition::new(entity.id_column(), true),
        ];
        columns.extend(
            entity
                .basic_attributes()
                .map(|(name, _)| ColumnDefinition::new(name, true)),
        );
        if kind == TemporaryTableKind::Persistent {
            columns.push(ColumnDefinition::new(SESSION_UID_COLUMN, false));
        }

        Self {
            name: format!("HTE_{}", entity.unqualified_name().to_ascii_lowercase()),
            kind,
            columns,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> TemporaryTableKind {
        self.kind
    }

    #[must_use]
    pub fn has_session_column(&self) -> bool {
        self.kind == TemporaryTableKind::Persistent
    }

    #[must_use]
    pub fn definition(&self) -> TableDefinition {
        TableDefinition {
            name: self.name.clone(),
            kind: self.kind.table_kind(),
            columns: self.columns.clone(),
            ..TableDefinition::default()
        }
    }

    #[must_use]
    pub const fn before_use_action(&self) -> BeforeUseAction {
        match self.kind {
            TemporaryTableKind::Local => BeforeUseAction::Create,
            TemporaryTableKind::Global | TemporaryTableKind::Persistent => BeforeUseAction::None,
        }
    }

    /// Never `None`: a table always needs its rows or itself removed. The
    /// `None`/`None` policy belongs to [`InlineMutationStrategy`], which
    /// uses no table.
    ///
    /// [`InlineMutationStrategy`]: crate::mutation::InlineMutationStrategy
    #[must_use]
    pub const fn after_use_action(&self, settings: &Settings) -> AfterUseAction {
        match self.kind {
            TemporaryTableKind::Local if settings.drop_temporary_tables => AfterUseAction::Drop,
            _ => AfterUseAction::Clean,
        }
    }

    /// `hib_sess_id = ?` for persistent tables.
    #[must_use]
    pub fn session_restriction(&self, parameter: JdbcParameter) -> Option<Predicate> {
        self.has_session_column().then(|| {
            Predicate::eq(
                Expression::column(None, SESSION_UID_COLUMN),
                Expression::Parameter(parameter),
            )
        })
    }

    /// Create the table; an existing table is left as it is.
    pub(crate) fn create(&self, coordinator: &JdbcCoordinator) -> Result<(), Error> {
        let operation = JdbcOperation::new(Statement::CreateTable(self.definition()), None);

        match coordinator.execute_update(&operation, &JdbcParameterBindings::new()) {
            Ok(_) => {
                coordinator.statistics().record(MetricsEvent::TemporaryTable {
                    table: &self.name,
                    event: TemporaryTableEvent::Created,
                });
                Ok(())
            }
            Err(Error::Jdbc {
                source: JdbcError::TableExists { .. },
                ..
            }) => {
                debug!(table = %self.name, "temporary table already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn drop_table(&self, coordinator: &JdbcCoordinator) -> Result<(), Error> {
        let operation = JdbcOperation::new(
            Statement::DropTable {
                name: self.name.clone(),
                if_exists: true,
            },
            None,
        );
        coordinator.execute_update(&operation, &JdbcParameterBindings::new())?;
        coordinator.statistics().record(MetricsEvent::TemporaryTable {
            table: &self.name,
            event: TemporaryTableEvent::Dropped,
        });

        Ok(())
    }

    /// Delete this connection's rows, or this session's for persistent tables.
    pub(crate) fn clean(&self, coordinator: &JdbcCoordinator, session_uid: &str) -> Result<(), Error> {
        let parameter = JdbcParameter(0);
        let operation = JdbcOperation::new(
            Statement::Delete(DeleteStatement {
                table: self.name.clone(),
                predicate: self.session_restriction(parameter),
            }),
            None,
        );
        let bindings = JdbcParameterBindings::new().with_binding(parameter, Value::from(session_uid));
        coordinator.execute_update(&operation, &bindings)?;
        coordinator.statistics().record(MetricsEvent::TemporaryTable {
            table: &self.name,
            event: TemporaryTableEvent::Cleaned,
        });

        Ok(())
    }

    fn after_use(&self, ctx: &ExecutionContext<'_>) -> Result<(), Error> {
        match self.after_use_action(ctx.settings) {
            AfterUseAction::Drop => self.drop_table(ctx.coordinator),
            AfterUseAction::Clean => self.clean(ctx.coordinator, ctx.session_uid),
            AfterUseAction::None => Ok(()),
        }
    }
}

/// Run `work` against `table`, applying the before-use action first and the
/// after-use action on every exit path. A cleanup failure after a failed
/// `work` is logged; the original error wins.
pub(crate) fn execute_with_temporary_table<T>(
    table: &TemporaryTable,
    ctx: &ExecutionContext<'_>,
    work: impl FnOnce() -> Result<T, Error>,
) -> Result<T, Error> {
    if table.before_use_action() == BeforeUseAction::Create {
        table.create(ctx.coordinator)?;
    }

    let result = work();
    let cleanup = table.after_use(ctx);

    match (result, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            warn!(table = %table.name, error = %cleanup, "temporary table cleanup failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn id_tables_are_named_after_the_root_table() {
        let metamodel = test_support::metamodel();
        let dog = metamodel.entity("Dog").expect("Dog should be mapped");

        let table = TemporaryTable::id_table(dog, TemporaryTableKind::Persistent);

        assert_eq!(table.name(), "HT_animal");
        assert_eq!(
            table.definition().columns,
            vec![
                ColumnDefinition::new("id", false),
                ColumnDefinition::new(SESSION_UID_COLUMN, false),
            ]
        );
        assert_eq!(table.definition().kind, TableKind::Permanent);
    }

    #[test]
    fn actions_follow_the_table_kind() {
        let metamodel = test_support::metamodel();
        let animal = metamodel.entity("Animal").expect("Animal should be mapped");
        let mut settings = Settings::default();

        let local = TemporaryTable::id_table(animal, TemporaryTableKind::Local);
        let global = TemporaryTable::id_table(animal, TemporaryTableKind::Global);

        assert_eq!(local.before_use_action(), BeforeUseAction::Create);
        assert_eq!(local.after_use_action(&settings), AfterUseAction::Drop);
        assert_eq!(global.before_use_action(), BeforeUseAction::None);
        assert_eq!(global.after_use_action(&settings), AfterUseAction::Clean);

        settings.drop_temporary_tables = false;
        assert_eq!(local.after_use_action(&settings), AfterUseAction::Clean);
    }

    #[test]
    fn entity_tables_carry_row_numbers_and_every_attribute() {
        let metamodel = test_support::metamodel();
        let dog = metamodel.entity("Dog").expect("Dog should be mapped");

        let table = TemporaryTable::entity_table(dog, TemporaryTableKind::Local);
        let names: Vec<String> = table.definition().columns.into_iter().map(|c| c.name).collect();

        assert_eq!(table.name(), "HTE_dog");
        assert_eq!(names, vec!["rn_", "id", "name", "weight", "breed"]);
    }
}
